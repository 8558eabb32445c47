//! Breadth-first crawl with page-shape dedup and opportunistic form filling.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::context::{ContextDiffer, relevant_words};
use crate::dedup::PageDeduplicator;
use crate::error::BrowserError;
use crate::forms::{FormCompletionPipeline, FormOutcome, Frontier};
use crate::hands::{BrowserDriver, BrowserPage};
use crate::types::Cookie;

/// What gets persisted for every visited page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub title: String,
    pub url: String,
    pub text: String,
    pub links: Vec<String>,
    pub forms: Vec<String>,
}

#[async_trait]
pub trait DatasetSink: Send + Sync {
    async fn push(&self, record: &PageRecord) -> std::io::Result<()>;
}

/// Appends one JSON object per line.
pub struct JsonLinesDataset {
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonLinesDataset {
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: tokio::sync::Mutex::new(file),
        })
    }
}

#[async_trait]
impl DatasetSink for JsonLinesDataset {
    async fn push(&self, record: &PageRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<String>,
    seen: HashSet<String>,
}

/// FIFO of URLs still to visit. Each exact URL is queued at most once.
#[derive(Debug, Default)]
pub struct CrawlQueue {
    state: Mutex<QueueState>,
}

impl CrawlQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<String> {
        self.state.lock().pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }
}

impl Frontier for CrawlQueue {
    fn enqueue(&self, url: String) {
        let mut state = self.state.lock();
        if state.seen.insert(url.clone()) {
            state.pending.push_back(url);
        }
    }
}

const TAB_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// What one handled page produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub url: String,
    pub enqueued: Vec<String>,
    pub forms: Vec<FormOutcome>,
}

/// State shared by every page handler of one crawl.
pub struct CrawlSession {
    dedup: Mutex<PageDeduplicator>,
    differ: Mutex<ContextDiffer>,
    cookies: Vec<Cookie>,
    forms: Arc<FormCompletionPipeline>,
    frontier: Arc<dyn Frontier>,
    sink: Arc<dyn DatasetSink>,
    form_deadline: Duration,
}

impl CrawlSession {
    pub fn new(
        forms: FormCompletionPipeline,
        frontier: Arc<dyn Frontier>,
        sink: Arc<dyn DatasetSink>,
        cookies: Vec<Cookie>,
        form_deadline: Duration,
    ) -> Self {
        Self {
            dedup: Mutex::new(PageDeduplicator::new()),
            differ: Mutex::new(ContextDiffer::new()),
            cookies,
            forms: Arc::new(forms),
            frontier,
            sink,
            form_deadline,
        }
    }

    /// Open `url` in a fresh tab and handle it.
    pub async fn handle_request(
        &self,
        driver: &dyn BrowserDriver,
        url: &str,
    ) -> Result<PageReport, BrowserError> {
        let page = driver.new_page().await?;
        let result = async {
            page.set_cookies(&self.cookies).await?;
            page.goto(url).await?;
            self.handle_page(url, page.as_ref()).await
        }
        .await;
        if let Err(e) = page.close().await {
            warn!("Failed to close tab for {}: {}", url, e);
        }
        result
    }

    /// Process a page that is already loaded.
    pub async fn handle_page(
        &self,
        request_url: &str,
        page: &dyn BrowserPage,
    ) -> Result<PageReport, BrowserError> {
        let title = page.title().await?;
        let loaded_url = page.url().await?;
        if loaded_url == request_url {
            info!("Requested page {}, loaded '{}'", request_url, title);
        } else {
            info!("Requested page {}, loaded '{}' from '{}'", request_url, title, loaded_url);
        }

        let text = page.text_content().await?;
        let forms = page.forms().await?;

        let mut outcomes = Vec::new();
        if !text.is_empty() {
            // Possibly empty; forms are still attempted once there is an
            // earlier page to compare against.
            let relevant = self.relevant_context(&text).await;
            self.differ.lock().push(text.clone());
            if let Some(relevant) = relevant {
                debug!("Relevant text: {}", relevant);
                if !forms.is_empty() {
                    debug!("Forms on this page: {}", forms.join("\n"));
                    outcomes = self.complete_forms(&loaded_url, &relevant, &forms).await;
                }
            }
        }

        let links = page.links().await?;
        let record = PageRecord {
            title,
            url: loaded_url.clone(),
            text,
            links: links.clone(),
            forms,
        };
        if let Err(e) = self.sink.push(&record).await {
            warn!("Failed to persist {}: {}", loaded_url, e);
        }

        let enqueued = self.enqueue_links(&loaded_url, &links);
        Ok(PageReport {
            url: loaded_url,
            enqueued,
            forms: outcomes,
        })
    }

    /// Diff against a copy of the window on the blocking pool. Edit distances
    /// over whole pages are too slow to run under the session lock.
    async fn relevant_context(&self, text: &str) -> Option<String> {
        let snapshots = self.differ.lock().snapshots();
        if snapshots.is_empty() {
            return None;
        }
        let text = text.to_string();
        match tokio::task::spawn_blocking(move || relevant_words(&snapshots, &text)).await {
            Ok(relevant) => relevant,
            Err(e) => {
                warn!("Context diff ended abnormally: {}", e);
                None
            }
        }
    }

    /// One task per form, each in its own tab, joined before returning.
    /// Every task stops itself and closes its tab at the deadline; a task
    /// stuck even in closing is cancelled after a short grace period.
    async fn complete_forms(&self, url: &str, relevant: &str, forms: &[String]) -> Vec<FormOutcome> {
        let deadline = tokio::time::Instant::now() + self.form_deadline;
        let mut tasks = JoinSet::new();
        for form in forms {
            let pipeline = self.forms.clone();
            let url = url.to_string();
            let relevant = relevant.to_string();
            let form = form.clone();
            tasks.spawn(async move { pipeline.complete_form(&url, &relevant, &form, deadline).await });
        }

        let mut outcomes = Vec::new();
        let joined = tokio::time::timeout_at(deadline + TAB_CLOSE_GRACE, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(outcome)) => outcomes.push(outcome),
                    Ok(Err(e)) => warn!("Form completion on {} failed: {}", url, e),
                    Err(e) => warn!("Form completion task on {} ended abnormally: {}", url, e),
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!(
                "Form completion on {} outlived {:?} and its grace period; cancelling {} task(s)",
                url,
                self.form_deadline,
                tasks.len()
            );
            tasks.abort_all();
        }
        outcomes
    }

    fn enqueue_links(&self, page_url: &str, links: &[String]) -> Vec<String> {
        let Ok(base) = Url::parse(page_url) else {
            warn!("Invalid URL: {}", page_url);
            return Vec::new();
        };
        let origin = base.origin();

        let mut enqueued = Vec::new();
        for link in links.iter().filter(|link| !link.starts_with('#')) {
            let url = match base.join(link) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Invalid URL: {} ({})", link, e);
                    continue;
                }
            };
            if url.origin() != origin {
                continue;
            }
            let admitted = self.dedup.lock().record_page(&url);
            if admitted {
                self.frontier.enqueue(url.to_string());
                enqueued.push(url.to_string());
            }
        }
        enqueued
    }
}

/// Minimal scheduler: pops the queue, runs up to `concurrency` handlers at a
/// time, and stops once the queue is drained and nothing is in flight.
pub struct Crawler {
    session: Arc<CrawlSession>,
    driver: Arc<dyn BrowserDriver>,
    queue: Arc<CrawlQueue>,
    concurrency: usize,
}

impl Crawler {
    pub fn new(
        session: Arc<CrawlSession>,
        driver: Arc<dyn BrowserDriver>,
        queue: Arc<CrawlQueue>,
        concurrency: usize,
    ) -> Self {
        Self {
            session,
            driver,
            queue,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, seeds: &[String]) -> Vec<PageReport> {
        for seed in seeds {
            self.queue.enqueue(seed.clone());
        }

        let mut reports = Vec::new();
        let mut in_flight = JoinSet::new();
        loop {
            while in_flight.len() < self.concurrency {
                let Some(url) = self.queue.pop() else {
                    break;
                };
                let session = self.session.clone();
                let driver = self.driver.clone();
                in_flight.spawn(async move {
                    let result = session.handle_request(driver.as_ref(), &url).await;
                    (url, result)
                });
            }

            match in_flight.join_next().await {
                Some(Ok((_, Ok(report)))) => reports.push(report),
                Some(Ok((url, Err(e)))) => error!("Request {} failed: {}", url, e),
                Some(Err(e)) => error!("Page handler ended abnormally: {}", e),
                None => break,
            }
        }
        info!("Crawl finished after {} page(s)", reports.len());
        reports
    }
}
