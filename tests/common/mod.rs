#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use webgoal::brain::{ChatRequest, ChatResponse, DecisionService};
use webgoal::crawl::{DatasetSink, PageRecord};
use webgoal::error::{BrowserError, DecisionError};
use webgoal::forms::Frontier;
use webgoal::goal::{GoalPrompt, Operator, OperatorAnswer};
use webgoal::hands::{BrowserDriver, BrowserPage};
use webgoal::types::Cookie;

#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub title: String,
    pub html: String,
    pub text: String,
    pub links: Vec<String>,
    pub forms: Vec<String>,
}

impl PageContent {
    pub fn new(title: &str, text: &str) -> Self {
        Self {
            title: title.to_string(),
            html: format!("<body><h1>{title}</h1><p>{text}</p></body>"),
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn links(mut self, links: &[&str]) -> Self {
        self.links = links.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn form(mut self, form: &str) -> Self {
        self.forms.push(form.to_string());
        self
    }
}

/// A pretend web site shared by every tab the fake driver opens.
#[derive(Default)]
pub struct Site {
    pages: Mutex<HashMap<String, PageContent>>,
    missing: Mutex<HashSet<String>>,
    /// Consumed one per click; `Some(url)` starts a navigation there that
    /// lands once the tab waits for it.
    click_navigation: Mutex<VecDeque<Option<String>>>,
    /// Cookies every tab reports, as if the server had set them.
    issued: Mutex<Vec<Cookie>>,
    /// How long every `goto` takes.
    load_time: Mutex<Option<Duration>>,
}

impl Site {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, content: PageContent) {
        self.pages.lock().insert(url.to_string(), content);
    }

    /// Selectors that match nothing.
    pub fn missing(&self, selectors: &[&str]) {
        self.missing.lock().extend(selectors.iter().map(|s| s.to_string()));
    }

    pub fn clicks_navigate(&self, targets: &[Option<&str>]) {
        self.click_navigation
            .lock()
            .extend(targets.iter().map(|t| t.map(str::to_string)));
    }

    pub fn loads_slowly(&self, load_time: Duration) {
        *self.load_time.lock() = Some(load_time);
    }

    pub fn issue_cookie(&self, name: &str, value: &str) {
        self.issued.lock().push(Cookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: Some("localhost".to_string()),
            path: Some("/".to_string()),
            secure: false,
            http_only: true,
        });
    }

    fn content(&self, url: &str) -> PageContent {
        self.pages.lock().get(url).cloned().unwrap_or_default()
    }

    fn check(&self, selector: &str) -> Result<(), BrowserError> {
        if self.missing.lock().contains(selector) {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    fills: Vec<(String, String)>,
    selected: Vec<String>,
    clicks: Vec<String>,
    pending: Option<String>,
    waits: Vec<String>,
    cookies: Vec<Cookie>,
    closed: bool,
}

pub struct FakePage {
    site: Arc<Site>,
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new(site: Arc<Site>) -> Arc<Self> {
        Arc::new(Self {
            site,
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..Default::default()
            }),
        })
    }

    pub fn current_url(&self) -> String {
        self.state.lock().url.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.lock().fills.clone()
    }

    pub fn selected(&self) -> Vec<String> {
        self.state.lock().selected.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    /// The `from` URL of every navigation wait.
    pub fn waits(&self) -> Vec<String> {
        self.state.lock().waits.clone()
    }

    pub fn cookie_jar(&self) -> Vec<Cookie> {
        self.state.lock().cookies.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn current(&self) -> PageContent {
        self.site.content(&self.current_url())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let load_time = *self.site.load_time.lock();
        if let Some(load_time) = load_time {
            tokio::time::sleep(load_time).await;
        }
        self.state.lock().url = url.to_string();
        Ok(())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self.current_url())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.current().title)
    }

    async fn body_html(&self) -> Result<String, BrowserError> {
        Ok(self.current().html)
    }

    async fn text_content(&self) -> Result<String, BrowserError> {
        Ok(self.current().text)
    }

    async fn links(&self) -> Result<Vec<String>, BrowserError> {
        Ok(self.current().links)
    }

    async fn forms(&self) -> Result<Vec<String>, BrowserError> {
        Ok(self.current().forms)
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.site.check(selector)?;
        let target = self.site.click_navigation.lock().pop_front().flatten();
        let mut state = self.state.lock();
        state.clicks.push(selector.to_string());
        state.pending = target;
        Ok(())
    }

    async fn select_all(&self, selector: &str) -> Result<(), BrowserError> {
        self.site.check(selector)?;
        self.state.lock().selected.push(selector.to_string());
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, _delay: Option<Duration>) -> Result<(), BrowserError> {
        self.site.check(selector)?;
        self.state
            .lock()
            .fills
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.site.check(selector).map_err(|_| BrowserError::Timeout(timeout))
    }

    async fn wait_for_navigation(&self, from: &str, timeout: Duration) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        state.waits.push(from.to_string());
        if let Some(target) = state.pending.take() {
            state.url = target;
        }
        if state.url == from {
            Err(BrowserError::Timeout(timeout))
        } else {
            Ok(())
        }
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        let mut jar = self.cookie_jar();
        jar.extend(self.site.issued.lock().iter().cloned());
        Ok(jar)
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError> {
        self.state.lock().cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Opens `FakePage`s over one site and keeps them for inspection.
pub struct FakeDriver {
    pub site: Arc<Site>,
    opened: Mutex<Vec<Arc<FakePage>>>,
}

impl FakeDriver {
    pub fn new(site: Arc<Site>) -> Arc<Self> {
        Arc::new(Self {
            site,
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<Arc<FakePage>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError> {
        let page = FakePage::new(self.site.clone());
        self.opened.lock().push(page.clone());
        Ok(page as Arc<dyn BrowserPage>)
    }
}

/// A completion reply calling `name` with `arguments`.
pub fn call(name: &str, arguments: Value) -> ChatResponse {
    serde_json::from_value(json!({
        "choices": [{
            "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_0",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments.to_string() }
                }]
            }
        }]
    }))
    .unwrap()
}

/// Answers requests from a fixed script; an exhausted script is an error.
#[derive(Default)]
pub struct ScriptedService {
    replies: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl ScriptedService {
    pub fn new(replies: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    pub fn slow(replies: Vec<ChatResponse>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DecisionService for ScriptedService {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, DecisionError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| DecisionError::MissingCall(request.schema_name().to_string()))
    }
}

#[derive(Default)]
pub struct RecordingFrontier {
    urls: Mutex<Vec<String>>,
}

impl RecordingFrontier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl Frontier for RecordingFrontier {
    fn enqueue(&self, url: String) {
        self.urls.lock().push(url);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<PageRecord>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<PageRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DatasetSink for RecordingSink {
    async fn push(&self, record: &PageRecord) -> std::io::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Answers prompts from a fixed script and records what was asked. Quits
/// once the script runs out.
pub struct ScriptedOperator {
    answers: VecDeque<OperatorAnswer>,
    pub asked: Arc<Mutex<Vec<GoalPrompt>>>,
}

impl ScriptedOperator {
    pub fn new(answers: Vec<OperatorAnswer>) -> Self {
        Self {
            answers: answers.into(),
            asked: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn ask(&mut self, prompt: GoalPrompt) -> std::io::Result<OperatorAnswer> {
        self.asked.lock().push(prompt);
        Ok(self.answers.pop_front().unwrap_or(OperatorAnswer::Quit))
    }
}
