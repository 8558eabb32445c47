use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::util::Wait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::dom;
use crate::error::BrowserError;
use crate::types::Cookie;

const DEFAULT_TAB_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_LOAD_WAIT: Duration = Duration::from_millis(100);

/// One browser tab. Everything the engine and the crawl need from a page.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn url(&self) -> Result<String, BrowserError>;
    async fn title(&self) -> Result<String, BrowserError>;
    /// Outer HTML of `<body>`.
    async fn body_html(&self) -> Result<String, BrowserError>;
    /// Text content of the whole document.
    async fn text_content(&self) -> Result<String, BrowserError>;
    async fn links(&self) -> Result<Vec<String>, BrowserError>;
    /// Outer HTML of every `<form>`.
    async fn forms(&self) -> Result<Vec<String>, BrowserError>;
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;
    /// Select whatever the element currently holds, so typing replaces it.
    async fn select_all(&self, selector: &str) -> Result<(), BrowserError>;
    async fn type_text(&self, selector: &str, text: &str, delay: Option<Duration>) -> Result<(), BrowserError>;
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;
    /// Wait for the page to leave `from` and finish loading the new document.
    async fn wait_for_navigation(&self, from: &str, timeout: Duration) -> Result<(), BrowserError>;
    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError>;
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError>;
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Opens isolated tabs.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError>;
}

/// Chrome session launched through the DevTools protocol. Created once and
/// shared by every tab it opens.
pub struct BrowserSession {
    browser: Arc<Browser>,
}

impl BrowserSession {
    pub fn launch(headless: bool) -> Result<Self, BrowserError> {
        let options = LaunchOptions {
            headless,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        info!(headless, "Starting Chrome");
        let browser = Browser::new(options).map_err(|e| BrowserError::Launch(format!("{e:#}")))?;
        Ok(Self {
            browser: Arc::new(browser),
        })
    }

    pub async fn launch_blocking(headless: bool) -> Result<Self, BrowserError> {
        tokio::task::spawn_blocking(move || Self::launch(headless))
            .await
            .map_err(|e| BrowserError::Launch(format!("browser launch panicked: {e}")))?
    }
}

#[async_trait]
impl BrowserDriver for BrowserSession {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError> {
        let browser = self.browser.clone();
        let tab = tokio::task::spawn_blocking(move || {
            let tab = browser.new_tab()?;
            tab.set_default_timeout(DEFAULT_TAB_TIMEOUT);
            Ok::<_, anyhow::Error>(tab)
        })
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))??;
        debug!("Opened tab");
        Ok(Arc::new(ChromePage { tab }))
    }
}

/// A Chrome tab. The driver is synchronous, so every call runs on the
/// blocking pool.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn blocking<T, F>(&self, f: F) -> Result<T, BrowserError>
    where
        F: FnOnce(&Arc<Tab>) -> Result<T, BrowserError> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn url(&self) -> Result<String, BrowserError> {
        self.blocking(|tab| Ok(tab.get_url())).await
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.blocking(|tab| Ok(tab.get_title()?)).await
    }

    async fn body_html(&self) -> Result<String, BrowserError> {
        self.blocking(dom::capture_body_html).await
    }

    async fn text_content(&self) -> Result<String, BrowserError> {
        self.blocking(dom::capture_text).await
    }

    async fn links(&self) -> Result<Vec<String>, BrowserError> {
        self.blocking(dom::capture_links).await
    }

    async fn forms(&self) -> Result<Vec<String>, BrowserError> {
        self.blocking(dom::capture_forms).await
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let selector = selector.to_string();
        self.blocking(move |tab| {
            tab.find_element(&selector)
                .map_err(|_| BrowserError::ElementNotFound(selector.clone()))?
                .click()?;
            Ok(())
        })
        .await
    }

    async fn select_all(&self, selector: &str) -> Result<(), BrowserError> {
        let selector = selector.to_string();
        self.blocking(move |tab| dom::select_contents(tab, &selector)).await
    }

    async fn type_text(&self, selector: &str, text: &str, delay: Option<Duration>) -> Result<(), BrowserError> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.blocking(move |tab| {
            let element = tab
                .find_element(&selector)
                .map_err(|_| BrowserError::ElementNotFound(selector.clone()))?;
            element.focus()?;
            match delay {
                Some(delay) => {
                    for ch in text.chars() {
                        tab.send_character(&ch.to_string())?;
                        std::thread::sleep(delay);
                    }
                }
                None => {
                    tab.type_str(&text)?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let selector = selector.to_string();
        self.blocking(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)
                .map_err(|_| BrowserError::Timeout(timeout))?;
            Ok(())
        })
        .await
    }

    async fn wait_for_navigation(&self, from: &str, timeout: Duration) -> Result<(), BrowserError> {
        let from = from.to_string();
        self.blocking(move |tab| {
            let started = Instant::now();
            // `wait_until_navigated` only covers a load already in progress,
            // so first wait for the URL to move.
            Wait::with_timeout(timeout)
                .until(|| (tab.get_url() != from).then_some(()))
                .map_err(|_| BrowserError::Timeout(timeout))?;

            let remaining = timeout.saturating_sub(started.elapsed()).max(MIN_LOAD_WAIT);
            tab.set_default_timeout(remaining);
            let loaded = tab.wait_until_navigated().map(|_| ());
            tab.set_default_timeout(DEFAULT_TAB_TIMEOUT);
            loaded.map_err(|_| BrowserError::Timeout(timeout))
        })
        .await
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        self.blocking(|tab| {
            let cookies = tab.get_cookies()?;
            let value = serde_json::to_value(cookies).map_err(|e| BrowserError::Driver(e.to_string()))?;
            serde_json::from_value(value).map_err(|e| BrowserError::Driver(e.to_string()))
        })
        .await
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError> {
        if cookies.is_empty() {
            return Ok(());
        }
        let params = cookies
            .iter()
            .map(|cookie| {
                serde_json::to_value(cookie)
                    .and_then(serde_json::from_value::<CookieParam>)
                    .map_err(|e| BrowserError::Driver(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.blocking(move |tab| Ok(tab.set_cookies(params)?)).await
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.blocking(|tab| {
            tab.close(true)?;
            Ok(())
        })
        .await
    }
}
