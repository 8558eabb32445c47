use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{BrowserError, ConfigError};
use crate::hands::BrowserDriver;
use crate::types::{Cookie, NAVIGATION_TIMEOUT};

const LOGIN_FIELD_TIMEOUT: Duration = Duration::from_secs(10);

/// How to sign in before crawling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    pub url: String,
    /// `(css selector, value)` pairs typed in order.
    pub fields: Vec<(String, String)>,
    pub submit_selector: String,
}

/// Parse a `selector=value` login field. The split happens at the first `=`
/// outside an attribute selector's brackets.
pub fn parse_login_field(raw: &str) -> Result<(String, String), ConfigError> {
    let mut depth = 0usize;
    let split = raw.char_indices().find_map(|(i, c)| {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return Some(i),
            _ => {}
        }
        None
    });
    match split {
        Some(i) if !raw[..i].trim().is_empty() => {
            Ok((raw[..i].trim().to_string(), raw[i + 1..].to_string()))
        }
        _ => Err(ConfigError::InvalidLoginField(raw.to_string())),
    }
}

/// Sign in through the login form and return the resulting cookie jar.
pub async fn load_cookies(
    driver: &dyn BrowserDriver,
    login: &LoginConfig,
) -> Result<Vec<Cookie>, BrowserError> {
    let page = driver.new_page().await?;
    let result = async {
        page.goto(&login.url).await?;
        if let Some((first, _)) = login.fields.first() {
            page.wait_for_selector(first, LOGIN_FIELD_TIMEOUT).await?;
        }
        for (selector, value) in &login.fields {
            page.type_text(selector, value, None).await?;
        }
        let before = page.url().await?;
        page.click(&login.submit_selector).await?;
        if let Err(e) = page.wait_for_navigation(&before, NAVIGATION_TIMEOUT).await {
            warn!("No navigation after signing in: {}", e);
        }
        debug!("Signed in, now at {}", page.url().await?);
        page.cookies().await
    }
    .await;
    if let Err(e) = page.close().await {
        warn!("Failed to close login tab: {}", e);
    }
    let cookies = result?;
    info!("Cookies loaded ({})", cookies.len());
    Ok(cookies)
}
