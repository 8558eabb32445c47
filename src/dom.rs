//! Page reads executed inside the tab. Every script returns a string so the
//! result comes back by value.

use std::sync::Arc;

use headless_chrome::Tab;

use crate::error::BrowserError;

/// Outbound link targets, skipping `data-turbo-method="delete"` anchors.
const LINKS_JS: &str = r#"
JSON.stringify(
  [...document.querySelectorAll('a')]
    .filter((el) => el.getAttribute('data-turbo-method') !== 'delete')
    .map((el) => el.getAttribute('href'))
    .filter(Boolean)
)
"#;

const FORMS_JS: &str = r#"
JSON.stringify([...document.querySelectorAll('form')].map((el) => el.outerHTML))
"#;

const TEXT_JS: &str = "document.documentElement ? (document.documentElement.textContent || '') : ''";

const BODY_HTML_JS: &str = "document.body ? document.body.outerHTML : ''";

fn evaluate_string(tab: &Arc<Tab>, script: &str) -> Result<String, BrowserError> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| BrowserError::Script(format!("{e:#}")))?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default())
}

fn evaluate_list(tab: &Arc<Tab>, script: &str) -> Result<Vec<String>, BrowserError> {
    let raw = evaluate_string(tab, script)?;
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).map_err(|e| BrowserError::Script(e.to_string()))
}

pub fn capture_links(tab: &Arc<Tab>) -> Result<Vec<String>, BrowserError> {
    evaluate_list(tab, LINKS_JS)
}

pub fn capture_forms(tab: &Arc<Tab>) -> Result<Vec<String>, BrowserError> {
    evaluate_list(tab, FORMS_JS)
}

pub fn capture_text(tab: &Arc<Tab>) -> Result<String, BrowserError> {
    evaluate_string(tab, TEXT_JS)
}

pub fn capture_body_html(tab: &Arc<Tab>) -> Result<String, BrowserError> {
    evaluate_string(tab, BODY_HTML_JS)
}

/// Select the current contents of the field matched by `selector`, the
/// scripted equivalent of a triple click.
pub fn select_contents(tab: &Arc<Tab>, selector: &str) -> Result<(), BrowserError> {
    let quoted = serde_json::to_string(selector).map_err(|e| BrowserError::Script(e.to_string()))?;
    let script = format!(
        "(() => {{ const el = document.querySelector({quoted}); \
         if (!el) return 'missing'; el.focus(); if (el.select) el.select(); return 'ok'; }})()"
    );
    match evaluate_string(tab, &script)?.as_str() {
        "ok" => Ok(()),
        _ => Err(BrowserError::ElementNotFound(selector.to_string())),
    }
}
