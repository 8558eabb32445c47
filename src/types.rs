use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// The state of the decision loop. Each mode asks the decision service for a
/// different response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    ChooseAction,
    NavigateToUrl,
    SubmitForm,
    AssertCssSelector,
    AssertPageUrl,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::ChooseAction,
        Mode::NavigateToUrl,
        Mode::SubmitForm,
        Mode::AssertCssSelector,
        Mode::AssertPageUrl,
    ];

    /// Modes that execute a browser action, i.e. everything `choose_action` can pick.
    pub const EXECUTION: [Mode; 4] = [
        Mode::NavigateToUrl,
        Mode::SubmitForm,
        Mode::AssertPageUrl,
        Mode::AssertCssSelector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ChooseAction => "choose_action",
            Mode::NavigateToUrl => "navigate_to_url",
            Mode::SubmitForm => "submit_form",
            Mode::AssertCssSelector => "assert_css_selector",
            Mode::AssertPageUrl => "assert_page_url",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// The objective driving one interactive session.
#[derive(Debug, Clone)]
pub struct Goal {
    pub goal_text: String,
    pub success_criteria: String,
    pub current_mode: Mode,
    pub start_url: Url,
}

impl Goal {
    pub fn new(goal_text: impl Into<String>, success_criteria: impl Into<String>, start_url: Url) -> Self {
        Self {
            goal_text: goal_text.into(),
            success_criteria: success_criteria.into(),
            current_mode: Mode::ChooseAction,
            start_url,
        }
    }

    /// Swap in a follow-up objective supplied by the operator.
    pub fn replace(&mut self, goal_text: String, success_criteria: String) {
        self.goal_text = goal_text;
        self.success_criteria = success_criteria;
    }
}

/// Record of one engine iteration. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub mode: Mode,
    pub next_mode: Mode,
    pub action: serde_json::Value,
    pub done: bool,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From mode {}, chose {} and transitioned to {}",
            self.mode, self.action, self.next_mode
        )
    }
}

/// One `form_element_name` / `form_element_value` pair proposed by the decision service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub form_element_name: String,
    pub form_element_value: String,
}

/// A cookie as read from, and written back to, the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

pub const DEFAULT_START_URL: &str = "http://localhost:3000";

pub const HISTORY_WINDOW: usize = 3;
pub const MAX_STEPS_SINCE_GOAL_COMPLETION: usize = 5;

pub const SELECTOR_TIMEOUT: Duration = Duration::from_millis(100);
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(3);
pub const TYPING_DELAY: Duration = Duration::from_millis(10);

pub const TEXT_HISTORY_LENGTH: usize = 20;
pub const DUPLICATE_PAGE_COUNT_THRESHOLD: usize = 3;
pub const FORM_SUBMISSION_CANDIDATES: usize = 3;
