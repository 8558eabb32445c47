//! Response schemas offered to the decision service, one per mode, plus the
//! typed shapes their arguments are parsed into.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{FORM_SUBMISSION_CANDIDATES, FormField, Mode};

pub const COMPLETE_ACTION: &str = "complete";
pub const FORM_COMPLETION_SCHEMA: &str = "submit";

/// A named function specification the reply must call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn fields_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "form_element_name": { "type": "string" },
                "form_element_value": { "type": "string" }
            },
            "required": ["form_element_name", "form_element_value"]
        }
    })
}

/// The schema requested while in `mode`. `links` bounds the navigation
/// targets the reply may pick.
pub fn mode_schema(mode: Mode, links: &[String]) -> ResponseSchema {
    let (description, parameters) = match mode {
        Mode::ChooseAction => {
            let mut actions: Vec<&str> = Mode::EXECUTION.iter().map(Mode::as_str).collect();
            actions.push(COMPLETE_ACTION);
            (
                "Choose an action to take",
                json!({
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "type": "object",
                    "properties": {
                        "action_name": { "type": "string", "enum": actions },
                        "reason": {
                            "type": "string",
                            "description": "Why I've decided to take this action"
                        }
                    },
                    "required": ["action_name", "reason"]
                }),
            )
        }
        Mode::NavigateToUrl => {
            let mut url = json!({ "type": "string" });
            let mut targets: Vec<&str> = Vec::new();
            for link in links {
                if !targets.contains(&link.as_str()) {
                    targets.push(link);
                }
            }
            if !targets.is_empty() {
                url["enum"] = json!(targets);
            }
            (
                "Navigate the browser to a URL",
                json!({
                    "type": "object",
                    "properties": { "url": url },
                    "required": ["url"]
                }),
            )
        }
        Mode::SubmitForm => (
            "Submit a form",
            json!({
                "type": "object",
                "properties": {
                    "fields": fields_schema(),
                    "submit_element_name": {
                        "type": "string",
                        "description": "Name of the submit element"
                    }
                },
                "required": ["fields", "submit_element_name"]
            }),
        ),
        Mode::AssertCssSelector => (
            "Make an assertion about CSS selector content",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector that should be present on the page"
                    },
                    "is_goal_completion": {
                        "type": "boolean",
                        "description": "Whether a passing assertion means the objective is achieved"
                    }
                },
                "required": ["selector", "is_goal_completion"]
            }),
        ),
        Mode::AssertPageUrl => (
            "Make an assertion about the page URL",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression the page URL should match"
                    },
                    "is_goal_completion": {
                        "type": "boolean",
                        "description": "Whether a passing assertion means the objective is achieved"
                    }
                },
                "required": ["pattern", "is_goal_completion"]
            }),
        ),
    };

    ResponseSchema {
        name: mode.as_str().to_string(),
        description: description.to_string(),
        parameters,
    }
}

pub fn form_completion_schema() -> ResponseSchema {
    ResponseSchema {
        name: FORM_COMPLETION_SCHEMA.to_string(),
        description: "Fill out and submit a form".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "submissions": {
                    "type": "array",
                    "maxItems": FORM_SUBMISSION_CANDIDATES,
                    "items": {
                        "type": "object",
                        "properties": { "fields": fields_schema() },
                        "required": ["fields"]
                    }
                },
                "submit_element_name": {
                    "type": "string",
                    "description": "Name of the submit element"
                }
            },
            "required": ["submissions", "submit_element_name"]
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChooseActionReply {
    pub action_name: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NavigateReply {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitFormReply {
    pub fields: Vec<FormField>,
    pub submit_element_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssertSelectorReply {
    pub selector: String,
    #[serde(default)]
    pub is_goal_completion: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssertUrlReply {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub is_goal_completion: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Submission {
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormCompletionReply {
    pub submissions: Vec<Submission>,
    pub submit_element_name: String,
}
