//! Wire types and client for the OpenAI-compatible decision service.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::DecisionError;
use crate::schema::ResponseSchema;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// A message in the conversation sent to the decision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ResponseSchema,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolChoiceFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

/// A completion request directed at exactly one function.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub n: u32,
    pub max_tokens: usize,
    pub temperature: f32,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
}

impl ChatRequest {
    pub fn directed(
        model: String,
        messages: Vec<ChatMessage>,
        max_tokens: usize,
        temperature: f32,
        schema: ResponseSchema,
    ) -> Self {
        let name = schema.name.clone();
        Self {
            model,
            messages,
            n: 1,
            max_tokens,
            temperature,
            tools: vec![ToolSpec {
                kind: "function".to_string(),
                function: schema,
            }],
            tool_choice: ToolChoice {
                kind: "function".to_string(),
                function: ToolChoiceFunction { name },
            },
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.tool_choice.function.name
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Older endpoints answer with a single `function_call`.
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

impl ChatResponse {
    /// Arguments of the single call to `expected` in the first choice.
    pub fn structured_call(&self, expected: &str) -> Result<Map<String, Value>, DecisionError> {
        let message = &self
            .choices
            .first()
            .ok_or_else(|| DecisionError::MissingCall(expected.to_string()))?
            .message;

        let mut calls: Vec<&FunctionCall> = message.tool_calls.iter().map(|c| &c.function).collect();
        calls.extend(message.function_call.as_ref());

        let call = match calls.as_slice() {
            [] => return Err(DecisionError::MissingCall(expected.to_string())),
            [call] => *call,
            [..] => return Err(DecisionError::AmbiguousCall(calls.len())),
        };
        if call.name != expected {
            return Err(DecisionError::WrongCall {
                expected: expected.to_string(),
                got: call.name.clone(),
            });
        }

        match serde_json::from_str::<Value>(&call.arguments)? {
            Value::Object(arguments) => Ok(arguments),
            _ => Err(DecisionError::NotAnObject),
        }
    }
}

/// Anything that can answer a directed completion request.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, DecisionError>;
}

/// HTTP client for OpenAI-compatible chat completion endpoints.
pub struct Brain {
    client: Client,
    api_key: String,
    api_url: String,
}

impl Brain {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_url(api_key, DEFAULT_API_URL)
    }

    pub fn with_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl DecisionService for Brain {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, DecisionError> {
        debug!(
            model = %request.model,
            schema = request.schema_name(),
            max_tokens = request.max_tokens,
            "Requesting decision"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Decision service error ({}): {}", status, body);
            return Err(DecisionError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<ChatResponse>().await?)
    }
}
