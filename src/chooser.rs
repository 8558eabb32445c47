//! Builds directed requests to the decision service, picks a model tier by
//! estimated prompt size, and turns replies into argument objects.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::brain::{ChatMessage, ChatRequest, DecisionService};
use crate::error::DecisionError;
use crate::markdown::to_markdown;
use crate::schema::ResponseSchema;
use crate::types::Mode;

pub const TEMPERATURE: f32 = 0.6;
pub const SMALL_TIER_LIMIT: usize = 2500;
pub const MEDIUM_TIER_LIMIT: usize = 16000;

const SYSTEM_PROMPT: [&str; 2] = [
    "You are a user of a web application.",
    "Explain why you are choosing each action.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Small,
    Medium,
    Large,
}

impl Tier {
    pub fn for_estimate(estimate: usize) -> Self {
        if estimate > MEDIUM_TIER_LIMIT {
            Tier::Large
        } else if estimate > SMALL_TIER_LIMIT {
            Tier::Medium
        } else {
            Tier::Small
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTier {
    pub model: String,
    pub context_limit: usize,
}

impl ModelTier {
    pub fn new(model: impl Into<String>, context_limit: usize) -> Self {
        Self {
            model: model.into(),
            context_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTiers {
    pub small: ModelTier,
    pub medium: ModelTier,
    pub large: ModelTier,
}

impl Default for ModelTiers {
    fn default() -> Self {
        Self {
            small: ModelTier::new("gpt-3.5-turbo", 4097),
            medium: ModelTier::new("gpt-3.5-turbo-16k", 16384),
            large: ModelTier::new("gpt-4-32k", 32000),
        }
    }
}

impl ModelTiers {
    pub fn get(&self, tier: Tier) -> &ModelTier {
        match tier {
            Tier::Small => &self.small,
            Tier::Medium => &self.medium,
            Tier::Large => &self.large,
        }
    }
}

/// `⌈characters / 2.5⌉` over every input.
pub fn estimate_tokens<'a, I>(inputs: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let chars: usize = inputs.into_iter().map(|input| input.chars().count()).sum();
    (chars * 2).div_ceil(5)
}

/// Tokens left for the reply once `⌈estimate × 1.25⌉` is reserved for the prompt.
pub fn reply_budget(context_limit: usize, estimate: usize) -> usize {
    context_limit.saturating_sub((estimate * 5).div_ceil(4))
}

/// Everything the decision service sees about the current goal step.
#[derive(Debug, Clone)]
pub struct GoalContext<'a> {
    pub goal: &'a str,
    pub success_criteria: &'a str,
    pub mode: Mode,
    pub page_url: &'a str,
    pub page_html: &'a str,
    pub history: Vec<String>,
    pub forms: &'a [String],
}

impl GoalContext<'_> {
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> =
            SYSTEM_PROMPT.iter().map(|m| ChatMessage::system(*m)).collect();

        messages.push(ChatMessage::user(format!("Your objective is: {}", self.goal)));
        if !self.success_criteria.is_empty() {
            messages.push(ChatMessage::user(format!(
                "You've achieved the objective when: {}",
                self.success_criteria
            )));
        }
        messages.push(ChatMessage::user(format!("Page URL: {}", self.page_url)));
        messages.push(ChatMessage::user(format!(
            "Page Markdown: {}",
            to_markdown(self.page_html)
        )));
        for action in &self.history {
            messages.push(ChatMessage::user(format!("You already tried: {action}")));
        }
        messages.push(ChatMessage::user("What is your next action?"));
        messages
    }
}

/// Shared front door to the decision service.
#[derive(Clone)]
pub struct ActionChooser {
    service: Arc<dyn DecisionService>,
    tiers: ModelTiers,
}

impl ActionChooser {
    pub fn new(service: Arc<dyn DecisionService>) -> Self {
        Self::with_tiers(service, ModelTiers::default())
    }

    pub fn with_tiers(service: Arc<dyn DecisionService>, tiers: ModelTiers) -> Self {
        Self { service, tiers }
    }

    pub fn tiers(&self) -> &ModelTiers {
        &self.tiers
    }

    /// Size the request and pick a tier for it.
    pub fn build_request(
        &self,
        messages: Vec<ChatMessage>,
        schema: ResponseSchema,
    ) -> Result<ChatRequest, DecisionError> {
        let serialized_schema = serde_json::to_string(&[&schema])?;
        let estimate = estimate_tokens(
            messages
                .iter()
                .map(|m| m.content.as_str())
                .chain(std::iter::once(serialized_schema.as_str())),
        );

        let tier = Tier::for_estimate(estimate);
        let model = self.tiers.get(tier);
        match tier {
            Tier::Small => debug!("Using {} due to token estimate of {}", model.model, estimate),
            _ => warn!("Switching to {} due to token estimate of {}", model.model, estimate),
        }

        let max_tokens = reply_budget(model.context_limit, estimate);
        if max_tokens == 0 {
            return Err(DecisionError::PromptTooLarge { estimate });
        }

        Ok(ChatRequest::directed(
            model.model.clone(),
            messages,
            max_tokens,
            TEMPERATURE,
            schema,
        ))
    }

    /// Ask for one structured reply. Any failure is logged and yields `None`.
    pub async fn decide(
        &self,
        messages: Vec<ChatMessage>,
        schema: ResponseSchema,
    ) -> Option<Map<String, Value>> {
        let name = schema.name.clone();
        let request = match self.build_request(messages, schema) {
            Ok(request) => request,
            Err(e) => {
                warn!("No decision for {}: {}", name, e);
                return None;
            }
        };

        let reply = match self.service.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Decision service failed for {}: {}", name, e);
                return None;
            }
        };

        match reply.structured_call(&name) {
            Ok(arguments) => Some(arguments),
            Err(e) => {
                warn!("Malformed reply for {}: {}", name, e);
                None
            }
        }
    }

    pub async fn choose_goal_action(
        &self,
        context: &GoalContext<'_>,
        schema: ResponseSchema,
    ) -> Option<Map<String, Value>> {
        debug!("Goal: {}", context.goal);
        debug!("Success criteria: {}", context.success_criteria);
        debug!("Mode name: {}", context.mode);
        debug!("History: {:?}", context.history);
        debug!("{} forms on page", context.forms.len());

        let arguments = self.decide(context.messages(), schema).await?;
        let decision = Value::Object(arguments.clone());
        info!(mode = %context.mode, "Decision: {}", decision);
        Some(arguments)
    }
}
