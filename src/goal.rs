//! Goal-driven session: one decision and one browser action per step.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::chooser::{ActionChooser, GoalContext};
use crate::error::EngineError;
use crate::forms::{fill_field, name_selector};
use crate::hands::BrowserPage;
use crate::history::History;
use crate::schema::{
    AssertSelectorReply, AssertUrlReply, COMPLETE_ACTION, ChooseActionReply, NavigateReply,
    SubmitFormReply, mode_schema,
};
use crate::types::{
    FormField, Goal, HISTORY_WINDOW, MAX_STEPS_SINCE_GOAL_COMPLETION, Mode, NAVIGATION_TIMEOUT,
    SELECTOR_TIMEOUT, Step, TYPING_DELAY,
};

/// What the page looked like when the step started.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
    pub links: Vec<String>,
    pub forms: Vec<String>,
}

/// A reply parsed into the shape its mode asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Choose(ChooseActionReply),
    Navigate(NavigateReply),
    SubmitForm(SubmitFormReply),
    AssertSelector(AssertSelectorReply),
    AssertUrl { pattern: String, is_goal_completion: bool },
}

impl Action {
    /// `None` when the arguments do not fit the mode's schema.
    pub fn parse(mode: Mode, arguments: &Map<String, Value>) -> Option<Self> {
        let value = Value::Object(arguments.clone());
        let action = match mode {
            Mode::ChooseAction => Action::Choose(serde_json::from_value(value).ok()?),
            Mode::NavigateToUrl => Action::Navigate(serde_json::from_value(value).ok()?),
            Mode::SubmitForm => Action::SubmitForm(serde_json::from_value(value).ok()?),
            Mode::AssertCssSelector => Action::AssertSelector(serde_json::from_value(value).ok()?),
            Mode::AssertPageUrl => {
                let reply: AssertUrlReply = serde_json::from_value(value).ok()?;
                Action::AssertUrl {
                    pattern: reply.pattern.filter(|p| !p.is_empty())?,
                    is_goal_completion: reply.is_goal_completion,
                }
            }
        };
        Some(action)
    }
}

/// Outcome of the transition table for one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `choose_action` picked `complete`.
    Complete,
    /// `choose_action` picked an execution mode.
    Enter(Mode),
    /// `choose_action` picked something the engine cannot run.
    Unsupported(String),
    /// Run the current mode's browser action, then choose again.
    Execute,
}

/// `(mode, reply) → transition`. Every execution mode returns to
/// `choose_action` once its action has run.
pub fn transition(mode: Mode, action: &Action) -> Transition {
    match (mode, action) {
        (Mode::ChooseAction, Action::Choose(reply)) if reply.action_name == COMPLETE_ACTION => {
            Transition::Complete
        }
        (Mode::ChooseAction, Action::Choose(reply)) => match reply.action_name.parse::<Mode>() {
            Ok(next) if Mode::EXECUTION.contains(&next) => Transition::Enter(next),
            _ => Transition::Unsupported(reply.action_name.clone()),
        },
        (Mode::ChooseAction, _) => Transition::Unsupported(mode.to_string()),
        _ => Transition::Execute,
    }
}

/// Anchor a navigation target to the session origin, whether the model gave
/// an absolute URL or a relative path.
pub fn resolve_target(base: &Url, target: &str) -> Option<Url> {
    let joined = base.join(target.trim()).ok()?;
    let mut resolved = base.clone();
    resolved.set_path(joined.path());
    resolved.set_query(joined.query().filter(|q| !q.is_empty()));
    resolved.set_fragment(None);
    Some(resolved)
}

pub struct GoalEngine {
    goal: Goal,
    history: History,
    errors: Vec<String>,
    page: Arc<dyn BrowserPage>,
    chooser: ActionChooser,
    base: Url,
}

impl GoalEngine {
    pub fn new(goal: Goal, page: Arc<dyn BrowserPage>, chooser: ActionChooser) -> Self {
        let mut base = goal.start_url.clone();
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);
        Self {
            goal,
            history: History::new(),
            errors: Vec::new(),
            page,
            chooser,
            base,
        }
    }

    /// Open the start URL.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.page.goto(self.goal.start_url.as_str()).await?;
        Ok(())
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn replace_goal(&mut self, goal_text: String, success_criteria: String) {
        self.goal.replace(goal_text, success_criteria);
    }

    async fn snapshot(&self) -> Result<PageSnapshot, EngineError> {
        Ok(PageSnapshot {
            links: self.page.links().await?,
            forms: self.page.forms().await?,
            url: self.page.url().await?,
            html: self.page.body_html().await?,
        })
    }

    /// Run one iteration. `Ok(None)` means no decision was available and
    /// nothing changed.
    pub async fn step(&mut self) -> Result<Option<Step>, EngineError> {
        let snapshot = self.snapshot().await?;
        let mode = self.goal.current_mode;

        let context = GoalContext {
            goal: &self.goal.goal_text,
            success_criteria: &self.goal.success_criteria,
            mode,
            page_url: &snapshot.url,
            page_html: &snapshot.html,
            history: self.history.messages(Some(HISTORY_WINDOW)),
            forms: &snapshot.forms,
        };
        let schema = mode_schema(mode, &snapshot.links);
        let Some(arguments) = self.chooser.choose_goal_action(&context, schema).await else {
            return Ok(None);
        };
        let Some(action) = Action::parse(mode, &arguments) else {
            warn!(%mode, "Reply does not fit the {} schema", mode);
            return Ok(None);
        };

        let mut done = false;
        let next_mode = match transition(mode, &action) {
            Transition::Complete => {
                if let Action::Choose(reply) = &action {
                    info!("Choosing {}, because {}", reply.action_name, reply.reason);
                }
                done = true;
                Mode::ChooseAction
            }
            Transition::Enter(next) => {
                if let Action::Choose(reply) = &action {
                    info!("Choosing {}, because {}", reply.action_name, reply.reason);
                }
                next
            }
            Transition::Unsupported(name) => {
                self.append_history(format!(
                    "I don't know how to handle {name} yet. Please try something else."
                ));
                Mode::ChooseAction
            }
            Transition::Execute => {
                done = self.execute(action).await;
                Mode::ChooseAction
            }
        };

        self.goal.current_mode = next_mode;
        Ok(Some(Step {
            mode,
            next_mode,
            action: Value::Object(arguments),
            done,
        }))
    }

    /// Returns whether the action completed the goal.
    async fn execute(&mut self, action: Action) -> bool {
        match action {
            Action::Navigate(reply) => {
                self.navigate(&reply.url).await;
                false
            }
            Action::SubmitForm(reply) => {
                self.submit_form(&reply.fields, &reply.submit_element_name).await;
                false
            }
            Action::AssertSelector(reply) => {
                self.assert_selector(&reply.selector).await && reply.is_goal_completion
            }
            Action::AssertUrl {
                pattern,
                is_goal_completion,
            } => self.assert_url(&pattern).await && is_goal_completion,
            Action::Choose(_) => false,
        }
    }

    async fn navigate(&mut self, target: &str) {
        let Some(url) = resolve_target(&self.base, target) else {
            self.append_history(format!("Visit {target}"));
            self.report_error(format!("{target} is not a valid URL"));
            return;
        };
        self.append_history(format!("Visit {url}"));
        if let Err(e) = self.page.goto(url.as_str()).await {
            self.report_error(format!("Navigation to {url} failed: {e}"));
        }
    }

    async fn assert_selector(&mut self, selector: &str) -> bool {
        self.append_history(format!("Assert CSS selector {selector}"));
        match self.page.wait_for_selector(selector, SELECTOR_TIMEOUT).await {
            Ok(()) => {
                self.append_history(format!("Found {selector}"));
                true
            }
            Err(e) => {
                warn!("Failed to locate {} after {:?}: {}", selector, SELECTOR_TIMEOUT, e);
                self.report_error("selector was not found");
                false
            }
        }
    }

    async fn assert_url(&mut self, pattern: &str) -> bool {
        self.append_history(format!("Assert page URL {pattern}"));
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                self.report_error(format!("Invalid pattern {pattern}: {e}"));
                return false;
            }
        };
        let url = match self.page.url().await {
            Ok(url) => url,
            Err(e) => {
                self.report_error(format!("Could not read the page URL: {e}"));
                return false;
            }
        };
        if regex.is_match(&url) {
            self.append_history(format!("Page URL {url} matches {pattern}"));
            true
        } else {
            self.report_error(format!("Page URL {url} does not match {pattern}"));
            false
        }
    }

    async fn submit_form(&mut self, fields: &[FormField], submit_element_name: &str) {
        let names: Vec<&str> = fields.iter().map(|f| f.form_element_name.as_str()).collect();
        self.append_history(format!("Submitting form with fields {}", names.join(", ")));

        let mut errors: Vec<String> = Vec::new();
        for field in fields {
            if let Err(e) = fill_field(self.page.as_ref(), field, Some(TYPING_DELAY)).await {
                warn!(
                    "Failed to set {} to {}: {}",
                    field.form_element_name, field.form_element_value, e
                );
                errors.push(format!("could not set {}", field.form_element_name));
            }
        }

        let before = match self.page.url().await {
            Ok(url) => url,
            Err(e) => {
                errors.push(format!("could not read the page URL: {e}"));
                String::new()
            }
        };

        debug!("Submitting AI-populated form");
        if let Err(e) = self.page.click(&name_selector(submit_element_name)).await {
            errors.push(format!("could not click {submit_element_name}: {e}"));
        }

        if let Err(e) = self.page.wait_for_navigation(&before, NAVIGATION_TIMEOUT).await {
            warn!("Timed out waiting for navigation: {}", e);
            warn!("Proceeding optimistically");
        }

        if errors.is_empty() {
            self.append_history("Form submitted successfully");
        } else {
            self.report_error(format!(
                "Errors occurred submitting form: {}",
                errors.join(", ")
            ));
        }
    }

    fn append_history(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.history.push(message);
    }

    fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.history.failed(message.clone());
        self.errors.push(message);
    }
}

/// Questions the session asks its operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalPrompt {
    /// The goal was completed; offer a follow-up.
    NewGoal,
    /// A new failure or a stall; offer to adjust or abandon.
    AdjustGoal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorAnswer {
    Replace {
        goal: String,
        success_criteria: String,
    },
    Keep,
    Quit,
}

#[async_trait]
pub trait Operator: Send {
    async fn ask(&mut self, prompt: GoalPrompt) -> std::io::Result<OperatorAnswer>;
}

/// Drives `GoalEngine::step` until the operator stops the session.
pub struct SessionController<O> {
    engine: GoalEngine,
    operator: O,
    steps: Vec<Step>,
}

impl<O: Operator> SessionController<O> {
    pub fn new(engine: GoalEngine, operator: O) -> Self {
        Self {
            engine,
            operator,
            steps: Vec::new(),
        }
    }

    pub fn engine(&self) -> &GoalEngine {
        &self.engine
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub async fn run(&mut self) -> Result<(), EngineError> {
        let mut steps_since_completion = 0;
        loop {
            let error_count = self.engine.errors().len();
            info!(
                "Goal: {} ({})",
                self.engine.goal().goal_text,
                self.engine.goal().success_criteria
            );
            let Some(step) = self.engine.step().await? else {
                continue;
            };

            let done = step.done;
            self.steps.push(step);
            if done {
                info!("Goal completed!");
                steps_since_completion = 0;
                match self.operator.ask(GoalPrompt::NewGoal).await? {
                    OperatorAnswer::Replace {
                        goal,
                        success_criteria,
                    } => self.engine.replace_goal(goal, success_criteria),
                    OperatorAnswer::Keep | OperatorAnswer::Quit => break,
                }
            } else {
                steps_since_completion += 1;
            }

            if self.engine.errors().len() > error_count
                || steps_since_completion > MAX_STEPS_SINCE_GOAL_COMPLETION
            {
                match self.operator.ask(GoalPrompt::AdjustGoal).await? {
                    OperatorAnswer::Quit => break,
                    OperatorAnswer::Replace {
                        goal,
                        success_criteria,
                    } => self.engine.replace_goal(goal, success_criteria),
                    OperatorAnswer::Keep => {}
                }
                steps_since_completion = 0;
            }
        }
        Ok(())
    }

    pub fn into_parts(self) -> (GoalEngine, Vec<Step>) {
        (self.engine, self.steps)
    }
}
