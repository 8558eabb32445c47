//! Opportunistic form filling during a crawl: ask for three candidate
//! submissions and try them until one moves the page somewhere new.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::brain::ChatMessage;
use crate::chooser::ActionChooser;
use crate::error::BrowserError;
use crate::hands::{BrowserDriver, BrowserPage};
use crate::schema::{FormCompletionReply, Submission, form_completion_schema};
use crate::types::{Cookie, FORM_SUBMISSION_CANDIDATES, FormField, NAVIGATION_TIMEOUT};

const SYSTEM_PROMPT: [&str; 6] = [
    "You are a website user. You read the page content on a website and fill out forms with the necessary information to continue your workflow",
    "You'll be presented with some text from the website, and the HTML of a form",
    "The text and form are separated by the delimeter '---'",
    "Respond with three form submissions that you think are appropriate for the text",
    "You only need to provide the user-visible fields, not hidden fields",
    "The reason to respond with three submissions is to be compatible with form validation",
];

/// Where newly reached pages are sent.
pub trait Frontier: Send + Sync {
    fn enqueue(&self, url: String);
}

pub(crate) fn name_selector(name: &str) -> String {
    format!("form [name=\"{}\"]", name.replace('"', "\\\""))
}

pub(crate) fn id_selector(id: &str) -> String {
    format!("#{id}")
}

/// Replace a field's contents, locating it by form element name first and
/// by element id second.
pub async fn fill_field(
    page: &dyn BrowserPage,
    field: &FormField,
    delay: Option<Duration>,
) -> Result<(), BrowserError> {
    let selectors = [
        name_selector(&field.form_element_name),
        id_selector(&field.form_element_name),
    ];
    let mut errors = Vec::new();
    for selector in &selectors {
        let attempt = async {
            page.select_all(selector).await?;
            page.type_text(selector, &field.form_element_value, delay).await
        };
        match attempt.await {
            Ok(()) => return Ok(()),
            Err(e) => errors.push(e.to_string()),
        }
    }
    Err(BrowserError::ElementNotFound(format!(
        "{} ({})",
        field.form_element_name,
        errors.join(", ")
    )))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    /// The decision service gave no usable candidates.
    NoDecision,
    /// A candidate moved the page; the destination was enqueued.
    Submitted { candidate: usize, destination: String },
    /// Every candidate left the URL unchanged.
    Rejected,
    /// A candidate could not be entered; nothing further was tried.
    Aborted { candidate: usize, reason: String },
    /// The deadline passed first. The tab, if one was opened, is closed.
    TimedOut,
}

pub struct FormCompletionPipeline {
    chooser: ActionChooser,
    driver: Arc<dyn BrowserDriver>,
    frontier: Arc<dyn Frontier>,
    cookies: Vec<Cookie>,
}

impl FormCompletionPipeline {
    pub fn new(
        chooser: ActionChooser,
        driver: Arc<dyn BrowserDriver>,
        frontier: Arc<dyn Frontier>,
        cookies: Vec<Cookie>,
    ) -> Self {
        Self {
            chooser,
            driver,
            frontier,
            cookies,
        }
    }

    pub fn messages(page_text: &str, form: &str) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::user(format!("The page text is: --- {page_text} ---")),
            ChatMessage::user(format!("The form is: --- {form} ---")),
        ];
        messages.extend(SYSTEM_PROMPT.iter().map(|m| ChatMessage::system(*m)));
        messages
    }

    /// Fill `form` on `url` in a tab of its own, giving up at `deadline`.
    pub async fn complete_form(
        &self,
        url: &str,
        relevant_text: &str,
        form: &str,
        deadline: Instant,
    ) -> Result<FormOutcome, BrowserError> {
        debug!("Analyzing {} with AI", url);
        let decision = self
            .chooser
            .decide(Self::messages(relevant_text, form), form_completion_schema());
        let Ok(decision) = timeout_at(deadline, decision).await else {
            warn!("No form completion for {} before the deadline", url);
            return Ok(FormOutcome::TimedOut);
        };
        let Some(arguments) = decision else {
            return Ok(FormOutcome::NoDecision);
        };
        let reply: FormCompletionReply = match serde_json::from_value(arguments.into()) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Malformed form completion for {}: {}", url, e);
                return Ok(FormOutcome::NoDecision);
            }
        };

        let Ok(page) = timeout_at(deadline, self.driver.new_page()).await else {
            return Ok(FormOutcome::TimedOut);
        };
        let page = page?;
        let outcome = match timeout_at(deadline, self.try_candidates(page.as_ref(), url, &reply)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Form on {} still in progress at the deadline", url);
                Ok(FormOutcome::TimedOut)
            }
        };
        if let Err(e) = page.close().await {
            warn!("Failed to close form tab: {}", e);
        }
        outcome
    }

    async fn try_candidates(
        &self,
        page: &dyn BrowserPage,
        url: &str,
        reply: &FormCompletionReply,
    ) -> Result<FormOutcome, BrowserError> {
        page.set_cookies(&self.cookies).await?;
        page.goto(url).await?;
        let loaded_url = page.url().await?;

        let submit = name_selector(&reply.submit_element_name);
        for (candidate, submission) in reply
            .submissions
            .iter()
            .take(FORM_SUBMISSION_CANDIDATES)
            .enumerate()
        {
            if let Err(reason) = enter_submission(page, submission).await {
                warn!("{}", reason);
                return Ok(FormOutcome::Aborted { candidate, reason });
            }

            debug!("Submitting AI-populated form to {}", loaded_url);
            if let Err(e) = page.click(&submit).await {
                let reason = format!("Failed to click {}: {}", reply.submit_element_name, e);
                warn!("{}", reason);
                return Ok(FormOutcome::Aborted { candidate, reason });
            }
            if let Err(e) = page.wait_for_navigation(&loaded_url, NAVIGATION_TIMEOUT).await {
                warn!("Timed out waiting for navigation: {}", e);
                warn!("Proceeding optimistically");
            }

            let destination = page.url().await?;
            if destination != loaded_url {
                debug!(
                    "Form successfully submitted to {}, then redirected to {}: {:?}",
                    loaded_url, destination, submission.fields
                );
                debug!("Adding {} to the processing queue", destination);
                self.frontier.enqueue(destination.clone());
                return Ok(FormOutcome::Submitted {
                    candidate,
                    destination,
                });
            }

            debug!(
                "Form submission to {} appears to have been rejected, because the page URL didn't change: {:?}",
                loaded_url, submission.fields
            );
        }
        Ok(FormOutcome::Rejected)
    }
}

async fn enter_submission(page: &dyn BrowserPage, submission: &Submission) -> Result<(), String> {
    for field in &submission.fields {
        if let Err(e) = fill_field(page, field, None).await {
            return Err(format!(
                "Failed to set {} to {}: {}",
                field.form_element_name, field.form_element_value, e
            ));
        }
    }
    Ok(())
}
