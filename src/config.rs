use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::brain::DEFAULT_API_URL;
use crate::chooser::ModelTiers;
use crate::error::ConfigError;
use crate::login::{LoginConfig, parse_login_field};
use crate::types::DEFAULT_START_URL;

/// Self-driving web application testing.
#[derive(Parser, Debug, Clone)]
#[command(name = "goal", version, about)]
pub struct GoalArgs {
    /// What the session should accomplish.
    #[arg(short, long)]
    pub goal: String,

    /// When the goal counts as achieved.
    #[arg(short, long, default_value = "")]
    pub success_criteria: String,

    #[arg(short, long, default_value = DEFAULT_START_URL)]
    pub url: String,

    /// Debug logging and a visible browser.
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long)]
    pub show_browser: bool,
}

impl GoalArgs {
    pub fn headless(&self) -> bool {
        !(self.verbose || self.show_browser)
    }

    pub fn start_url(&self) -> Result<Url, ConfigError> {
        parse_url(&self.url)
    }
}

/// Crawl a site and fill in the forms it finds.
#[derive(Parser, Debug, Clone)]
#[command(name = "crawl", version, about)]
pub struct CrawlArgs {
    /// Seed URLs.
    #[arg(short, long = "url", default_value = DEFAULT_START_URL)]
    pub urls: Vec<String>,

    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long)]
    pub show_browser: bool,

    /// Pages handled at once.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// JSON Lines file receiving one record per visited page.
    #[arg(long, default_value = "storage/datasets/default.jsonl")]
    pub output: PathBuf,

    /// Upper bound on form completion per page.
    #[arg(long, default_value_t = 60)]
    pub form_deadline_secs: u64,

    /// Sign in here before crawling.
    #[arg(long)]
    pub login_url: Option<String>,

    /// `selector=value`, repeatable.
    #[arg(long = "login-field")]
    pub login_fields: Vec<String>,

    #[arg(long, default_value = "input[type=\"submit\"]")]
    pub login_submit: String,
}

impl CrawlArgs {
    pub fn headless(&self) -> bool {
        !(self.verbose || self.show_browser)
    }

    pub fn seeds(&self) -> Result<Vec<String>, ConfigError> {
        self.urls
            .iter()
            .map(|url| parse_url(url).map(String::from))
            .collect()
    }

    pub fn login(&self) -> Result<Option<LoginConfig>, ConfigError> {
        let Some(url) = &self.login_url else {
            return Ok(None);
        };
        let fields = self
            .login_fields
            .iter()
            .map(|raw| parse_login_field(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(LoginConfig {
            url: parse_url(url)?.into(),
            fields,
            submit_selector: self.login_submit.clone(),
        }))
    }
}

pub fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// Decision-service settings read from the environment.
#[derive(Debug, Clone)]
pub struct DecisionSettings {
    pub api_key: String,
    pub api_url: String,
    pub tiers: ModelTiers,
}

impl DecisionSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingEnv("OPENAI_API_KEY"))?;
        let api_url = lookup("OPENAI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let mut tiers = ModelTiers::default();
        if let Some(model) = lookup("WEBGOAL_SMALL_MODEL") {
            tiers.small.model = model;
        }
        if let Some(model) = lookup("WEBGOAL_MEDIUM_MODEL") {
            tiers.medium.model = model;
        }
        if let Some(model) = lookup("WEBGOAL_LARGE_MODEL") {
            tiers.large.model = model;
        }

        Ok(Self {
            api_key,
            api_url,
            tiers,
        })
    }
}
