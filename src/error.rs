use thiserror::Error;

/// Failures raised by the browser driver.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("browser error: {0}")]
    Driver(String),
}

impl From<anyhow::Error> for BrowserError {
    fn from(e: anyhow::Error) -> Self {
        BrowserError::Driver(format!("{e:#}"))
    }
}

/// Failures talking to the decision service. These never escape the
/// chooser; they only explain why no decision was available.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decision service returned {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reply carried no call to `{0}`")]
    MissingCall(String),
    #[error("reply called `{got}` instead of `{expected}`")]
    WrongCall { expected: String, got: String },
    #[error("reply carried {0} calls, expected exactly one")]
    AmbiguousCall(usize),
    #[error("reply arguments are not an object")]
    NotAnObject,
    #[error("prompt leaves no room for a reply ({estimate} estimated tokens)")]
    PromptTooLarge { estimate: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingEnv(&'static str),
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid login field `{0}`, expected selector=value")]
    InvalidLoginField(String),
}

/// Errors that end a goal session: the page could not be read, or the
/// operator could not be asked.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read page state: {0}")]
    Browser(#[from] BrowserError),
    #[error("operator prompt failed: {0}")]
    Operator(#[from] std::io::Error),
}
