//! Goal-directed browser automation and form-filling crawls, steered by an
//! OpenAI-compatible decision service.

pub mod brain;
pub mod chooser;
pub mod config;
pub mod context;
pub mod crawl;
pub mod dedup;
mod dom;
pub mod error;
pub mod forms;
pub mod goal;
pub mod hands;
pub mod history;
pub mod login;
pub mod markdown;
pub mod schema;
pub mod telemetry;
pub mod types;

pub use brain::{Brain, DecisionService};
pub use chooser::{ActionChooser, ModelTiers};
pub use crawl::{CrawlQueue, CrawlSession, Crawler, JsonLinesDataset};
pub use error::{BrowserError, ConfigError, DecisionError, EngineError};
pub use forms::{FormCompletionPipeline, Frontier};
pub use goal::{GoalEngine, Operator, SessionController};
pub use hands::{BrowserDriver, BrowserPage, BrowserSession};
pub use types::{Goal, Mode, Step};
