use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use webgoal::config::{CrawlArgs, DecisionSettings};
use webgoal::forms::FormOutcome;
use webgoal::login::load_cookies;
use webgoal::{
    ActionChooser, Brain, BrowserDriver, BrowserSession, CrawlQueue, CrawlSession, Crawler,
    FormCompletionPipeline, Frontier, JsonLinesDataset, telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = CrawlArgs::parse();
    telemetry::init(args.verbose);

    let settings = DecisionSettings::from_env()?;
    let seeds = args.seeds()?;
    let login = args.login()?;

    let driver: Arc<dyn BrowserDriver> = Arc::new(
        BrowserSession::launch_blocking(args.headless())
            .await
            .context("failed to launch Chrome")?,
    );

    let cookies = match &login {
        Some(login) => load_cookies(driver.as_ref(), login)
            .await
            .with_context(|| format!("failed to sign in at {}", login.url))?,
        None => Vec::new(),
    };

    let queue = Arc::new(CrawlQueue::new());
    let frontier: Arc<dyn Frontier> = queue.clone();
    let brain = Brain::with_url(settings.api_key, settings.api_url);
    let chooser = ActionChooser::with_tiers(Arc::new(brain), settings.tiers);
    let pipeline = FormCompletionPipeline::new(chooser, driver.clone(), frontier.clone(), cookies.clone());

    let dataset = JsonLinesDataset::open(&args.output)
        .await
        .with_context(|| format!("failed to open {}", args.output.display()))?;
    let session = Arc::new(CrawlSession::new(
        pipeline,
        frontier,
        Arc::new(dataset),
        cookies,
        Duration::from_secs(args.form_deadline_secs),
    ));

    let crawler = Crawler::new(session, driver, queue, args.concurrency);
    let reports = crawler.run(&seeds).await;

    let submitted: usize = reports
        .iter()
        .flat_map(|r| &r.forms)
        .filter(|o| matches!(o, FormOutcome::Submitted { .. }))
        .count();
    info!(
        pages = reports.len(),
        forms_submitted = submitted,
        "Results written to {}",
        args.output.display()
    );
    Ok(())
}
