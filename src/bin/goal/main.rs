mod prompt;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{debug, info};

use webgoal::config::{DecisionSettings, GoalArgs};
use webgoal::{ActionChooser, Brain, BrowserDriver, BrowserSession, Goal, GoalEngine, SessionController, telemetry};

use prompt::TerminalOperator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = GoalArgs::parse();
    telemetry::init(args.verbose);

    let settings = DecisionSettings::from_env()?;
    let start_url = args.start_url()?;

    let session = BrowserSession::launch_blocking(args.headless())
        .await
        .context("failed to launch Chrome")?;
    let page = session.new_page().await?;

    let brain = Brain::with_url(settings.api_key, settings.api_url);
    let chooser = ActionChooser::with_tiers(Arc::new(brain), settings.tiers);
    let goal = Goal::new(args.goal, args.success_criteria, start_url);

    let engine = GoalEngine::new(goal, page.clone(), chooser);
    engine.initialize().await?;
    info!("Starting at {}", engine.goal().start_url);

    let mut controller = SessionController::new(engine, TerminalOperator::new());
    let outcome = controller.run().await;

    let (engine, steps) = controller.into_parts();
    info!("Session summary ({} step(s))", steps.len());
    for step in &steps {
        info!("{}", step);
    }
    for item in engine.history().items() {
        debug!("{}", item);
    }

    if let Err(e) = page.close().await {
        debug!("Failed to close tab: {}", e);
    }
    outcome?;
    Ok(())
}
