use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use threadwatch_browser::{BrowserSession, ChromeSession, LaunchOptions};
use threadwatch_common::{ParquetTableWriter, SessionGate, SurveyConfig};
use threadwatch_survey::{write_response, SurveyRunner};

#[derive(Parser)]
#[command(name = "threadwatch-survey", about = "Ask the chat agent the survey questions and score its reply")]
struct Args {
    /// Voter persona prepended to the prompt
    #[arg(long)]
    persona: Option<String>,

    /// Directory for the response file
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("threadwatch=info".parse()?))
        .init();

    let args = Args::parse();
    info!("Threadwatch survey starting...");

    let mut config = SurveyConfig::from_env()?;
    if args.persona.is_some() {
        config.persona = args.persona;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.headless {
        config.browser.headless = true;
    }
    let config = Arc::new(config);

    let session: Arc<dyn BrowserSession> = Arc::new(
        ChromeSession::launch(&LaunchOptions {
            executable: config.browser.executable.clone(),
            profile_dir: config.browser.profile_dir.clone(),
            headless: config.browser.headless,
        })
        .await
        .context("launching browser")?,
    );

    let mut gate = SessionGate::stdin();
    let mut runner = SurveyRunner::new(session.clone(), config.clone());
    let outcome = runner.run(&mut gate).await;

    if let Err(e) = session.shutdown().await {
        warn!(error = %e, "Browser shutdown failed");
    }

    let outcome = outcome.context("survey run failed")?;
    let path = write_response(&config, &outcome.response, &ParquetTableWriter)?;
    println!("Saved {}", path.display());
    for (line, score) in outcome
        .response
        .parsed_lines
        .iter()
        .zip(&outcome.response.mapped_scores)
    {
        match score.value() {
            Some(v) => println!("{v:>3}  {line}"),
            None => println!("  ?  {line}"),
        }
    }
    Ok(())
}
