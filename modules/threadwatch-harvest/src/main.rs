use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use threadwatch_browser::{ChromeSession, LaunchOptions};
use threadwatch_common::{HarvestConfig, SessionGate};
use threadwatch_harvest::{Harvester, RunOutcome};

#[derive(Parser)]
#[command(name = "threadwatch-harvest", about = "Harvest threads and collect agent replies")]
struct Args {
    /// Directory for partial and final result files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Substring that flags a post (case-insensitive)
    #[arg(long)]
    marker: Option<String>,

    /// Links to collect per query (capped at the discovery limit)
    #[arg(long)]
    links_per_query: Option<usize>,

    /// Maximum posts collected per thread
    #[arg(long)]
    max_thread_posts: Option<usize>,

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
    info!("Threadwatch harvest starting...");

    let mut config = HarvestConfig::from_env()?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(marker) = args.marker {
        config.target_marker = marker;
    }
    if let Some(n) = args.links_per_query {
        config.links_per_query = n;
    }
    if let Some(n) = args.max_thread_posts {
        config.max_thread_posts = n;
    }
    if args.headless {
        config.browser.headless = true;
    }
    config.validate()?;

    let session = ChromeSession::launch(&LaunchOptions {
        executable: config.browser.executable.clone(),
        profile_dir: config.browser.profile_dir.clone(),
        headless: config.browser.headless,
    })
    .await
    .context("launching browser")?;

    let harvester = Harvester::new(Arc::new(session), Arc::new(config));
    let mut gate = SessionGate::stdin();
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let report = harvester.run(&mut gate, interrupt).await;
    println!("{}", report.stats);
    for path in &report.final_files.written {
        info!(path = %path.display(), "Saved");
    }

    match report.outcome {
        RunOutcome::Failed(reason) => anyhow::bail!("harvest failed: {reason}"),
        RunOutcome::Completed | RunOutcome::Interrupted => Ok(()),
    }
}
