//! The harvest run: queries in order, links in discovery order, one thread
//! at a time. Final persistence and browser teardown happen on every exit
//! path, including interrupts and panics inside the run.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use threadwatch_browser::BrowserSession;
use threadwatch_common::{HarvestConfig, HarvestError, MatchRecord, Query, SessionGate};
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointOutcome, FinalReport, ResultsStore};
use crate::detect::MatchDetector;
use crate::discovery::discover_links;
use crate::login::prepare_session;
use crate::search::open_search;
use crate::stats::HarvestStats;
use crate::traversal::traverse_thread;

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
    Failed(String),
}

#[derive(Debug)]
pub struct HarvestReport {
    pub outcome: RunOutcome,
    pub stats: HarvestStats,
    pub results: Vec<MatchRecord>,
    pub final_files: FinalReport,
}

pub struct Harvester {
    session: Arc<dyn BrowserSession>,
    config: Arc<HarvestConfig>,
    detector: MatchDetector,
}

impl Harvester {
    pub fn new(session: Arc<dyn BrowserSession>, config: Arc<HarvestConfig>) -> Self {
        let detector = MatchDetector::new(&config.target_marker);
        Self {
            session,
            config,
            detector,
        }
    }

    /// Run with the configured Parquet/CSV writers.
    pub async fn run(
        &self,
        gate: &mut SessionGate,
        shutdown: impl Future<Output = ()>,
    ) -> HarvestReport {
        self.run_with_store(ResultsStore::from_config(&self.config), gate, shutdown)
            .await
    }

    /// Run until every query is processed, the run fails, or `shutdown`
    /// resolves. Then write the final files and close the browser.
    pub async fn run_with_store(
        &self,
        mut store: ResultsStore,
        gate: &mut SessionGate,
        shutdown: impl Future<Output = ()>,
    ) -> HarvestReport {
        let mut stats = HarvestStats::default();
        let mut panic = None;

        let outcome = {
            let work = AssertUnwindSafe(self.harvest(gate, &mut store, &mut stats)).catch_unwind();
            tokio::select! {
                result = work => match result {
                    Ok(Ok(())) => RunOutcome::Completed,
                    Ok(Err(e)) => {
                        error!(error = %e, "Harvest aborted");
                        RunOutcome::Failed(e.to_string())
                    }
                    Err(payload) => {
                        error!("Harvest panicked");
                        panic = Some(payload);
                        RunOutcome::Failed("panic".to_string())
                    }
                },
                _ = shutdown => {
                    warn!("Interrupted; writing what was collected");
                    RunOutcome::Interrupted
                }
            }
        };

        let results = store.results().to_vec();
        let final_files = store.finalize(chrono::Utc::now().timestamp());

        if let Err(e) = self.session.shutdown().await {
            warn!(error = %e, "Browser shutdown failed");
        }

        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }

        info!(?outcome, matches = results.len(), "Harvest finished");
        HarvestReport {
            outcome,
            stats,
            results,
            final_files,
        }
    }

    async fn harvest(
        &self,
        gate: &mut SessionGate,
        store: &mut ResultsStore,
        stats: &mut HarvestStats,
    ) -> Result<(), HarvestError> {
        let session = self.session.as_ref();
        prepare_session(session, &self.config, gate).await?;

        for query in &self.config.queries {
            self.run_query(query, store, stats).await;
            tokio::time::sleep(self.config.query_pause).await;
        }
        Ok(())
    }

    async fn run_query(&self, query: &Query, store: &mut ResultsStore, stats: &mut HarvestStats) {
        let session = self.session.as_ref();
        info!(query = %query, "Query started");

        if let Err(e) = open_search(session, &self.config, query).await {
            warn!(query = %query, error = %e, "Skipping query");
            stats.queries_skipped += 1;
            return;
        }
        stats.queries_run += 1;

        let discovery = discover_links(session, &self.config, query).await;
        stats.links_discovered += discovery.links.len() as u32;

        let before = store.len();
        for link in &discovery.links {
            let traversal = traverse_thread(session, &self.config, link).await;
            let conversation = traversal.conversation;
            if conversation.is_empty() {
                stats.threads_empty += 1;
                continue;
            }
            stats.threads_collected += 1;
            stats.posts_seen += conversation.len() as u32;

            let matches: Vec<MatchRecord> = self
                .detector
                .detect(&conversation)
                .into_iter()
                .map(|hit| MatchRecord::new(query, &conversation, hit))
                .collect();
            let added = store.extend(matches);
            if added > 0 {
                stats.matches += added as u32;
                info!(link = %link, added, total = store.len(), "Matches found");
            }

            match store.checkpoint_if_due(added) {
                CheckpointOutcome::Written(_) => stats.checkpoints_written += 1,
                CheckpointOutcome::Failed => stats.checkpoints_failed += 1,
                CheckpointOutcome::NotDue => {}
            }
        }

        info!(
            query = %query,
            links = discovery.links.len(),
            matches = store.len() - before,
            "Query finished"
        );
    }
}
