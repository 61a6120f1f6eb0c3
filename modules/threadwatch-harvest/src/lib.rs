pub mod checkpoint;
pub mod detect;
pub mod discovery;
pub mod extract;
pub mod login;
pub mod pipeline;
pub mod search;
pub mod stats;
pub mod traversal;

pub use checkpoint::{CheckpointOutcome, FinalReport, ResultsStore};
pub use detect::MatchDetector;
pub use discovery::{discover_links, Discovery};
pub use extract::{extract_post, POST_SELECTOR};
pub use login::prepare_session;
pub use pipeline::{HarvestReport, Harvester, RunOutcome};
pub use search::{open_search, search_url};
pub use stats::HarvestStats;
pub use traversal::{traverse_thread, Traversal};

/// Why a bounded loop stopped. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The size cap was reached.
    TargetReached,
    /// The wall-clock budget ran out.
    DeadlineExceeded,
    /// The page gave out first (navigation or driver failure).
    Exhausted,
}
