//! Survey of the chat agent: one combined prompt, one captured reply,
//! one ordinal score per reply line.

pub mod error;
pub mod mapper;
pub mod output;
pub mod prompt;
pub mod runner;

pub use error::{Result, SurveyError};
pub use mapper::{map_text_to_score, MappedLines};
pub use output::write_response;
pub use prompt::PromptBundle;
pub use runner::{Capture, SurveyOutcome, SurveyRunner, SurveyState};
