use thiserror::Error;
use threadwatch_browser::BrowserError;
use threadwatch_common::HarvestError;

pub type Result<T> = std::result::Result<T, SurveyError>;

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("No message input matched any of {0:?}")]
    NoInput(Vec<String>),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Session(#[from] HarvestError),
}
