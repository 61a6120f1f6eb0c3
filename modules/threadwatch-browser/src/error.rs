use thiserror::Error;

use crate::ContextId;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Navigation to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Element query failed: {0}")]
    Query(String),

    #[error("Context {0} is not open")]
    UnknownContext(ContextId),

    #[error("Browser error: {0}")]
    Driver(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Driver(err.to_string())
    }
}

impl From<serde_json::Error> for BrowserError {
    fn from(err: serde_json::Error) -> Self {
        BrowserError::Driver(format!("script result: {err}"))
    }
}
