use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionFailure),

    #[error("Persistence error for {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session not ready: {0}")]
    SessionNotReady(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// A single field (or whole element) that could not be extracted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ExtractionFailure {
    pub field: &'static str,
    pub reason: String,
}

impl ExtractionFailure {
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            reason: "no rule matched".to_string(),
        }
    }

    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
