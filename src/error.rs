//! Error taxonomy for the extraction pipeline
//!
//! Mutations surface these synchronously to the caller; nothing is swallowed
//! at the write layer. Re-merging an already-merged extraction is not an
//! error and is reported through `MergeOutcome::already_merged` instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Referenced extraction, document, or item does not exist
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// Operation cannot proceed, e.g. a merge with no resolvable project
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Malformed input at the boundary, e.g. an unknown mapping status
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PipelineError::NotFound(kind, id.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::NotFound(..))
    }
}
