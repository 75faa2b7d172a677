//! Codify - extraction confirmation and project library engine
//!
//! This library provides the core functionality for confirming AI-codified
//! document extractions and folding their accepted line items into a
//! per-project data library with full value provenance.

pub mod cli;
pub mod error;
pub mod jobs;
pub mod merge;
pub mod model;
pub mod storage;
pub mod workflow;
pub mod workspace;

/// Re-export commonly used types
pub use error::PipelineError;
pub use merge::{DeleteImpact, MergeEngine, MergeOutcome};
pub use model::{CodifiedExtraction, CodifiedItem, MappingStats, MappingStatus, ProjectDataItem};
pub use storage::Database;
pub use workspace::Workspace;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "codify";
