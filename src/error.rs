//! Error types for the Lodestar library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`LodestarError`] enum.
//!
//! # Examples
//!
//! ```
//! use lodestar::error::{LodestarError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(LodestarError::invalid_query("query is empty"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use anyhow;
use thiserror::Error;

use crate::trainer::TrainingStage;

/// The main error type for Lodestar operations.
///
/// Configuration and data-integrity errors abort a training run; upstream
/// errors are recoverable at the unit granularity and never escape the
/// ingest layer; invalid queries are rejected before feature extraction.
#[derive(Error, Debug)]
pub enum LodestarError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing or malformed configuration, such as a required dataset column.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The dataset violates a structural invariant (empty, single-class, ...).
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// An inference-time query that cannot be routed (empty or whitespace).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The persisted vectorizer and ensemble do not belong together.
    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// A corrupt, truncated, or incompatible persisted artifact.
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Recoverable failure of an upstream collaborator (content source or
    /// generative labeler). Handled per unit, never fatal to a whole batch.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A training run aborted mid-workflow; names the failed transition.
    #[error("Training aborted during {stage}: {source}")]
    TrainingAborted {
        /// The state-machine transition that failed.
        stage: TrainingStage,
        /// The underlying failure.
        #[source]
        source: Box<LodestarError>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// CSV parsing/writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with LodestarError.
pub type Result<T> = std::result::Result<T, LodestarError>;

impl LodestarError {
    /// Create a new configuration error.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        LodestarError::Configuration(msg.into())
    }

    /// Create a new data integrity error.
    pub fn data_integrity<S: Into<String>>(msg: S) -> Self {
        LodestarError::DataIntegrity(msg.into())
    }

    /// Create a new invalid query error.
    pub fn invalid_query<S: Into<String>>(msg: S) -> Self {
        LodestarError::InvalidQuery(msg.into())
    }

    /// Create a new artifact mismatch error.
    pub fn artifact_mismatch<S: Into<String>>(msg: S) -> Self {
        LodestarError::ArtifactMismatch(msg.into())
    }

    /// Create a new artifact error.
    pub fn artifact<S: Into<String>>(msg: S) -> Self {
        LodestarError::Artifact(msg.into())
    }

    /// Create a new upstream error.
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        LodestarError::Upstream(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        LodestarError::Serialization(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LodestarError::Other(msg.into())
    }

    /// Wrap an error with the training-stage transition it aborted.
    pub fn training_aborted(stage: TrainingStage, source: LodestarError) -> Self {
        LodestarError::TrainingAborted {
            stage,
            source: Box::new(source),
        }
    }
}
