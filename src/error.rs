//! Typed failure kinds for a single chunk's trip through the engine.
//!
//! None of these abort a run: the coordinator turns each into a degraded,
//! failed or warning entry in the report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ReconstructError {
    /// A page holds a line longer than the chunk budget with no sentence boundary to cut at.
    #[error("page {page} cannot be split under budget {budget}: a {line_chars}-char line has no sentence boundary")]
    Split {
        page: u32,
        line_chars: usize,
        budget: usize,
    },

    /// Timeout, rate limit or unreachable service. Retried with backoff.
    #[error("correction service transient failure: {0}")]
    ServiceTransient(String),

    /// Empty, malformed or out-of-bounds output. Retried once, then falls back.
    #[error("correction service returned an invalid response: {0}")]
    ServiceInvalidResponse(String),

    /// Checkpoint persistence unavailable. Resume capability is lost, the run continues.
    #[error("checkpoint store unavailable: {0}")]
    CheckpointIo(String),
}

impl ReconstructError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconstructError::ServiceTransient(_))
    }

    pub fn is_invalid_response(&self) -> bool {
        matches!(self, ReconstructError::ServiceInvalidResponse(_))
    }
}

impl From<std::io::Error> for ReconstructError {
    fn from(err: std::io::Error) -> Self {
        ReconstructError::CheckpointIo(err.to_string())
    }
}
