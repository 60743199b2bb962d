//! Inference collaborator client
//!
//! Wraps the external determination model behind the core
//! `InferenceService` trait. The service is treated as an opaque, possibly
//! slow, possibly failing black box: calls carry a hard timeout, are
//! retried at most twice (they are not idempotent), and failures degrade to
//! a needs-review response at the pipeline layer rather than crashing.

pub mod backend;
pub mod prompt;

pub use backend::{HttpInferenceBackend, InferenceConfig};
pub use prompt::build_transaction_text;

use thiserror::Error;

/// Inference errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Bad response: {0}")]
    BadResponse(String),

    /// All attempts exhausted
    #[error("Inference unavailable: {0}")]
    Unavailable(String),
}

impl From<InferenceError> for taxlens_core::Error {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Unavailable(msg) | InferenceError::Request(msg) => {
                taxlens_core::Error::InferenceUnavailable(msg)
            }
            InferenceError::Timeout(secs) => {
                taxlens_core::Error::InferenceUnavailable(format!("timeout after {secs}s"))
            }
            other => taxlens_core::Error::Inference(other.to_string()),
        }
    }
}
