//! Top-level error type
//!
//! Subsystem crates define their own thiserror enums and convert into this
//! one at the crate boundary. Callers always receive a determination object
//! rather than nothing; these errors surface only where no degraded result
//! is possible (e.g. a rejected review).

use thiserror::Error;

/// Result alias using the taxlens error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Both retrieval paths (embedding and lexical) are unreachable
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// External inference call failed after bounded retries
    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// Concurrent pattern creation collided; resolved by reinforcing the
    /// existing pattern, surfaced only when that resolution also fails
    #[error("Pattern store conflict: {0}")]
    PatternStoreConflict(String),

    /// Review with a determination change but no explanation
    #[error("Invalid review: {0}")]
    InvalidReview(String),

    #[error("Pattern store error: {0}")]
    PatternStore(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Learning error: {0}")]
    Learning(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
