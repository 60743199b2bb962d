//! Historical pattern store and matcher
//!
//! Half a million historical refund records distill into three pattern
//! kinds, all partitioned by tax type:
//! - `VendorPattern`: aggregated behavior per (vendor, tax type)
//! - `RefundBasisPattern`: usage statistics per (refund basis, tax type)
//! - `LearnedPattern`: rules extracted from analyst corrections, kept in an
//!   append-only event log with a derived active set
//!
//! The matcher is pure: application counters are committed by the caller
//! only after a calibration result exists, so a cancelled pipeline never
//! leaves partial increments behind.

pub mod keywords;
pub mod matcher;
pub mod store;
pub mod types;

pub use keywords::extract_keywords;
pub use matcher::{MatchInput, PatternMatcher};
pub use store::{ConfirmationOutcome, InMemoryPatternStore, PatternEvent, PatternStore};
pub use types::{
    LearnedPattern, MatchSource, PatternMatch, PatternType, RefundBasisPattern, TriggerCondition,
    VendorPattern,
};

use thiserror::Error;

/// Pattern store errors
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent creation collision that could not be resolved by
    /// reinforcing the existing pattern
    #[error("Store conflict: {0}")]
    Conflict(String),

    #[error("Invalid pattern: {0}")]
    Invalid(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<PatternError> for taxlens_core::Error {
    fn from(err: PatternError) -> Self {
        match err {
            PatternError::Conflict(msg) => taxlens_core::Error::PatternStoreConflict(msg),
            PatternError::NotFound(msg) => taxlens_core::Error::NotFound(msg),
            other => taxlens_core::Error::PatternStore(other.to_string()),
        }
    }
}
