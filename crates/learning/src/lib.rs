//! Feedback learning
//!
//! Turns analyst reviews into durable knowledge:
//! - Confirmations and corrections feed the accuracy counters of every
//!   pattern that was applied to the reviewed transaction
//! - Corrections with a usable explanation are classified into one of four
//!   rule kinds and stored as unvalidated learned patterns
//! - Vendor aggregates are reinforced with each reviewed outcome
//! - On analyst opt-in, a freshly learned pattern is propagated to similar
//!   unreviewed transactions, with a before/after audit record per update
//!
//! A review that changes the determination without an explanation is
//! rejected outright; the explanation is the raw material everything else
//! here is extracted from.

pub mod classify;
pub mod learner;
pub mod propagate;

pub use classify::{adjustment_for_confidence, classify_correction, Extraction};
pub use learner::{CorrectionOutcome, CorrectionState, FeedbackLearner, LearnerConfig};
pub use propagate::{similarity, PropagationRecord};
