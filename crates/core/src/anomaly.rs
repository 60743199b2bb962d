//! Anomaly types
//!
//! An anomaly is a rule-based red flag (e.g. a suspicious round-number tax
//! amount) that reduces confidence independently of the base model. The
//! detector lives in the analyzer crate; only the types are shared.

use serde::{Deserialize, Serialize};

/// Anomaly severity, ordered most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl AnomalySeverity {
    /// Confidence penalty applied per anomaly of this severity
    ///
    /// Penalties are additive across all anomalies on a transaction.
    pub fn penalty(&self) -> u32 {
        match self {
            AnomalySeverity::Critical => 30,
            AnomalySeverity::High => 15,
            AnomalySeverity::Medium => 8,
            AnomalySeverity::Low => 3,
        }
    }
}

/// A detected red flag on a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Stable machine-readable code, e.g. "round-amount"
    pub code: String,
    pub severity: AnomalySeverity,
    /// Human-readable detail for the review UI
    pub detail: String,
}

impl Anomaly {
    pub fn new(code: impl Into<String>, severity: AnomalySeverity, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity,
            detail: detail.into(),
        }
    }
}
