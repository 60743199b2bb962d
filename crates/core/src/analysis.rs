//! Analysis result, routing, and output-row types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anomaly::Anomaly;
use crate::determination::Determination;

/// Review queue a transaction can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewQueue {
    /// Fastest SLA: high-value low-confidence, failures, override conflicts
    Critical,
    /// High-value mid-confidence
    High,
    /// Everything else below the auto-approve bar
    Standard,
}

/// Where a calibrated transaction goes next
///
/// Total over (confidence, tax amount): every transaction lands in exactly
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RoutingDecision {
    AutoApprove {
        /// True when this result was pulled into the random QA audit sample
        /// and therefore also lands in the standard queue.
        audit_sample: bool,
    },
    Review {
        queue: ReviewQueue,
        /// Small-dollar transactions sink within the standard queue
        deprioritized: bool,
    },
}

impl RoutingDecision {
    /// The queue this decision feeds, if any
    pub fn queue(&self) -> Option<ReviewQueue> {
        match self {
            RoutingDecision::AutoApprove { audit_sample: true } => Some(ReviewQueue::Standard),
            RoutingDecision::AutoApprove { audit_sample: false } => None,
            RoutingDecision::Review { queue, .. } => Some(*queue),
        }
    }

    pub fn is_auto_approved(&self) -> bool {
        matches!(self, RoutingDecision::AutoApprove { .. })
    }
}

/// Lifecycle status of an analysis result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    AutoApproved,
    PendingReview,
    Reviewed,
}

/// Why a result was produced in degraded form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationFlag {
    /// Both retrieval paths failed; determination rests on patterns alone
    InsufficientContext,
    /// Inference collaborator failed after retries
    InferenceUnavailable,
    /// Multiple learned patterns forced conflicting determinations
    ConflictingOverrides,
}

/// One transaction's determination
///
/// A transaction that cannot be confidently processed is never dropped: it
/// still gets a result, carrying a degradation flag and a critical-queue
/// routing so an analyst can intervene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub transaction_id: String,
    pub determination: Determination,
    /// Natural-language rationale from the inference service
    pub rationale: String,
    /// Legal citations supporting the determination
    pub citations: Vec<String>,
    /// Refund basis label, when one applies
    pub refund_basis: Option<String>,
    /// Estimated refund, in cents
    pub estimated_refund_cents: i64,
    /// Confidence before anomaly penalties and pattern adjustments (0-100)
    pub base_confidence: u32,
    /// Calibrated confidence (0-100)
    pub final_confidence: u32,
    pub anomalies: Vec<Anomaly>,
    /// Learned patterns whose adjustments were applied
    pub applied_pattern_ids: Vec<Uuid>,
    pub routing: RoutingDecision,
    pub status: AnalysisStatus,
    pub degradation: Option<DegradationFlag>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Output row for the spreadsheet sink
    pub fn output_row(&self) -> OutputRow {
        OutputRow {
            determination: self.determination,
            category: None,
            refund_basis: self.refund_basis.clone(),
            estimated_refund_cents: self.estimated_refund_cents,
            citations: self.citations.clone(),
            final_confidence: self.final_confidence,
        }
    }
}

/// Payload written back into caller-defined spreadsheet columns
///
/// Exactly one row is produced per input transaction, degraded or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRow {
    pub determination: Determination,
    pub category: Option<String>,
    pub refund_basis: Option<String>,
    pub estimated_refund_cents: i64,
    pub citations: Vec<String>,
    pub final_confidence: u32,
}

/// Entry pushed to a review queue for the downstream UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTransaction {
    pub transaction_id: String,
    pub analysis_id: Uuid,
    pub final_confidence: u32,
    pub tax_amount_cents: i64,
    pub deprioritized: bool,
    pub audit_sample: bool,
    pub degradation: Option<DegradationFlag>,
    pub queued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_sample_feeds_standard_queue() {
        let d = RoutingDecision::AutoApprove { audit_sample: true };
        assert!(d.is_auto_approved());
        assert_eq!(d.queue(), Some(ReviewQueue::Standard));

        let d = RoutingDecision::AutoApprove { audit_sample: false };
        assert_eq!(d.queue(), None);
    }
}
