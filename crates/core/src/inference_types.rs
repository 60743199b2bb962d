//! Inference collaborator contract types
//!
//! The inference service is an opaque, possibly-slow, possibly-failing
//! black box. Only the shape of what is sent and what comes back is part of
//! the contract; prompt text is the inference crate's concern.

use serde::{Deserialize, Serialize};

use crate::determination::Determination;
use crate::transaction::TaxType;

/// A retrieved chunk as handed to the inference service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub chunk_id: String,
    pub text: String,
    pub citation: Option<String>,
    /// Fused retrieval score, for context ordering
    pub score: f32,
}

/// What the engine sends to the inference service per transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterminationRequest {
    /// Flattened transaction text (vendor, description, amounts)
    pub transaction_text: String,
    pub tax_type: TaxType,
    /// Retrieval context, best-first; may be empty (low-confidence case)
    pub context: Vec<RetrievedContext>,
}

/// What the inference service returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterminationResponse {
    pub determination: Determination,
    pub rationale: String,
    /// Citations the model grounded its answer on
    #[serde(default)]
    pub citations: Vec<String>,
    /// Refund basis label, when the model named one
    #[serde(default)]
    pub refund_basis: Option<String>,
    /// Estimated refund in cents; 0 when not refundable
    #[serde(default)]
    pub estimated_refund_cents: i64,
    /// Base confidence 0-100 before calibration
    pub base_confidence: u32,
}

impl DeterminationResponse {
    /// The degraded response used when the inference collaborator fails:
    /// needs-review at confidence zero, routed to the critical queue by the
    /// calibrator. Never a crash, never a skipped row.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            determination: Determination::NeedsReview,
            rationale: format!("inference unavailable: {reason}"),
            citations: Vec::new(),
            refund_basis: None,
            estimated_refund_cents: 0,
            base_confidence: 0,
        }
    }
}
