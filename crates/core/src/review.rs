//! Analyst review of an analysis result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::determination::Determination;
use crate::error::Error;

/// A human correction (or confirmation) of one analysis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    /// The analysis result this review refers to (exactly one)
    pub analysis_id: Uuid,
    /// AI determination at review time, recorded for audit
    pub ai_determination: Determination,
    pub human_determination: Determination,
    /// Corrected refund basis, when the analyst supplied one
    pub refund_basis: Option<String>,
    /// Required whenever the human call differs from the AI call
    pub explanation: String,
    pub reviewer_id: String,
    pub reviewed_at: DateTime<Utc>,
}

impl Review {
    /// Whether the analyst disagreed with the system
    pub fn is_correction(&self) -> bool {
        self.human_determination != self.ai_determination
    }

    /// Enforce the explanation-required invariant.
    ///
    /// A disagreement with an empty explanation is rejected, never silently
    /// accepted: the explanation is what pattern extraction learns from.
    pub fn validate(&self) -> Result<(), Error> {
        if self.is_correction() && self.explanation.trim().is_empty() {
            return Err(Error::InvalidReview(format!(
                "review {} changes determination from {} to {} without an explanation",
                self.id, self.ai_determination, self.human_determination
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(ai: Determination, human: Determination, explanation: &str) -> Review {
        Review {
            id: Uuid::new_v4(),
            analysis_id: Uuid::new_v4(),
            ai_determination: ai,
            human_determination: human,
            refund_basis: None,
            explanation: explanation.to_string(),
            reviewer_id: "analyst-1".into(),
            reviewed_at: Utc::now(),
        }
    }

    #[test]
    fn disagreement_without_explanation_is_rejected() {
        let r = review(Determination::TaxedCorrectly, Determination::Exempt, "  ");
        assert!(matches!(r.validate(), Err(Error::InvalidReview(_))));
    }

    #[test]
    fn agreement_without_explanation_is_fine() {
        let r = review(Determination::Exempt, Determination::Exempt, "");
        assert!(r.validate().is_ok());
    }

    #[test]
    fn disagreement_with_explanation_is_accepted() {
        let r = review(
            Determination::TaxedCorrectly,
            Determination::Exempt,
            "Acme is always exempt under the manufacturing exemption",
        );
        assert!(r.validate().is_ok());
        assert!(r.is_correction());
    }
}
