//! Refund determination types

use serde::{Deserialize, Serialize};

/// Final call on whether tax was over-paid for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Determination {
    /// Purchase was exempt; full refund of tax paid
    Exempt,
    /// Item/service is non-taxable in this jurisdiction
    NonTaxable,
    /// Tax applied but at the wrong rate or base; partial refund
    TaxOverpaid,
    /// Tax was correctly assessed; no refund
    TaxedCorrectly,
    /// System could not decide; analyst must review
    NeedsReview,
}

impl Determination {
    /// Whether this determination supports a refund claim
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            Determination::Exempt | Determination::NonTaxable | Determination::TaxOverpaid
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Determination::Exempt => "exempt",
            Determination::NonTaxable => "non_taxable",
            Determination::TaxOverpaid => "tax_overpaid",
            Determination::TaxedCorrectly => "taxed_correctly",
            Determination::NeedsReview => "needs_review",
        }
    }
}

impl std::fmt::Display for Determination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
