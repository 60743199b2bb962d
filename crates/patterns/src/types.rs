//! Pattern types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use taxlens_core::{Determination, TaxType};

/// Aggregated historical behavior for one (vendor, tax type) pair
///
/// Unique per (normalized vendor, tax type). Built in bulk from historical
/// record extraction and incrementally reinforced by the feedback learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPattern {
    /// Case-normalized vendor key
    pub vendor: String,
    pub tax_type: TaxType,
    /// Samples behind this aggregate; at least 1
    pub sample_count: u64,
    /// Fraction of samples that resulted in an approved refund, in [0, 1]
    pub success_rate: f64,
    /// Most common refund basis for this vendor
    pub typical_refund_basis: Option<String>,
    /// Tax categories commonly seen for this vendor
    pub common_categories: BTreeSet<String>,
    /// Description keywords commonly seen for this vendor
    pub common_keywords: BTreeSet<String>,
    pub product_type: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl VendorPattern {
    /// Confidence adjustment implied by this vendor's history
    ///
    /// Thin samples stay neutral; a strong approval history boosts, a weak
    /// one penalizes.
    pub fn confidence_adjustment(&self) -> i32 {
        if self.sample_count < 3 {
            return 0;
        }
        if self.success_rate >= 0.8 && self.sample_count >= 5 {
            15
        } else if self.success_rate >= 0.6 {
            10
        } else if self.success_rate >= 0.4 {
            0
        } else {
            -10
        }
    }
}

/// Aggregated statistics for one (refund basis, tax type) pair
///
/// Unique per (basis label, tax type). Basis usage differs between sales
/// and use tax by more than 20x for some bases, hence the partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundBasisPattern {
    /// Refund basis label, e.g. "multi-point-use allocation"
    pub basis: String,
    pub tax_type: TaxType,
    /// Refunds observed citing this basis; at least 1
    pub usage_count: u64,
    /// Share of all refunds of this tax type citing this basis, in [0, 1]
    pub usage_fraction: f64,
    /// All vendors observed using this basis
    pub vendors: BTreeSet<String>,
    /// Keywords associated with this basis
    pub keywords: BTreeSet<String>,
    pub typical_determination: Option<Determination>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of rule a learned pattern encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    VendorSpecific,
    CategoryRule,
    KeywordTrigger,
    AnomalyResponse,
}

/// Structured predicate over transaction attributes
///
/// A trigger matches when every populated field is satisfied; unset fields
/// are wildcards. Tax type is always set: cross-tax-type application is
/// forbidden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub tax_type: TaxType,
    /// Normalized vendor, exact match
    pub vendor: Option<String>,
    /// Case-insensitive category equality
    pub category: Option<String>,
    /// Every listed keyword must be present in the transaction's set
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Anomaly code that must be present (anomaly-response patterns)
    pub anomaly_code: Option<String>,
}

impl TriggerCondition {
    /// Evaluate this trigger against transaction attributes
    pub fn matches(
        &self,
        tax_type: TaxType,
        vendor: &str,
        category: Option<&str>,
        keywords: &[String],
        anomaly_codes: &[String],
    ) -> bool {
        if self.tax_type != tax_type {
            return false;
        }
        if let Some(ref v) = self.vendor {
            if v != vendor {
                return false;
            }
        }
        if let Some(ref c) = self.category {
            match category {
                Some(tc) if tc.eq_ignore_ascii_case(c) => {}
                _ => return false,
            }
        }
        if !self.keywords.is_empty()
            && !self.keywords.iter().all(|k| keywords.iter().any(|w| w == k))
        {
            return false;
        }
        if let Some(ref code) = self.anomaly_code {
            if !anomaly_codes.iter().any(|a| a == code) {
                return false;
            }
        }
        true
    }
}

/// A rule derived from analyst corrections
///
/// Created unvalidated; validation (manual or accumulated accuracy) is
/// required before the matcher will apply it. Deactivation retires a
/// pattern from matching but never deletes it: the event log keeps the
/// full history for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: Uuid,
    pub pattern_type: PatternType,
    pub trigger: TriggerCondition,
    /// Signed confidence adjustment in [-100, 100]
    pub confidence_adjustment: i32,
    /// When set, replaces the base determination outright
    pub forced_determination: Option<Determination>,
    /// Refund basis this rule asserts, if any
    pub refund_basis: Option<String>,
    /// Review ids this pattern was learned from
    pub source_review_ids: Vec<Uuid>,
    /// Corrections that produced or reinforced this pattern
    pub learned_from_count: u64,
    pub times_applied: u64,
    pub times_confirmed: u64,
    pub active: bool,
    /// New patterns require validation before affecting routing
    pub validated: bool,
    pub created_at: DateTime<Utc>,
}

impl LearnedPattern {
    /// Live accuracy; undefined (None), not zero, until applied at least once
    pub fn accuracy(&self) -> Option<f64> {
        (self.times_applied > 0).then(|| self.times_confirmed as f64 / self.times_applied as f64)
    }

    /// Whether the matcher may apply this pattern
    pub fn applicable(&self) -> bool {
        self.active && self.validated
    }
}

/// Which pattern kind produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Vendor,
    RefundBasis,
    Learned,
}

/// One applicable pattern for a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub source: MatchSource,
    /// Stable identifier of the source pattern (vendor key, basis label,
    /// or learned-pattern uuid)
    pub pattern_key: String,
    /// Set for learned patterns; used for application-counter commits
    pub learned_id: Option<Uuid>,
    /// Tax type of the source pattern; always equals the input tax type
    pub tax_type: TaxType,
    pub confidence_adjustment: i32,
    pub forced_determination: Option<Determination>,
    /// Refund basis suggested by the pattern
    pub suggested_basis: Option<String>,
    /// Audit/explainability sentence
    pub justification: String,
}
