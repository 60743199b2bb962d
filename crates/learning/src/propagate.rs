//! Similar-case similarity scoring
//!
//! Weighted criteria, summed raw (not normalized): a vendor match alone
//! clears the propagation threshold, any single weaker criterion does not.

use taxlens_config::constants::learning;
use taxlens_core::Transaction;
use taxlens_patterns::extract_keywords;
use uuid::Uuid;

/// Audit record for one propagated update
#[derive(Debug, Clone)]
pub struct PropagationRecord {
    pub transaction_id: String,
    pub analysis_id: Uuid,
    pub similarity: f64,
    pub confidence_before: u32,
    pub confidence_after: u32,
    pub determination_before: taxlens_core::Determination,
    pub determination_after: taxlens_core::Determination,
}

/// Weighted similarity between two transactions
pub fn similarity(source: &Transaction, candidate: &Transaction) -> f64 {
    let mut score = 0.0;

    let source_vendor = source.normalized_vendor();
    if !source_vendor.is_empty() && source_vendor == candidate.normalized_vendor() {
        score += learning::WEIGHT_VENDOR;
    }

    match (&source.category, &candidate.category) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => score += learning::WEIGHT_CATEGORY,
        _ => {}
    }

    let source_keywords = extract_keywords(&source.description);
    let shared = extract_keywords(&candidate.description)
        .iter()
        .filter(|k| source_keywords.contains(k))
        .count();
    if shared >= learning::BASIS_MIN_OVERLAP {
        score += learning::WEIGHT_KEYWORDS;
    }

    if source.tax_type == candidate.tax_type {
        score += learning::WEIGHT_TAX_TYPE;
    }

    if amount_bucket(source.tax_amount_cents) == amount_bucket(candidate.tax_amount_cents) {
        score += learning::WEIGHT_AMOUNT_BUCKET;
    }

    score
}

/// Coarse tax-amount bucket aligned with the routing thresholds
fn amount_bucket(cents: i64) -> u8 {
    use taxlens_config::constants::routing;
    if cents < routing::SMALL_DOLLAR_CENTS {
        0
    } else if cents < routing::HIGH_AMOUNT_CENTS {
        1
    } else if cents < routing::CRITICAL_AMOUNT_CENTS {
        2
    } else {
        3
    }
}
