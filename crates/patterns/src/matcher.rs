//! Pattern matcher
//!
//! Looks a transaction up against the pattern store and returns the
//! applicable matches with confidence adjustments. Pure: application
//! counters are committed separately, after calibration, by the caller.

use std::collections::BTreeSet;
use std::sync::Arc;

use taxlens_config::constants::learning;
use taxlens_core::{normalize_vendor, TaxType};

use crate::store::PatternStore;
use crate::types::{MatchSource, PatternMatch};
use crate::PatternError;

/// Attributes the matcher consults
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub vendor_name: String,
    pub tax_type: TaxType,
    pub category: Option<String>,
    pub description_keywords: Vec<String>,
    /// Codes of anomalies already detected, for anomaly-response triggers
    pub anomaly_codes: Vec<String>,
}

/// Matcher over the pattern store
pub struct PatternMatcher {
    store: Arc<dyn PatternStore>,
}

impl PatternMatcher {
    pub fn new(store: Arc<dyn PatternStore>) -> Self {
        Self { store }
    }

    /// Find the patterns applicable to a transaction
    ///
    /// Vendor lookup is exact-match over the normalized key; when no vendor
    /// pattern exists the refund-basis statistics are consulted by keyword
    /// and category overlap. Active, validated learned patterns are checked
    /// in both cases. Every returned match shares the input's tax type.
    pub async fn find_matches(&self, input: &MatchInput) -> Result<Vec<PatternMatch>, PatternError> {
        let vendor = normalize_vendor(&input.vendor_name);
        let mut matches = Vec::new();

        let vendor_pattern = self
            .store
            .get_vendor_pattern(&vendor, input.tax_type)
            .await?;

        if let Some(ref pattern) = vendor_pattern {
            matches.push(PatternMatch {
                source: MatchSource::Vendor,
                pattern_key: format!("vendor:{}:{}", pattern.vendor, pattern.tax_type),
                learned_id: None,
                tax_type: pattern.tax_type,
                confidence_adjustment: pattern.confidence_adjustment(),
                forced_determination: None,
                suggested_basis: pattern.typical_refund_basis.clone(),
                justification: format!(
                    "vendor '{}' has {} prior {} tax samples with {:.0}% refund approval",
                    pattern.vendor,
                    pattern.sample_count,
                    pattern.tax_type,
                    pattern.success_rate * 100.0
                ),
            });
        } else {
            // No vendor history: fall back to refund-basis statistics keyed
            // by keyword/category overlap
            matches.extend(self.basis_fallback(input, &vendor).await?);
        }

        matches.extend(self.learned_matches(input, &vendor).await?);

        Ok(matches)
    }

    async fn basis_fallback(
        &self,
        input: &MatchInput,
        vendor: &str,
    ) -> Result<Vec<PatternMatch>, PatternError> {
        let mut transaction_tokens: BTreeSet<String> = input
            .description_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        if let Some(ref category) = input.category {
            transaction_tokens.extend(category.to_lowercase().split_whitespace().map(String::from));
        }

        let mut scored: Vec<(usize, PatternMatch)> = Vec::new();

        for basis in self.store.list_basis_patterns(input.tax_type).await? {
            let overlap = basis
                .keywords
                .iter()
                .filter(|k| transaction_tokens.contains(*k))
                .count()
                + usize::from(basis.vendors.contains(vendor));

            if overlap < learning::BASIS_MIN_OVERLAP {
                continue;
            }

            let adjustment = if overlap >= 3 { 8 } else { 5 };
            scored.push((
                overlap,
                PatternMatch {
                    source: MatchSource::RefundBasis,
                    pattern_key: format!("basis:{}:{}", basis.basis, basis.tax_type),
                    learned_id: None,
                    tax_type: basis.tax_type,
                    confidence_adjustment: adjustment,
                    forced_determination: None,
                    suggested_basis: Some(basis.basis.clone()),
                    justification: format!(
                        "refund basis '{}' covers {:.1}% of {} tax refunds and overlaps {} transaction terms",
                        basis.basis,
                        basis.usage_fraction * 100.0,
                        basis.tax_type,
                        overlap
                    ),
                },
            ));
        }

        // Strongest overlap first
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }

    async fn learned_matches(
        &self,
        input: &MatchInput,
        vendor: &str,
    ) -> Result<Vec<PatternMatch>, PatternError> {
        let mut matches = Vec::new();

        for pattern in self.store.list_applicable(input.tax_type).await? {
            if !pattern.trigger.matches(
                input.tax_type,
                vendor,
                input.category.as_deref(),
                &input.description_keywords,
                &input.anomaly_codes,
            ) {
                continue;
            }

            let accuracy_note = pattern
                .accuracy()
                .map(|a| format!(", live accuracy {:.0}%", a * 100.0))
                .unwrap_or_default();

            matches.push(PatternMatch {
                source: MatchSource::Learned,
                pattern_key: format!("learned:{}", pattern.id),
                learned_id: Some(pattern.id),
                tax_type: pattern.trigger.tax_type,
                confidence_adjustment: pattern.confidence_adjustment,
                forced_determination: pattern.forced_determination,
                suggested_basis: pattern.refund_basis.clone(),
                justification: format!(
                    "learned {:?} rule from {} correction(s){}",
                    pattern.pattern_type, pattern.learned_from_count, accuracy_note
                ),
            });
        }

        Ok(matches)
    }
}
