//! Confidence calibration
//!
//! Takes the inference service's base determination and confidence and
//! folds in what the model could not see: anomaly penalties and historical
//! pattern adjustments. Forced overrides from learned patterns replace the
//! base determination; two or more distinct forced determinations are a
//! conflict that no heuristic resolves, so the result becomes needs-review.

use std::collections::BTreeSet;

use taxlens_core::{Anomaly, Determination};
use taxlens_patterns::PatternMatch;

/// Calibrated determination and confidence
#[derive(Debug, Clone)]
pub struct Calibration {
    pub determination: Determination,
    /// Final confidence, clamped to 0-100
    pub final_confidence: u32,
    /// The single forced override that was applied, if any
    pub forced_override: Option<Determination>,
    /// Two or more learned patterns forced distinct determinations
    pub conflicting_overrides: bool,
}

/// Calibrate one transaction's determination
///
/// Arithmetic is signed throughout and clamped once at the end, so a heap
/// of penalties can never wrap below zero.
pub fn calibrate(
    base_determination: Determination,
    base_confidence: u32,
    anomalies: &[Anomaly],
    matches: &[PatternMatch],
) -> Calibration {
    let mut confidence = base_confidence.min(100) as i64;

    for anomaly in anomalies {
        confidence -= anomaly.severity.penalty() as i64;
    }
    for pattern_match in matches {
        confidence += pattern_match.confidence_adjustment as i64;
    }

    let forced: BTreeSet<Determination> = matches
        .iter()
        .filter_map(|m| m.forced_determination)
        .collect();

    let (determination, forced_override, conflicting) = match forced.len() {
        0 => (base_determination, None, false),
        1 => {
            let only = *forced.iter().next().unwrap_or(&base_determination);
            (only, Some(only), false)
        }
        _ => (Determination::NeedsReview, None, true),
    };

    Calibration {
        determination,
        final_confidence: confidence.clamp(0, 100) as u32,
        forced_override,
        conflicting_overrides: conflicting,
    }
}
