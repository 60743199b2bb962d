//! Correction classification
//!
//! A closed classifier: a correction either maps onto one of the four
//! learned-pattern kinds or produces nothing. Free-form rule synthesis is
//! deliberately out; every learnable shape is enumerated here.

use taxlens_config::constants::learning;
use taxlens_core::{Anomaly, Review, Transaction};
use taxlens_patterns::{extract_keywords, PatternType, TriggerCondition};

/// A classified correction, ready to become a learned pattern
#[derive(Debug, Clone)]
pub struct Extraction {
    pub pattern_type: PatternType,
    pub trigger: TriggerCondition,
}

/// Adjustment magnitude by the AI confidence the correction overturned
///
/// Overturning a confident call teaches more than overturning a guess, but
/// the pattern born from it gets the smaller adjustment: the band rewards
/// corrections of low-confidence output, where the model most needs help.
pub fn adjustment_for_confidence(ai_confidence: u32) -> i32 {
    if ai_confidence < learning::LOW_CONFIDENCE_BAND {
        learning::ADJUSTMENT_LOW_BAND
    } else if ai_confidence <= learning::MID_CONFIDENCE_BAND {
        learning::ADJUSTMENT_MID_BAND
    } else {
        learning::ADJUSTMENT_HIGH_BAND
    }
}

/// Classify a correction into a pattern kind, most specific first
///
/// Precedence: vendor rule (the vendor named, or an "always"/"never"
/// absolute that can only be about this vendor), then a named anomaly, then
/// the transaction's category, then shared description keywords. A
/// correction matching none of these is recorded but learns nothing.
pub fn classify_correction(
    review: &Review,
    transaction: &Transaction,
    anomalies: &[Anomaly],
) -> Option<Extraction> {
    let explanation = review.explanation.to_lowercase();
    if explanation.trim().is_empty() {
        return None;
    }

    let vendor = transaction.normalized_vendor();
    let blank_trigger = TriggerCondition {
        tax_type: transaction.tax_type,
        vendor: None,
        category: None,
        keywords: vec![],
        anomaly_code: None,
    };

    let absolute_rule = explanation.contains("always") || explanation.contains("never");
    if !vendor.is_empty() && (explanation.contains(&vendor) || absolute_rule) {
        return Some(Extraction {
            pattern_type: PatternType::VendorSpecific,
            trigger: TriggerCondition {
                vendor: Some(vendor),
                ..blank_trigger
            },
        });
    }

    for anomaly in anomalies {
        let named = explanation.contains(&anomaly.code)
            || anomaly.code.split('-').all(|word| explanation.contains(word));
        if named {
            return Some(Extraction {
                pattern_type: PatternType::AnomalyResponse,
                trigger: TriggerCondition {
                    anomaly_code: Some(anomaly.code.clone()),
                    ..blank_trigger
                },
            });
        }
    }

    if let Some(ref category) = transaction.category {
        if explanation.contains(&category.to_lowercase()) {
            return Some(Extraction {
                pattern_type: PatternType::CategoryRule,
                trigger: TriggerCondition {
                    category: Some(category.clone()),
                    ..blank_trigger
                },
            });
        }
    }

    let description_keywords = extract_keywords(&transaction.description);
    let shared: Vec<String> = extract_keywords(&review.explanation)
        .into_iter()
        .filter(|k| description_keywords.contains(k))
        .collect();
    if shared.len() >= learning::BASIS_MIN_OVERLAP {
        return Some(Extraction {
            pattern_type: PatternType::KeywordTrigger,
            trigger: TriggerCondition {
                keywords: shared,
                ..blank_trigger
            },
        });
    }

    None
}
