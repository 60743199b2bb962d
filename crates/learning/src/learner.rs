//! Feedback learner
//!
//! Every review moves through an explicit state trail so the handling of a
//! correction is auditable end to end: received, extraction attempted,
//! pattern created (or nothing found), propagation attempted, recorded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use taxlens_core::{AnalysisStore, Error, Result, Review, Transaction};
use taxlens_patterns::{
    extract_keywords, ConfirmationOutcome, LearnedPattern, PatternStore,
};

use crate::classify::{adjustment_for_confidence, classify_correction};
use crate::propagate::{similarity, PropagationRecord};

/// Learner configuration
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Global enable for similar-case propagation; individual reviews still
    /// opt in per call
    pub propagation_enabled: bool,
    pub propagation_threshold: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            propagation_enabled: false,
            propagation_threshold: taxlens_config::constants::learning::PROPAGATION_THRESHOLD,
        }
    }
}

impl From<&taxlens_config::LearningSettings> for LearnerConfig {
    fn from(settings: &taxlens_config::LearningSettings) -> Self {
        Self {
            propagation_enabled: settings.propagation_enabled,
            propagation_threshold: settings.propagation_threshold,
        }
    }
}

/// Stations a review passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionState {
    Received,
    PatternExtractionAttempted,
    PatternCreated { pattern_id: Uuid },
    NoPatternFound,
    PropagationAttempted { updated: usize },
    Recorded,
}

/// Everything one review caused
#[derive(Debug)]
pub struct CorrectionOutcome {
    pub review_id: Uuid,
    /// Pattern created (or reinforced) by this correction
    pub pattern_id: Option<Uuid>,
    /// Accuracy counter updates for patterns applied to the reviewed result
    pub confirmations: Vec<(Uuid, ConfirmationOutcome)>,
    pub propagated: Vec<PropagationRecord>,
    /// State trail, in order
    pub states: Vec<CorrectionState>,
}

/// Turns validated reviews into pattern-store updates
pub struct FeedbackLearner {
    pattern_store: Arc<dyn PatternStore>,
    analysis_store: Arc<dyn AnalysisStore>,
    config: LearnerConfig,
}

impl FeedbackLearner {
    pub fn new(
        pattern_store: Arc<dyn PatternStore>,
        analysis_store: Arc<dyn AnalysisStore>,
        config: LearnerConfig,
    ) -> Self {
        Self {
            pattern_store,
            analysis_store,
            config,
        }
    }

    /// Process one review against its transaction
    ///
    /// `propagation_candidates` are the batch's other transactions;
    /// `propagate_to_similar` is the analyst's per-review opt-in. Rejects
    /// the review (and records nothing) when it changes the determination
    /// without an explanation.
    pub async fn submit_review(
        &self,
        review: &Review,
        transaction: &Transaction,
        propagation_candidates: &[Transaction],
        propagate_to_similar: bool,
    ) -> Result<CorrectionOutcome> {
        review.validate()?;

        let result = self
            .analysis_store
            .get_result(review.analysis_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("analysis {}", review.analysis_id)))?;

        let mut states = vec![CorrectionState::Received];

        self.analysis_store.save_review(review).await?;

        // Every pattern applied to this result gets its accuracy counter
        // updated; the store handles retirement and auto-validation
        let correct = !review.is_correction();
        let mut confirmations = Vec::with_capacity(result.applied_pattern_ids.len());
        for id in &result.applied_pattern_ids {
            let outcome = self.pattern_store.record_confirmation(*id, correct).await?;
            confirmations.push((*id, outcome));
        }

        let vendor = transaction.normalized_vendor();
        if !vendor.is_empty() {
            let basis = review
                .refund_basis
                .as_deref()
                .or(result.refund_basis.as_deref());
            self.pattern_store
                .reinforce_vendor_pattern(
                    &vendor,
                    transaction.tax_type,
                    review.human_determination.is_refundable(),
                    basis,
                    transaction.category.as_deref(),
                    &extract_keywords(&transaction.description),
                )
                .await?;
        }

        let mut pattern_id = None;
        let mut propagated = Vec::new();

        if review.is_correction() {
            states.push(CorrectionState::PatternExtractionAttempted);

            match classify_correction(review, transaction, &result.anomalies) {
                Some(extraction) => {
                    let pattern = LearnedPattern {
                        id: Uuid::new_v4(),
                        pattern_type: extraction.pattern_type,
                        trigger: extraction.trigger,
                        // Band keyed on what the model believed before
                        // anomalies and patterns weighed in
                        confidence_adjustment: adjustment_for_confidence(
                            result.base_confidence,
                        ),
                        forced_determination: Some(review.human_determination),
                        refund_basis: review.refund_basis.clone(),
                        source_review_ids: vec![review.id],
                        learned_from_count: 1,
                        times_applied: 0,
                        times_confirmed: 0,
                        active: true,
                        validated: false,
                        created_at: Utc::now(),
                    };
                    let id = self.pattern_store.create_learned_pattern(pattern).await?;
                    states.push(CorrectionState::PatternCreated { pattern_id: id });
                    pattern_id = Some(id);

                    if self.config.propagation_enabled && propagate_to_similar {
                        let stored = self
                            .pattern_store
                            .get_learned_pattern(id)
                            .await?
                            .ok_or_else(|| Error::NotFound(format!("learned pattern {id}")))?;
                        propagated = self
                            .propagate(&stored, transaction, propagation_candidates)
                            .await?;
                        states.push(CorrectionState::PropagationAttempted {
                            updated: propagated.len(),
                        });
                    }
                }
                None => {
                    tracing::info!(
                        review_id = %review.id,
                        "correction explanation matched no learnable shape"
                    );
                    states.push(CorrectionState::NoPatternFound);
                }
            }
        }

        states.push(CorrectionState::Recorded);

        tracing::info!(
            review_id = %review.id,
            correction = review.is_correction(),
            pattern_id = ?pattern_id,
            propagated = propagated.len(),
            "review processed"
        );

        Ok(CorrectionOutcome {
            review_id: review.id,
            pattern_id,
            confirmations,
            propagated,
            states,
        })
    }

    /// Apply a fresh pattern to similar unreviewed results
    ///
    /// Reviewed transactions are never touched, and routing is left alone:
    /// an unvalidated pattern adjusts confidence and determination
    /// provisionally but does not move queues or auto-approve.
    async fn propagate(
        &self,
        pattern: &LearnedPattern,
        source: &Transaction,
        candidates: &[Transaction],
    ) -> Result<Vec<PropagationRecord>> {
        let unreviewed = self.analysis_store.list_unreviewed().await?;
        let by_transaction: HashMap<&str, &taxlens_core::AnalysisResult> = unreviewed
            .iter()
            .map(|r| (r.transaction_id.as_str(), r))
            .collect();

        let mut records = Vec::new();

        for candidate in candidates {
            if candidate.id == source.id {
                continue;
            }
            if candidate.tax_type != pattern.trigger.tax_type {
                continue;
            }

            let score = similarity(source, candidate);
            if score <= self.config.propagation_threshold {
                continue;
            }

            let keywords = extract_keywords(&candidate.description);
            if !pattern.trigger.matches(
                candidate.tax_type,
                &candidate.normalized_vendor(),
                candidate.category.as_deref(),
                &keywords,
                &[],
            ) {
                continue;
            }

            let Some(result) = by_transaction.get(candidate.id.as_str()) else {
                continue;
            };
            if result.applied_pattern_ids.contains(&pattern.id) {
                continue;
            }

            let mut updated = (*result).clone();
            let record = PropagationRecord {
                transaction_id: candidate.id.clone(),
                analysis_id: updated.id,
                similarity: score,
                confidence_before: updated.final_confidence,
                confidence_after: 0,
                determination_before: updated.determination,
                determination_after: updated.determination,
            };

            updated.final_confidence = (updated.final_confidence as i64
                + pattern.confidence_adjustment as i64)
                .clamp(0, 100) as u32;
            if let Some(forced) = pattern.forced_determination {
                updated.determination = forced;
            }
            if updated.refund_basis.is_none() {
                updated.refund_basis = pattern.refund_basis.clone();
            }
            updated.applied_pattern_ids.push(pattern.id);

            let record = PropagationRecord {
                confidence_after: updated.final_confidence,
                determination_after: updated.determination,
                ..record
            };

            self.analysis_store.update_result(&updated).await?;
            self.pattern_store.record_applications(&[pattern.id]).await?;

            tracing::info!(
                transaction_id = %record.transaction_id,
                pattern_id = %pattern.id,
                similarity = record.similarity,
                confidence_before = record.confidence_before,
                confidence_after = record.confidence_after,
                "pattern propagated to similar transaction"
            );
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use taxlens_analyzer::InMemoryAnalysisStore;
    use taxlens_core::{
        AnalysisResult, AnalysisStatus, Determination, ReviewQueue, RoutingDecision, TaxType,
    };
    use taxlens_patterns::{InMemoryPatternStore, PatternEvent, PatternType};

    fn txn(id: &str, vendor: &str, description: &str, tax_type: TaxType) -> Transaction {
        Transaction {
            id: id.into(),
            vendor_name: vendor.into(),
            description: description.into(),
            tax_type,
            tax_amount_cents: 50_000,
            invoice_total_cents: 700_000,
            category: Some("Software".into()),
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 14),
        }
    }

    fn result(
        transaction_id: &str,
        confidence: u32,
        determination: Determination,
        applied: Vec<Uuid>,
    ) -> AnalysisResult {
        AnalysisResult {
            id: Uuid::new_v4(),
            transaction_id: transaction_id.into(),
            determination,
            rationale: "rationale".into(),
            citations: vec![],
            refund_basis: None,
            estimated_refund_cents: 0,
            base_confidence: confidence,
            final_confidence: confidence,
            anomalies: vec![],
            applied_pattern_ids: applied,
            routing: RoutingDecision::Review {
                queue: ReviewQueue::Standard,
                deprioritized: false,
            },
            status: AnalysisStatus::PendingReview,
            degradation: None,
            created_at: Utc::now(),
        }
    }

    fn review(
        analysis_id: Uuid,
        ai: Determination,
        human: Determination,
        explanation: &str,
    ) -> Review {
        Review {
            id: Uuid::new_v4(),
            analysis_id,
            ai_determination: ai,
            human_determination: human,
            refund_basis: None,
            explanation: explanation.into(),
            reviewer_id: "analyst-1".into(),
            reviewed_at: Utc::now(),
        }
    }

    struct Fixture {
        patterns: Arc<InMemoryPatternStore>,
        store: Arc<InMemoryAnalysisStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                patterns: Arc::new(InMemoryPatternStore::new()),
                store: Arc::new(InMemoryAnalysisStore::new()),
            }
        }

        fn learner(&self, propagation: bool) -> FeedbackLearner {
            FeedbackLearner::new(
                Arc::clone(&self.patterns) as Arc<dyn PatternStore>,
                Arc::clone(&self.store) as Arc<dyn AnalysisStore>,
                LearnerConfig {
                    propagation_enabled: propagation,
                    ..LearnerConfig::default()
                },
            )
        }
    }

    #[tokio::test]
    async fn unexplained_correction_is_rejected_and_records_nothing() {
        let fx = Fixture::new();
        let txn = txn("t1", "Acme Corp", "software license", TaxType::Sales);
        let stored = result("t1", 60, Determination::TaxedCorrectly, vec![]);
        fx.store.save_result(&stored).await.unwrap();

        let bad = review(
            stored.id,
            Determination::TaxedCorrectly,
            Determination::Exempt,
            "   ",
        );
        let err = fx
            .learner(false)
            .submit_review(&bad, &txn, &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReview(_)));

        // Nothing was recorded
        assert!(!fx.store.is_reviewed(stored.id).await.unwrap());
        assert!(fx.patterns.events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirmation_updates_applied_pattern_counters() {
        let fx = Fixture::new();
        let pattern = LearnedPattern {
            id: Uuid::new_v4(),
            pattern_type: PatternType::VendorSpecific,
            trigger: taxlens_patterns::TriggerCondition {
                tax_type: TaxType::Sales,
                vendor: Some("acme corp".into()),
                category: None,
                keywords: vec![],
                anomaly_code: None,
            },
            confidence_adjustment: 20,
            forced_determination: None,
            refund_basis: None,
            source_review_ids: vec![],
            learned_from_count: 1,
            times_applied: 1,
            times_confirmed: 0,
            active: true,
            validated: true,
            created_at: Utc::now(),
        };
        let id = fx.patterns.create_learned_pattern(pattern).await.unwrap();

        let txn = txn("t1", "Acme Corp", "software license", TaxType::Sales);
        let stored = result("t1", 85, Determination::Exempt, vec![id]);
        fx.store.save_result(&stored).await.unwrap();

        // Analyst agrees
        let agreement = review(stored.id, Determination::Exempt, Determination::Exempt, "");
        let outcome = fx
            .learner(false)
            .submit_review(&agreement, &txn, &[], false)
            .await
            .unwrap();

        assert_eq!(outcome.pattern_id, None);
        assert_eq!(outcome.confirmations.len(), 1);
        assert_eq!(outcome.confirmations[0].1.times_confirmed, 1);
        assert!(fx.store.is_reviewed(stored.id).await.unwrap());

        // Vendor aggregate reinforced with an approved outcome
        let vendor = fx
            .patterns
            .get_vendor_pattern("acme corp", TaxType::Sales)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(vendor.sample_count, 1);
        assert!((vendor.success_rate - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn correction_creates_unvalidated_pattern_with_banded_adjustment() {
        let fx = Fixture::new();
        let txn = txn("t1", "Acme Corp", "software license", TaxType::Sales);
        let stored = result("t1", 60, Determination::TaxedCorrectly, vec![]);
        fx.store.save_result(&stored).await.unwrap();

        let correction = review(
            stored.id,
            Determination::TaxedCorrectly,
            Determination::Exempt,
            "Acme Corp is always exempt under the manufacturing exemption",
        );
        let outcome = fx
            .learner(false)
            .submit_review(&correction, &txn, &[], false)
            .await
            .unwrap();

        let id = outcome.pattern_id.unwrap();
        assert!(outcome
            .states
            .contains(&CorrectionState::PatternCreated { pattern_id: id }));

        let pattern = fx.patterns.get_learned_pattern(id).await.unwrap().unwrap();
        assert_eq!(pattern.pattern_type, PatternType::VendorSpecific);
        assert!(!pattern.validated);
        assert_eq!(pattern.forced_determination, Some(Determination::Exempt));
        // Confidence 60 sits in the middle band
        assert_eq!(pattern.confidence_adjustment, 20);
        assert_eq!(pattern.source_review_ids, vec![correction.id]);
    }

    #[tokio::test]
    async fn adjustment_band_uses_base_confidence_not_calibrated() {
        let fx = Fixture::new();
        let txn = txn("t1", "Acme Corp", "software license", TaxType::Sales);
        // Anomaly penalties dragged the calibrated score well below the
        // model's own confidence; the band must follow the latter
        let mut stored = result("t1", 75, Determination::TaxedCorrectly, vec![]);
        stored.final_confidence = 45;
        fx.store.save_result(&stored).await.unwrap();

        let correction = review(
            stored.id,
            Determination::TaxedCorrectly,
            Determination::Exempt,
            "Acme Corp is always exempt under the manufacturing exemption",
        );
        let outcome = fx
            .learner(false)
            .submit_review(&correction, &txn, &[], false)
            .await
            .unwrap();

        let pattern = fx
            .patterns
            .get_learned_pattern(outcome.pattern_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pattern.confidence_adjustment, 10);
    }

    #[tokio::test]
    async fn repeat_correction_reinforces_instead_of_duplicating() {
        let fx = Fixture::new();
        let learner = fx.learner(false);
        let mut ids = Vec::new();

        for i in 0..2 {
            let txn = txn(
                &format!("t{i}"),
                "Acme Corp",
                "software license",
                TaxType::Sales,
            );
            let stored = result(&txn.id, 60, Determination::TaxedCorrectly, vec![]);
            fx.store.save_result(&stored).await.unwrap();
            let correction = review(
                stored.id,
                Determination::TaxedCorrectly,
                Determination::Exempt,
                "Acme Corp is always exempt",
            );
            let outcome = learner
                .submit_review(&correction, &txn, &[], false)
                .await
                .unwrap();
            ids.push(outcome.pattern_id.unwrap());
        }

        assert_eq!(ids[0], ids[1]);
        let pattern = fx.patterns.get_learned_pattern(ids[0]).await.unwrap().unwrap();
        assert_eq!(pattern.learned_from_count, 2);
        assert!(fx
            .patterns
            .events()
            .await
            .unwrap()
            .iter()
            .any(|e| matches!(e, PatternEvent::Reinforced { .. })));
    }

    #[tokio::test]
    async fn unclassifiable_correction_records_no_pattern() {
        let fx = Fixture::new();
        let txn = txn("t1", "Acme Corp", "software license", TaxType::Sales);
        let stored = result("t1", 60, Determination::TaxedCorrectly, vec![]);
        fx.store.save_result(&stored).await.unwrap();

        let correction = review(
            stored.id,
            Determination::TaxedCorrectly,
            Determination::Exempt,
            "wrong",
        );
        let outcome = fx
            .learner(false)
            .submit_review(&correction, &txn, &[], false)
            .await
            .unwrap();

        assert_eq!(outcome.pattern_id, None);
        assert!(outcome.states.contains(&CorrectionState::NoPatternFound));
        // The review itself is still recorded
        assert!(fx.store.is_reviewed(stored.id).await.unwrap());
    }

    #[tokio::test]
    async fn propagation_updates_similar_unreviewed_results_only() {
        let fx = Fixture::new();

        let source = txn("t1", "Acme Corp", "software license renewal", TaxType::Sales);
        let similar = txn("t2", "ACME corp", "software license upgrade", TaxType::Sales);
        let reviewed = txn("t3", "Acme Corp", "software license addon", TaxType::Sales);
        let other_vendor = txn("t4", "Other Co", "unrelated freight", TaxType::Sales);

        let source_result = result("t1", 60, Determination::TaxedCorrectly, vec![]);
        let similar_result = result("t2", 55, Determination::TaxedCorrectly, vec![]);
        let mut reviewed_result = result("t3", 55, Determination::TaxedCorrectly, vec![]);
        reviewed_result.status = AnalysisStatus::Reviewed;
        let other_result = result("t4", 55, Determination::TaxedCorrectly, vec![]);

        for r in [&source_result, &similar_result, &reviewed_result, &other_result] {
            fx.store.save_result(r).await.unwrap();
        }

        let correction = review(
            source_result.id,
            Determination::TaxedCorrectly,
            Determination::Exempt,
            "Acme Corp is always exempt under the manufacturing exemption",
        );

        let candidates = vec![source.clone(), similar.clone(), reviewed, other_vendor];
        let outcome = fx
            .learner(true)
            .submit_review(&correction, &source, &candidates, true)
            .await
            .unwrap();

        let pattern_id = outcome.pattern_id.unwrap();
        assert_eq!(outcome.propagated.len(), 1);
        let record = &outcome.propagated[0];
        assert_eq!(record.transaction_id, "t2");
        assert_eq!(record.confidence_before, 55);
        // Middle band adjustment (+20) on the source's confidence 60
        assert_eq!(record.confidence_after, 75);
        assert_eq!(record.determination_before, Determination::TaxedCorrectly);
        assert_eq!(record.determination_after, Determination::Exempt);

        // The similar result was rewritten in place
        let updated = fx.store.get_result(similar_result.id).await.unwrap().unwrap();
        assert_eq!(updated.final_confidence, 75);
        assert_eq!(updated.determination, Determination::Exempt);
        assert!(updated.applied_pattern_ids.contains(&pattern_id));
        assert_eq!(updated.status, AnalysisStatus::PendingReview);

        // Reviewed and dissimilar results untouched
        let untouched = fx.store.get_result(other_result.id).await.unwrap().unwrap();
        assert_eq!(untouched.final_confidence, 55);

        // Propagation counts as an application
        let pattern = fx
            .patterns
            .get_learned_pattern(pattern_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pattern.times_applied, 1);
    }

    #[tokio::test]
    async fn propagation_requires_global_enable_and_opt_in() {
        let fx = Fixture::new();
        let source = txn("t1", "Acme Corp", "software license renewal", TaxType::Sales);
        let similar = txn("t2", "Acme Corp", "software license upgrade", TaxType::Sales);

        let source_result = result("t1", 60, Determination::TaxedCorrectly, vec![]);
        let similar_result = result("t2", 55, Determination::TaxedCorrectly, vec![]);
        fx.store.save_result(&source_result).await.unwrap();
        fx.store.save_result(&similar_result).await.unwrap();

        let correction = review(
            source_result.id,
            Determination::TaxedCorrectly,
            Determination::Exempt,
            "Acme Corp is always exempt",
        );

        // Opt-in without the global enable does nothing
        let outcome = fx
            .learner(false)
            .submit_review(&correction, &source, &[similar], true)
            .await
            .unwrap();
        assert!(outcome.propagated.is_empty());
        assert!(!outcome
            .states
            .iter()
            .any(|s| matches!(s, CorrectionState::PropagationAttempted { .. })));
    }
}
