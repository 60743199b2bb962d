//! Analysis pipeline
//!
//! One `process` call per transaction. Retrieval and pattern matching run
//! concurrently, the inference collaborator is consulted once, and the
//! calibrated result is persisted, queued, and written out as exactly one
//! row. Learned-pattern application counters are committed only after a
//! calibrated result exists, so a cancelled call never leaves partial
//! increments behind.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use taxlens_core::{
    AnalysisResult, AnalysisStatus, AnalysisStore, ChunkFilter, DegradationFlag,
    DeterminationRequest, DeterminationResponse, InferenceService, OutputSink, QueuedTransaction,
    Result, RetrievedContext, ReviewQueues, TaxType, Transaction,
};
use taxlens_inference::build_transaction_text;
use taxlens_patterns::{extract_keywords, MatchInput, PatternMatcher, PatternStore};
use taxlens_retrieval::{HybridRetriever, RetrievalError, RetrievalOutcome};

use crate::anomaly::AnomalyDetector;
use crate::calibrate::calibrate;
use crate::routing::{route, AuditSampler, RandomAuditSampler, RoutingConfig};

/// Context retrieval seam for the pipeline
///
/// The hybrid retriever is the production implementation; tests substitute
/// canned outcomes and failures.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve_context(
        &self,
        query: &str,
        tax_type: TaxType,
    ) -> std::result::Result<RetrievalOutcome, RetrievalError>;
}

#[async_trait]
impl ContextRetriever for HybridRetriever {
    async fn retrieve_context(
        &self,
        query: &str,
        tax_type: TaxType,
    ) -> std::result::Result<RetrievalOutcome, RetrievalError> {
        self.retrieve(query, tax_type, &ChunkFilter::default(), None, None, None)
            .await
    }
}

/// The per-transaction analysis pipeline
pub struct Analyzer {
    retriever: Arc<dyn ContextRetriever>,
    matcher: PatternMatcher,
    pattern_store: Arc<dyn PatternStore>,
    inference: Arc<dyn InferenceService>,
    analysis_store: Arc<dyn AnalysisStore>,
    output: Arc<dyn OutputSink>,
    queues: Arc<dyn ReviewQueues>,
    detector: AnomalyDetector,
    routing: RoutingConfig,
    sampler: Box<dyn AuditSampler>,
}

impl Analyzer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        retriever: Arc<dyn ContextRetriever>,
        pattern_store: Arc<dyn PatternStore>,
        inference: Arc<dyn InferenceService>,
        analysis_store: Arc<dyn AnalysisStore>,
        output: Arc<dyn OutputSink>,
        queues: Arc<dyn ReviewQueues>,
        routing: RoutingConfig,
    ) -> Self {
        Self {
            retriever,
            matcher: PatternMatcher::new(Arc::clone(&pattern_store)),
            pattern_store,
            inference,
            analysis_store,
            output,
            queues,
            detector: AnomalyDetector::new(),
            routing,
            sampler: Box::new(RandomAuditSampler::default()),
        }
    }

    /// Replace the audit sampler (tests pin it)
    pub fn with_sampler(mut self, sampler: Box<dyn AuditSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Analyze one transaction end to end
    ///
    /// Never errors on collaborator failure: retrieval and inference
    /// outages degrade into a needs-review result in the critical queue.
    /// Errors surface only when the result itself cannot be persisted.
    pub async fn process(&self, transaction: &Transaction) -> Result<AnalysisResult> {
        let anomalies = self.detector.detect(transaction);
        let keywords = extract_keywords(&transaction.description);

        let match_input = MatchInput {
            vendor_name: transaction.vendor_name.clone(),
            tax_type: transaction.tax_type,
            category: transaction.category.clone(),
            description_keywords: keywords,
            anomaly_codes: anomalies.iter().map(|a| a.code.clone()).collect(),
        };

        let query = transaction.query_text();
        let (retrieval, matches) = tokio::join!(
            self.retriever.retrieve_context(&query, transaction.tax_type),
            self.matcher.find_matches(&match_input),
        );
        let matches = matches?;

        let (context, retrieval_failed) = match retrieval {
            Ok(outcome) => (Self::to_context(outcome), false),
            Err(e) => {
                tracing::warn!(
                    transaction_id = %transaction.id, error = %e,
                    "retrieval unavailable; proceeding on patterns alone"
                );
                (Vec::new(), true)
            }
        };

        let request = DeterminationRequest {
            transaction_text: build_transaction_text(transaction),
            tax_type: transaction.tax_type,
            context,
        };

        let (response, inference_failed) = match self.inference.determine(&request).await {
            Ok(response) => (response, false),
            Err(e) => {
                tracing::warn!(
                    transaction_id = %transaction.id, error = %e,
                    "inference unavailable; emitting needs-review result"
                );
                (DeterminationResponse::unavailable(&e.to_string()), true)
            }
        };

        let calibration = calibrate(
            response.determination,
            response.base_confidence,
            &anomalies,
            &matches,
        );

        let degradation = if inference_failed {
            Some(DegradationFlag::InferenceUnavailable)
        } else if calibration.conflicting_overrides {
            Some(DegradationFlag::ConflictingOverrides)
        } else if retrieval_failed {
            Some(DegradationFlag::InsufficientContext)
        } else {
            None
        };

        let routing = route(
            &self.routing,
            calibration.final_confidence,
            transaction.tax_amount_cents,
            degradation.is_some(),
            self.sampler.as_ref(),
        );

        let estimated_refund_cents = if calibration.determination == response.determination
            || calibration.determination.is_refundable()
        {
            response.estimated_refund_cents
        } else {
            // An override away from a refundable call voids the estimate
            0
        };

        let refund_basis = response
            .refund_basis
            .clone()
            .or_else(|| matches.iter().find_map(|m| m.suggested_basis.clone()));

        let applied_pattern_ids: Vec<Uuid> =
            matches.iter().filter_map(|m| m.learned_id).collect();

        let result = AnalysisResult {
            id: Uuid::new_v4(),
            transaction_id: transaction.id.clone(),
            determination: calibration.determination,
            rationale: response.rationale,
            citations: response.citations,
            refund_basis,
            estimated_refund_cents,
            base_confidence: response.base_confidence.min(100),
            final_confidence: calibration.final_confidence,
            anomalies,
            applied_pattern_ids: applied_pattern_ids.clone(),
            routing,
            status: if routing.is_auto_approved() {
                AnalysisStatus::AutoApproved
            } else {
                AnalysisStatus::PendingReview
            },
            degradation,
            created_at: Utc::now(),
        };

        self.analysis_store.save_result(&result).await?;

        // Calibration exists and is persisted; application counters commit
        // now, not during matching
        if !applied_pattern_ids.is_empty() {
            self.pattern_store
                .record_applications(&applied_pattern_ids)
                .await?;
        }

        if let Some(queue) = routing.queue() {
            let audit_sample =
                matches!(routing, taxlens_core::RoutingDecision::AutoApprove { audit_sample: true });
            let deprioritized = matches!(
                routing,
                taxlens_core::RoutingDecision::Review { deprioritized: true, .. }
            );
            self.queues
                .push(
                    queue,
                    QueuedTransaction {
                        transaction_id: transaction.id.clone(),
                        analysis_id: result.id,
                        final_confidence: result.final_confidence,
                        tax_amount_cents: transaction.tax_amount_cents,
                        deprioritized,
                        audit_sample,
                        degradation: result.degradation,
                        queued_at: Utc::now(),
                    },
                )
                .await?;
        }

        self.output
            .write_row(&transaction.id, &result.output_row())
            .await?;

        tracing::info!(
            transaction_id = %transaction.id,
            analysis_id = %result.id,
            determination = %result.determination,
            final_confidence = result.final_confidence,
            routing = ?result.routing,
            degradation = ?result.degradation,
            "transaction analyzed"
        );

        Ok(result)
    }

    fn to_context(outcome: RetrievalOutcome) -> Vec<RetrievedContext> {
        outcome
            .results
            .into_iter()
            .map(|r| RetrievedContext {
                chunk_id: r.chunk.id.clone(),
                text: r.chunk.text.clone(),
                citation: r.chunk.tags.citation.clone(),
                score: r.fused_score,
            })
            .collect()
    }
}
