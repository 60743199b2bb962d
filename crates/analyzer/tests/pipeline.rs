//! End-to-end pipeline tests with in-process collaborators

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use taxlens_analyzer::{
    Analyzer, ContextRetriever, FixedAuditSampler, InMemoryAnalysisStore, InMemoryOutputSink,
    InMemoryReviewQueues, RoutingConfig,
};
use taxlens_core::{
    AnalysisStatus, AnalysisStore, DegradationFlag, Determination, DeterminationRequest,
    DeterminationResponse, Error, InferenceService, Result, ReviewQueue, RoutingDecision, TaxType,
    Transaction,
};
use taxlens_patterns::{
    InMemoryPatternStore, LearnedPattern, PatternStore, PatternType, TriggerCondition,
    VendorPattern,
};
use taxlens_retrieval::{RetrievalError, RetrievalMode, RetrievalOutcome};

struct EmptyRetriever;

#[async_trait]
impl ContextRetriever for EmptyRetriever {
    async fn retrieve_context(
        &self,
        _query: &str,
        _tax_type: TaxType,
    ) -> std::result::Result<RetrievalOutcome, RetrievalError> {
        Ok(RetrievalOutcome {
            results: vec![],
            mode: RetrievalMode::Hybrid,
        })
    }
}

struct FailingRetriever;

#[async_trait]
impl ContextRetriever for FailingRetriever {
    async fn retrieve_context(
        &self,
        _query: &str,
        _tax_type: TaxType,
    ) -> std::result::Result<RetrievalOutcome, RetrievalError> {
        Err(RetrievalError::Unavailable(
            "dense: connection refused; lexical: index corrupt".into(),
        ))
    }
}

struct StubInference(DeterminationResponse);

#[async_trait]
impl InferenceService for StubInference {
    async fn determine(&self, _request: &DeterminationRequest) -> Result<DeterminationResponse> {
        Ok(self.0.clone())
    }
}

struct FailingInference;

#[async_trait]
impl InferenceService for FailingInference {
    async fn determine(&self, _request: &DeterminationRequest) -> Result<DeterminationResponse> {
        Err(Error::InferenceUnavailable("503 after 2 retries".into()))
    }
}

fn response(determination: Determination, confidence: u32, refund_cents: i64) -> DeterminationResponse {
    DeterminationResponse {
        determination,
        rationale: "stub rationale".into(),
        citations: vec!["Cal. Rev. & Tax. Code § 6377.1".into()],
        refund_basis: None,
        estimated_refund_cents: refund_cents,
        base_confidence: confidence,
    }
}

/// Clean transaction: 7.25% effective rate, non-round tax amount
fn clean_txn(id: &str, tax_type: TaxType) -> Transaction {
    Transaction {
        id: id.to_string(),
        vendor_name: "Acme Corp".into(),
        description: "CNC milling machine spindle assembly".into(),
        tax_type,
        tax_amount_cents: 7_253,
        invoice_total_cents: 100_041,
        category: Some("Manufacturing Equipment".into()),
        invoice_date: NaiveDate::from_ymd_opt(2024, 3, 14),
    }
}

struct Fixture {
    patterns: Arc<InMemoryPatternStore>,
    store: Arc<InMemoryAnalysisStore>,
    sink: Arc<InMemoryOutputSink>,
    queues: Arc<InMemoryReviewQueues>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            patterns: Arc::new(InMemoryPatternStore::new()),
            store: Arc::new(InMemoryAnalysisStore::new()),
            sink: Arc::new(InMemoryOutputSink::new()),
            queues: Arc::new(InMemoryReviewQueues::new()),
        }
    }

    fn analyzer(
        &self,
        retriever: Arc<dyn ContextRetriever>,
        inference: Arc<dyn InferenceService>,
        sample: bool,
    ) -> Analyzer {
        Analyzer::new(
            retriever,
            Arc::clone(&self.patterns) as Arc<dyn PatternStore>,
            inference,
            Arc::clone(&self.store) as _,
            Arc::clone(&self.sink) as _,
            Arc::clone(&self.queues) as _,
            RoutingConfig::default(),
        )
        .with_sampler(Box::new(FixedAuditSampler(sample)))
    }
}

fn learned_override(
    vendor: &str,
    tax_type: TaxType,
    forced: Determination,
    adjustment: i32,
) -> LearnedPattern {
    LearnedPattern {
        id: Uuid::new_v4(),
        pattern_type: PatternType::VendorSpecific,
        trigger: TriggerCondition {
            tax_type,
            vendor: Some(vendor.into()),
            category: None,
            keywords: vec![],
            anomaly_code: None,
        },
        confidence_adjustment: adjustment,
        forced_determination: Some(forced),
        refund_basis: None,
        source_review_ids: vec![Uuid::new_v4()],
        learned_from_count: 1,
        times_applied: 0,
        times_confirmed: 0,
        active: true,
        validated: true,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn clean_high_confidence_transaction_auto_approves() {
    let fx = Fixture::new();
    let analyzer = fx.analyzer(
        Arc::new(EmptyRetriever),
        Arc::new(StubInference(response(Determination::Exempt, 95, 7_253))),
        false,
    );

    let result = analyzer.process(&clean_txn("t1", TaxType::Sales)).await.unwrap();

    assert_eq!(result.determination, Determination::Exempt);
    assert_eq!(result.final_confidence, 95);
    assert_eq!(result.routing, RoutingDecision::AutoApprove { audit_sample: false });
    assert_eq!(result.status, AnalysisStatus::AutoApproved);
    assert_eq!(result.estimated_refund_cents, 7_253);
    assert!(result.anomalies.is_empty());
    assert_eq!(result.degradation, None);

    // No queue entry, exactly one output row
    assert_eq!(fx.queues.len(ReviewQueue::Critical), 0);
    assert_eq!(fx.queues.len(ReviewQueue::High), 0);
    assert_eq!(fx.queues.len(ReviewQueue::Standard), 0);
    let rows = fx.sink.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "t1");
    assert_eq!(rows[0].1.final_confidence, 95);
}

#[tokio::test]
async fn audit_sampled_auto_approval_lands_in_standard_queue() {
    let fx = Fixture::new();
    let analyzer = fx.analyzer(
        Arc::new(EmptyRetriever),
        Arc::new(StubInference(response(Determination::Exempt, 95, 7_253))),
        true,
    );

    let result = analyzer.process(&clean_txn("t1", TaxType::Sales)).await.unwrap();

    assert_eq!(result.routing, RoutingDecision::AutoApprove { audit_sample: true });
    assert_eq!(result.status, AnalysisStatus::AutoApproved);

    let standard = fx.queues.entries(ReviewQueue::Standard);
    assert_eq!(standard.len(), 1);
    assert!(standard[0].audit_sample);
}

#[tokio::test]
async fn anomalies_penalize_confidence_into_review() {
    let fx = Fixture::new();
    let analyzer = fx.analyzer(
        Arc::new(EmptyRetriever),
        Arc::new(StubInference(response(Determination::TaxOverpaid, 95, 5_000))),
        false,
    );

    // Round $300 tax on a $400 invoice: round-amount (-8) plus
    // rate-out-of-range (-15)
    let mut txn = clean_txn("t1", TaxType::Sales);
    txn.tax_amount_cents = 30_000;
    txn.invoice_total_cents = 40_000;

    let result = analyzer.process(&txn).await.unwrap();

    assert_eq!(result.anomalies.len(), 2);
    assert_eq!(result.final_confidence, 72);
    assert_eq!(
        result.routing,
        RoutingDecision::Review { queue: ReviewQueue::Standard, deprioritized: true }
    );
    assert_eq!(result.status, AnalysisStatus::PendingReview);
    assert_eq!(fx.queues.len(ReviewQueue::Standard), 1);
}

#[tokio::test]
async fn inference_outage_degrades_to_critical_not_crash() {
    let fx = Fixture::new();
    let analyzer = fx.analyzer(Arc::new(EmptyRetriever), Arc::new(FailingInference), false);

    let result = analyzer.process(&clean_txn("t1", TaxType::Use)).await.unwrap();

    assert_eq!(result.determination, Determination::NeedsReview);
    assert_eq!(result.final_confidence, 0);
    assert_eq!(result.degradation, Some(DegradationFlag::InferenceUnavailable));
    assert_eq!(
        result.routing,
        RoutingDecision::Review { queue: ReviewQueue::Critical, deprioritized: false }
    );

    let critical = fx.queues.entries(ReviewQueue::Critical);
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].degradation, Some(DegradationFlag::InferenceUnavailable));

    // The row is still written
    assert_eq!(fx.sink.rows().len(), 1);
}

#[tokio::test]
async fn retrieval_outage_forces_critical_despite_high_confidence() {
    let fx = Fixture::new();
    let analyzer = fx.analyzer(
        Arc::new(FailingRetriever),
        Arc::new(StubInference(response(Determination::Exempt, 95, 7_253))),
        false,
    );

    let result = analyzer.process(&clean_txn("t1", TaxType::Sales)).await.unwrap();

    assert_eq!(result.degradation, Some(DegradationFlag::InsufficientContext));
    assert_eq!(
        result.routing,
        RoutingDecision::Review { queue: ReviewQueue::Critical, deprioritized: false }
    );
    assert_eq!(fx.queues.len(ReviewQueue::Critical), 1);
}

#[tokio::test]
async fn conflicting_overrides_become_needs_review_in_critical() {
    let fx = Fixture::new();
    fx.patterns
        .create_learned_pattern(learned_override(
            "acme corp",
            TaxType::Sales,
            Determination::Exempt,
            20,
        ))
        .await
        .unwrap();
    fx.patterns
        .create_learned_pattern(learned_override(
            "acme corp",
            TaxType::Sales,
            Determination::NonTaxable,
            10,
        ))
        .await
        .unwrap();

    let analyzer = fx.analyzer(
        Arc::new(EmptyRetriever),
        Arc::new(StubInference(response(Determination::TaxedCorrectly, 80, 0))),
        false,
    );

    let result = analyzer.process(&clean_txn("t1", TaxType::Sales)).await.unwrap();

    assert_eq!(result.determination, Determination::NeedsReview);
    assert_eq!(result.degradation, Some(DegradationFlag::ConflictingOverrides));
    assert_eq!(
        result.routing,
        RoutingDecision::Review { queue: ReviewQueue::Critical, deprioritized: false }
    );
}

#[tokio::test]
async fn application_counters_commit_after_result_exists() {
    let fx = Fixture::new();
    let pattern = learned_override("acme corp", TaxType::Sales, Determination::Exempt, 20);
    let id = fx.patterns.create_learned_pattern(pattern).await.unwrap();

    let analyzer = fx.analyzer(
        Arc::new(EmptyRetriever),
        Arc::new(StubInference(response(Determination::TaxedCorrectly, 70, 0))),
        false,
    );

    let result = analyzer.process(&clean_txn("t1", TaxType::Sales)).await.unwrap();

    assert_eq!(result.applied_pattern_ids, vec![id]);
    assert_eq!(result.determination, Determination::Exempt);

    let stored = fx.patterns.get_learned_pattern(id).await.unwrap().unwrap();
    assert_eq!(stored.times_applied, 1);

    // The persisted result carries the applied ids for later confirmation
    let persisted = fx.store.get_result(result.id).await.unwrap().unwrap();
    assert_eq!(persisted.applied_pattern_ids, vec![id]);
}

#[tokio::test]
async fn vendor_history_boosts_only_its_own_tax_type() {
    let fx = Fixture::new();
    fx.patterns
        .upsert_vendor_pattern(VendorPattern {
            vendor: "acme corp".into(),
            tax_type: TaxType::Sales,
            sample_count: 12,
            success_rate: 0.9,
            typical_refund_basis: Some("manufacturing exemption".into()),
            common_categories: Default::default(),
            common_keywords: Default::default(),
            product_type: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let analyzer = fx.analyzer(
        Arc::new(EmptyRetriever),
        Arc::new(StubInference(response(Determination::Exempt, 80, 7_253))),
        false,
    );

    // Same vendor, use tax: the sales history must not contribute
    let use_result = analyzer.process(&clean_txn("t-use", TaxType::Use)).await.unwrap();
    assert_eq!(use_result.final_confidence, 80);
    assert_eq!(use_result.refund_basis, None);

    // Distinct invoice so the duplicate-invoice check stays quiet
    let mut sales_txn = clean_txn("t-sales", TaxType::Sales);
    sales_txn.tax_amount_cents = 14_507;
    sales_txn.invoice_total_cents = 200_083;
    let sales_result = analyzer.process(&sales_txn).await.unwrap();
    assert_eq!(sales_result.final_confidence, 95);
    assert_eq!(
        sales_result.refund_basis.as_deref(),
        Some("manufacturing exemption")
    );
}
