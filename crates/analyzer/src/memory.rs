//! In-memory collaborator implementations
//!
//! Reference implementations of the persistence-facing traits, used as the
//! default store in single-process runs and as fixtures everywhere in the
//! test suites. Database-backed implementations satisfy the same traits.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use taxlens_core::{
    AnalysisResult, AnalysisStatus, AnalysisStore, Error, OutputRow, OutputSink,
    QueuedTransaction, Result, Review, ReviewQueue, ReviewQueues,
};

/// In-memory analysis result and review store
#[derive(Default)]
pub struct InMemoryAnalysisStore {
    results: DashMap<Uuid, AnalysisResult>,
    reviews: DashMap<Uuid, Review>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest result for a transaction id, for propagation lookups
    pub fn result_for_transaction(&self, transaction_id: &str) -> Option<AnalysisResult> {
        self.results
            .iter()
            .filter(|entry| entry.transaction_id == transaction_id)
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.clone())
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn save_result(&self, result: &AnalysisResult) -> Result<()> {
        self.results.insert(result.id, result.clone());
        Ok(())
    }

    async fn get_result(&self, analysis_id: Uuid) -> Result<Option<AnalysisResult>> {
        Ok(self.results.get(&analysis_id).map(|entry| entry.clone()))
    }

    async fn list_unreviewed(&self) -> Result<Vec<AnalysisResult>> {
        Ok(self
            .results
            .iter()
            .filter(|entry| entry.status != AnalysisStatus::Reviewed)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn save_review(&self, review: &Review) -> Result<()> {
        let mut result = self
            .results
            .get_mut(&review.analysis_id)
            .ok_or_else(|| Error::NotFound(format!("analysis {}", review.analysis_id)))?;
        result.status = AnalysisStatus::Reviewed;
        drop(result);

        self.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn is_reviewed(&self, analysis_id: Uuid) -> Result<bool> {
        Ok(self
            .results
            .get(&analysis_id)
            .map(|entry| entry.status == AnalysisStatus::Reviewed)
            .unwrap_or(false))
    }

    async fn update_result(&self, result: &AnalysisResult) -> Result<()> {
        if !self.results.contains_key(&result.id) {
            return Err(Error::NotFound(format!("analysis {}", result.id)));
        }
        self.results.insert(result.id, result.clone());
        Ok(())
    }
}

/// In-memory output sink collecting rows in write order
#[derive(Default)]
pub struct InMemoryOutputSink {
    rows: Mutex<Vec<(String, OutputRow)>>,
}

impl InMemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<(String, OutputRow)> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl OutputSink for InMemoryOutputSink {
    async fn write_row(&self, transaction_id: &str, row: &OutputRow) -> Result<()> {
        self.rows
            .lock()
            .push((transaction_id.to_string(), row.clone()));
        Ok(())
    }
}

/// In-memory review queues
#[derive(Default)]
pub struct InMemoryReviewQueues {
    queues: DashMap<ReviewQueue, Vec<QueuedTransaction>>,
}

impl InMemoryReviewQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, queue: ReviewQueue) -> Vec<QueuedTransaction> {
        self.queues
            .get(&queue)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn len(&self, queue: ReviewQueue) -> usize {
        self.queues.get(&queue).map(|entry| entry.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ReviewQueues for InMemoryReviewQueues {
    async fn push(&self, queue: ReviewQueue, entry: QueuedTransaction) -> Result<()> {
        self.queues.entry(queue).or_default().push(entry);
        Ok(())
    }
}
