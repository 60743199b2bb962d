//! Collaborator traits
//!
//! All external systems sit behind these traits so every crate can be
//! tested with in-process fakes and backends can be swapped without code
//! changes:
//!
//! - `DocumentStore`: read-only chunk source (the retriever never writes)
//! - `EmbeddingService`: text -> dense vector (pure; safe to retry)
//! - `InferenceService`: determination black box (not idempotent)
//! - `AnalysisStore`: persisted results and reviews
//! - `OutputSink`: one spreadsheet row per transaction
//! - `ReviewQueues`: routing destinations for the downstream UI

use async_trait::async_trait;

use crate::analysis::{AnalysisResult, OutputRow, QueuedTransaction, ReviewQueue};
use crate::chunk::{ChunkFilter, KnowledgeChunk};
use crate::error::Result;
use crate::inference_types::{DeterminationRequest, DeterminationResponse};
use crate::review::Review;

/// Read-only access to the knowledge base
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_chunks(&self, filter: &ChunkFilter) -> Result<Vec<KnowledgeChunk>>;
}

/// Dense embedding computation
///
/// Embeddings are a pure function of input, so implementations may be
/// retried idempotently on transient failure.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// The external model producing base determinations
///
/// Calls are not guaranteed idempotent and must not be retried more than
/// twice. A failing implementation surfaces as an error here; the pipeline
/// degrades it to a needs-review result, never a crash.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn determine(&self, request: &DeterminationRequest) -> Result<DeterminationResponse>;
}

/// Persistence for analysis results and reviews
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save_result(&self, result: &AnalysisResult) -> Result<()>;
    async fn get_result(&self, analysis_id: uuid::Uuid) -> Result<Option<AnalysisResult>>;
    /// Results not yet reviewed, for similar-case propagation
    async fn list_unreviewed(&self) -> Result<Vec<AnalysisResult>>;
    /// Persist a validated review and mark its result reviewed
    async fn save_review(&self, review: &Review) -> Result<()>;
    async fn is_reviewed(&self, analysis_id: uuid::Uuid) -> Result<bool>;
    /// Replace a stored result after propagation re-calibration
    async fn update_result(&self, result: &AnalysisResult) -> Result<()>;
}

/// Write sink for caller-defined spreadsheet output columns
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write_row(&self, transaction_id: &str, row: &OutputRow) -> Result<()>;
}

/// Routing destinations consumed by the review UI
#[async_trait]
pub trait ReviewQueues: Send + Sync {
    async fn push(&self, queue: ReviewQueue, entry: QueuedTransaction) -> Result<()>;
}
