//! Core types and traits for the taxlens refund analysis engine
//!
//! This crate provides the foundational types used across all other crates:
//! - Transaction and tax-type domain types
//! - Determination, anomaly, and analysis result types
//! - Review types with the explanation-required invariant
//! - KnowledgeChunk model for the retrieval layer
//! - Collaborator traits (document store, embeddings, inference, sinks)
//! - Error types

pub mod analysis;
pub mod anomaly;
pub mod chunk;
pub mod determination;
pub mod error;
pub mod inference_types;
pub mod review;
pub mod traits;
pub mod transaction;

pub use analysis::{
    AnalysisResult, AnalysisStatus, DegradationFlag, OutputRow, QueuedTransaction, ReviewQueue,
    RoutingDecision,
};
pub use anomaly::{Anomaly, AnomalySeverity};
pub use chunk::{ChunkFilter, ChunkRole, ChunkTags, KnowledgeChunk};
pub use determination::Determination;
pub use error::{Error, Result};
pub use inference_types::{DeterminationRequest, DeterminationResponse, RetrievedContext};
pub use review::Review;
pub use traits::{
    AnalysisStore, DocumentStore, EmbeddingService, InferenceService, OutputSink, ReviewQueues,
};
pub use transaction::{normalize_vendor, TaxType, Transaction};
