//! Hybrid retrieval over the tax knowledge base
//!
//! Features:
//! - Dense nearest-neighbor search (cosine) over chunk embeddings
//! - Lexical BM25 search via Tantivy
//! - Reciprocal-rank fusion with a structural both-lists-first ordering
//! - Degradation to single-path search when one backend is unreachable
//! - Remote embedding client with timeout and bounded idempotent retry
//! - Ingestion with unsearchable-chunk flagging and re-embedding support
//!
//! The retriever is read-only with respect to the document store: chunks
//! are pulled in at ingestion and never written back.

pub mod dense_index;
pub mod embeddings;
pub mod lexical;
pub mod retriever;

pub use dense_index::DenseIndex;
pub use embeddings::{EmbeddingClientConfig, HttpEmbeddingClient};
pub use lexical::{LexicalConfig, LexicalIndex, LexicalResult};
pub use retriever::{
    HybridRetriever, IngestStats, RetrievalMode, RetrievalOutcome, RetrievedChunk, RetrieverConfig,
    RetrievedSource,
};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Search error: {0}")]
    Search(String),

    /// Both search paths failed; pattern-only matching is the caller's
    /// remaining option
    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<RetrievalError> for taxlens_core::Error {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Unavailable(msg) => taxlens_core::Error::RetrievalUnavailable(msg),
            other => taxlens_core::Error::Retrieval(other.to_string()),
        }
    }
}
