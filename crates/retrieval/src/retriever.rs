//! Hybrid retriever
//!
//! Runs dense and lexical search over the filtered knowledge base and
//! merges the two ranked lists with reciprocal-rank fusion. The fusion
//! ordering is tiered: a chunk found by both paths always outranks a chunk
//! found by only one, then RRF score, then raw semantic similarity.

use std::collections::HashMap;
use std::sync::Arc;

use taxlens_config::constants::retrieval as defaults;
use taxlens_core::{ChunkFilter, EmbeddingService, KnowledgeChunk, TaxType};

use crate::dense_index::DenseIndex;
use crate::lexical::{LexicalConfig, LexicalIndex};
use crate::RetrievalError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Candidates from dense search
    pub k_semantic: usize,
    /// Candidates from lexical search
    pub k_lexical: usize,
    /// Final result cap
    pub final_limit: usize,
    /// Minimum cosine similarity for dense candidates
    pub similarity_floor: f32,
    /// RRF dampening constant
    pub rrf_c: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            k_semantic: defaults::K_SEMANTIC,
            k_lexical: defaults::K_LEXICAL,
            final_limit: defaults::FINAL_LIMIT,
            similarity_floor: defaults::SIMILARITY_FLOOR,
            rrf_c: defaults::RRF_C,
        }
    }
}

impl From<&taxlens_config::RetrievalSettings> for RetrieverConfig {
    fn from(settings: &taxlens_config::RetrievalSettings) -> Self {
        Self {
            k_semantic: settings.k_semantic,
            k_lexical: settings.k_lexical,
            final_limit: settings.final_limit,
            similarity_floor: settings.similarity_floor,
            rrf_c: settings.rrf_c,
        }
    }
}

/// Which search path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievedSource {
    Dense,
    Lexical,
    Hybrid,
}

/// A fused retrieval result
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: KnowledgeChunk,
    /// RRF fused score
    pub fused_score: f32,
    /// Cosine similarity when the dense path saw this chunk
    pub semantic_similarity: Option<f32>,
    /// BM25 score when the lexical path saw this chunk
    pub lexical_score: Option<f32>,
    pub source: RetrievedSource,
}

/// Which paths contributed to a retrieval run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Hybrid,
    /// Lexical backend failed; dense results only
    DenseOnly,
    /// Embedding backend failed; lexical results only
    LexicalOnly,
}

/// Result of one retrieval run
///
/// An empty result list is a valid, low-confidence outcome, not an error.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievedChunk>,
    pub mode: RetrievalMode,
}

/// Ingestion statistics
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    pub indexed: usize,
    /// Chunks with neither an embedding nor a lexical entry; these are
    /// unsearchable and excluded from both indexes
    pub unsearchable: usize,
}

/// Hybrid retriever over the knowledge base
///
/// Read-only at query time; ingestion populates both indexes up front.
pub struct HybridRetriever {
    config: RetrieverConfig,
    embedder: Arc<dyn EmbeddingService>,
    dense: Arc<DenseIndex>,
    lexical: Arc<LexicalIndex>,
}

impl HybridRetriever {
    pub fn new(
        config: RetrieverConfig,
        embedder: Arc<dyn EmbeddingService>,
        lexical_config: LexicalConfig,
    ) -> Result<Self, RetrievalError> {
        Ok(Self {
            config,
            embedder,
            dense: Arc::new(DenseIndex::new()),
            lexical: Arc::new(LexicalIndex::new(lexical_config)?),
        })
    }

    /// Index a batch of chunks into both search paths
    ///
    /// Chunks without embeddings still go into the lexical index and vice
    /// versa; chunks with neither are flagged and skipped.
    pub fn index_chunks(&self, chunks: Vec<KnowledgeChunk>) -> Result<IngestStats, RetrievalError> {
        let mut stats = IngestStats::default();
        let mut lexical_batch = Vec::new();

        for mut chunk in chunks {
            // Membership in the lexical index is decided here, not by the
            // importer
            chunk.lexically_indexed = !chunk.text.trim().is_empty();

            if !chunk.is_searchable() {
                tracing::warn!(chunk_id = %chunk.id, document_id = %chunk.document_id,
                    "chunk has neither embedding nor indexable text; unsearchable");
                stats.unsearchable += 1;
                continue;
            }

            if chunk.lexically_indexed {
                lexical_batch.push(chunk.clone());
            }
            self.dense.upsert(chunk);
            stats.indexed += 1;
        }

        if !lexical_batch.is_empty() {
            self.lexical.index_chunks(&lexical_batch)?;
        }

        tracing::info!(indexed = stats.indexed, unsearchable = stats.unsearchable, "chunks ingested");
        Ok(stats)
    }

    /// Replace a chunk's embedding after an embedding-model change
    pub fn reindex_embedding(
        &self,
        chunk_id: &str,
        embedding: Vec<f32>,
    ) -> Result<(), RetrievalError> {
        self.dense.reindex_embedding(chunk_id, embedding)
    }

    /// Retrieve fused context for a transaction
    ///
    /// `k_lexical` / `k_semantic` / `limit` default from config when None.
    /// Degrades to the surviving path when one backend fails; errors only
    /// when both fail.
    pub async fn retrieve(
        &self,
        query_text: &str,
        tax_type: TaxType,
        filter: &ChunkFilter,
        k_lexical: Option<usize>,
        k_semantic: Option<usize>,
        limit: Option<usize>,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let k_lex = k_lexical.unwrap_or(self.config.k_lexical);
        let k_sem = k_semantic.unwrap_or(self.config.k_semantic);
        let limit = limit.unwrap_or(self.config.final_limit);

        let mut filter = filter.clone();
        filter.tax_type = Some(tax_type);

        // Dense path: embed then scan. Lexical path: tantivy off the async
        // executor. Both run concurrently.
        let dense_future = self.search_dense(query_text, &filter, k_sem);
        let lexical_future = self.search_lexical(query_text, &filter, k_lex);

        let (dense_result, lexical_result) = tokio::join!(dense_future, lexical_future);

        let (dense_hits, lexical_hits, mode) = match (dense_result, lexical_result) {
            (Ok(d), Ok(l)) => (d, l, RetrievalMode::Hybrid),
            (Ok(d), Err(e)) => {
                tracing::warn!(error = %e, "lexical search failed; degrading to dense-only");
                (d, Vec::new(), RetrievalMode::DenseOnly)
            }
            (Err(e), Ok(l)) => {
                tracing::warn!(error = %e, "dense search failed; degrading to lexical-only");
                (Vec::new(), l, RetrievalMode::LexicalOnly)
            }
            (Err(de), Err(le)) => {
                return Err(RetrievalError::Unavailable(format!(
                    "dense: {de}; lexical: {le}"
                )));
            }
        };

        let mut results = self.fuse(dense_hits, lexical_hits);
        results.truncate(limit);

        Ok(RetrievalOutcome { results, mode })
    }

    async fn search_dense(
        &self,
        query_text: &str,
        filter: &ChunkFilter,
        k: usize,
    ) -> Result<Vec<(String, f32)>, RetrievalError> {
        let embedding = self
            .embedder
            .embed(query_text)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let hits = self
            .dense
            .search(&embedding, filter, k, self.config.similarity_floor);

        Ok(hits.into_iter().map(|h| (h.chunk_id, h.similarity)).collect())
    }

    async fn search_lexical(
        &self,
        query_text: &str,
        filter: &ChunkFilter,
        k: usize,
    ) -> Result<Vec<(String, f32)>, RetrievalError> {
        let lexical = Arc::clone(&self.lexical);
        let query = query_text.to_string();

        // Over-fetch before the registry post-filter so filtered-out hits
        // do not starve the list
        let fetch = k.saturating_mul(3).max(k);
        let raw = tokio::task::spawn_blocking(move || lexical.search(&query, fetch))
            .await
            .map_err(|e| RetrievalError::Search(format!("lexical task failed: {e}")))??;

        let filtered: Vec<(String, f32)> = raw
            .into_iter()
            .filter(|r| self.dense.passes_filter(&r.chunk_id, filter))
            .take(k)
            .map(|r| (r.chunk_id, r.score))
            .collect();

        Ok(filtered)
    }

    /// Reciprocal-rank fusion with a structural both-lists-first ordering
    fn fuse(
        &self,
        dense: Vec<(String, f32)>,
        lexical: Vec<(String, f32)>,
    ) -> Vec<RetrievedChunk> {
        struct Fused {
            fused_score: f32,
            semantic: Option<f32>,
            lexical: Option<f32>,
        }

        let mut merged: HashMap<String, Fused> = HashMap::new();

        for (rank, (id, similarity)) in dense.into_iter().enumerate() {
            let rrf = 1.0 / (self.config.rrf_c + rank as f32 + 1.0);
            merged.insert(
                id,
                Fused {
                    fused_score: rrf,
                    semantic: Some(similarity),
                    lexical: None,
                },
            );
        }

        for (rank, (id, score)) in lexical.into_iter().enumerate() {
            let rrf = 1.0 / (self.config.rrf_c + rank as f32 + 1.0);
            merged
                .entry(id)
                .and_modify(|f| {
                    f.fused_score += rrf;
                    f.lexical = Some(score);
                })
                .or_insert(Fused {
                    fused_score: rrf,
                    semantic: None,
                    lexical: Some(score),
                });
        }

        let mut results: Vec<RetrievedChunk> = merged
            .into_iter()
            .filter_map(|(id, fused)| {
                let chunk = self.dense.get(&id)?;
                let source = match (fused.semantic.is_some(), fused.lexical.is_some()) {
                    (true, true) => RetrievedSource::Hybrid,
                    (true, false) => RetrievedSource::Dense,
                    _ => RetrievedSource::Lexical,
                };
                Some(RetrievedChunk {
                    chunk,
                    fused_score: fused.fused_score,
                    semantic_similarity: fused.semantic,
                    lexical_score: fused.lexical,
                    source,
                })
            })
            .collect();

        // Both-lists chunks first, then fused score, ties by semantic
        // similarity descending
        results.sort_by(|a, b| {
            let a_both = a.source == RetrievedSource::Hybrid;
            let b_both = b.source == RetrievedSource::Hybrid;
            b_both
                .cmp(&a_both)
                .then(
                    b.fused_score
                        .partial_cmp(&a.fused_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(
                    b.semantic_similarity
                        .unwrap_or(f32::MIN)
                        .partial_cmp(&a.semantic_similarity.unwrap_or(f32::MIN))
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use taxlens_core::ChunkTags;

    /// Deterministic embedder: maps known keywords onto axes
    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingService for StubEmbedder {
        async fn embed(&self, text: &str) -> taxlens_core::Result<Vec<f32>> {
            let text = text.to_lowercase();
            let mut v = vec![0.0f32; 3];
            if text.contains("manufacturing") {
                v[0] = 1.0;
            }
            if text.contains("software") {
                v[1] = 1.0;
            }
            if text.contains("freight") {
                v[2] = 1.0;
            }
            Ok(v)
        }
    }

    /// Embedder that always fails, for degradation tests
    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingService for FailingEmbedder {
        async fn embed(&self, _text: &str) -> taxlens_core::Result<Vec<f32>> {
            Err(taxlens_core::Error::Retrieval("embedding backend down".into()))
        }
    }

    fn chunk(id: &str, text: &str, embedding: Option<Vec<f32>>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            position: 0,
            text: text.to_string(),
            embedding,
            lexically_indexed: false,
            tags: ChunkTags::default(),
            metadata: HashMap::new(),
        }
    }

    fn retriever(embedder: Arc<dyn EmbeddingService>) -> HybridRetriever {
        HybridRetriever::new(RetrieverConfig::default(), embedder, LexicalConfig::default())
            .unwrap()
    }

    #[tokio::test]
    async fn both_list_chunks_outrank_single_list_chunks() {
        let r = retriever(Arc::new(StubEmbedder));
        r.index_chunks(vec![
            // In both lists: embedded on the manufacturing axis and
            // lexically matching
            chunk(
                "both",
                "manufacturing equipment exemption",
                Some(vec![1.0, 0.0, 0.0]),
            ),
            // Dense-only: same axis, but no matching terms
            chunk("dense-only", "unrelated wording here", Some(vec![0.9, 0.1, 0.0])),
            // Lexical-only: matching terms, orthogonal embedding
            chunk(
                "lexical-only",
                "manufacturing machinery",
                Some(vec![0.0, 0.0, 1.0]),
            ),
        ])
        .unwrap();

        let outcome = r
            .retrieve(
                "manufacturing equipment",
                TaxType::Sales,
                &ChunkFilter::default(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.mode, RetrievalMode::Hybrid);
        assert!(!outcome.results.is_empty());
        assert_eq!(outcome.results[0].chunk.id, "both");
        assert_eq!(outcome.results[0].source, RetrievedSource::Hybrid);
    }

    #[tokio::test]
    async fn no_results_is_empty_not_error() {
        let r = retriever(Arc::new(StubEmbedder));
        r.index_chunks(vec![chunk("c", "freight charges", Some(vec![0.0, 0.0, 1.0]))])
            .unwrap();

        // Query embeds to the zero vector and shares no terms; nothing
        // clears the similarity floor
        let outcome = r
            .retrieve(
                "zzqx",
                TaxType::Sales,
                &ChunkFilter::default(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_degrades_to_lexical_only() {
        let r = retriever(Arc::new(FailingEmbedder));
        r.index_chunks(vec![chunk(
            "lex",
            "out-of-state service not taxable",
            Some(vec![1.0, 0.0, 0.0]),
        )])
        .unwrap();

        let outcome = r
            .retrieve(
                "out-of-state service",
                TaxType::Use,
                &ChunkFilter::default(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.mode, RetrievalMode::LexicalOnly);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].chunk.id, "lex");
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let r = retriever(Arc::new(StubEmbedder));
        let chunks: Vec<KnowledgeChunk> = (0..20)
            .map(|i| {
                chunk(
                    &format!("c{i}"),
                    "software subscription taxable services",
                    Some(vec![0.0, 1.0, 0.0]),
                )
            })
            .collect();
        r.index_chunks(chunks).unwrap();

        let outcome = r
            .retrieve(
                "software subscription",
                TaxType::Sales,
                &ChunkFilter::default(),
                None,
                None,
                Some(3),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
    }

    #[test]
    fn unsearchable_chunks_are_flagged_and_skipped() {
        let r = retriever(Arc::new(StubEmbedder));
        let stats = r
            .index_chunks(vec![
                chunk("ok", "some text", None),
                chunk("bad", "   ", None),
            ])
            .unwrap();

        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.unsearchable, 1);
    }
}
