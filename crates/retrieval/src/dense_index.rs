//! In-memory dense index
//!
//! Cosine nearest-neighbor search over chunk embeddings. The knowledge base
//! is a few hundred thousand chunks at most, so a flat scan with SIMD-friendly
//! dot products is adequate; the index also doubles as the chunk registry
//! shared with the lexical path.

use parking_lot::RwLock;
use std::collections::HashMap;

use taxlens_core::{ChunkFilter, KnowledgeChunk};

use crate::RetrievalError;

/// A scored dense candidate
#[derive(Debug, Clone)]
pub struct DenseHit {
    pub chunk_id: String,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
}

/// Flat in-memory vector index plus chunk registry
#[derive(Default)]
pub struct DenseIndex {
    chunks: RwLock<HashMap<String, KnowledgeChunk>>,
}

impl DenseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a chunk. Text is immutable per the chunk
    /// lifecycle; callers re-upserting the same id are replacing the
    /// embedding, not the text.
    pub fn upsert(&self, chunk: KnowledgeChunk) {
        self.chunks.write().insert(chunk.id.clone(), chunk);
    }

    /// Replace the embedding of an existing chunk (model migration)
    pub fn reindex_embedding(
        &self,
        chunk_id: &str,
        embedding: Vec<f32>,
    ) -> Result<(), RetrievalError> {
        let mut chunks = self.chunks.write();
        let chunk = chunks
            .get_mut(chunk_id)
            .ok_or_else(|| RetrievalError::NotFound(format!("chunk {chunk_id}")))?;
        chunk.embedding = Some(embedding);
        Ok(())
    }

    /// Fetch a chunk by id
    pub fn get(&self, chunk_id: &str) -> Option<KnowledgeChunk> {
        self.chunks.read().get(chunk_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Whether a chunk passes the given filter (used to post-filter the
    /// lexical path against the registry)
    pub fn passes_filter(&self, chunk_id: &str, filter: &ChunkFilter) -> bool {
        self.chunks
            .read()
            .get(chunk_id)
            .map(|c| filter.matches(c))
            .unwrap_or(false)
    }

    /// Top-k chunks by cosine similarity among those matching the filter
    /// and clearing the similarity floor
    pub fn search(
        &self,
        query: &[f32],
        filter: &ChunkFilter,
        k: usize,
        similarity_floor: f32,
    ) -> Vec<DenseHit> {
        let chunks = self.chunks.read();

        let mut hits: Vec<DenseHit> = chunks
            .values()
            .filter(|chunk| filter.matches(chunk))
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let similarity = cosine_similarity(query, embedding)?;
                (similarity >= similarity_floor).then(|| DenseHit {
                    chunk_id: chunk.id.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}

/// Cosine similarity; None on dimension mismatch or zero vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    (denom > 0.0).then(|| dot / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxlens_core::{ChunkTags, TaxType};

    fn chunk(id: &str, embedding: Vec<f32>, tax: Vec<TaxType>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            position: 0,
            text: format!("chunk {id}"),
            embedding: Some(embedding),
            lexically_indexed: false,
            tags: ChunkTags {
                tax_applicability: tax,
                ..Default::default()
            },
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn cosine_identity_is_one() {
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dimension_mismatch_is_none() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0]).is_none());
    }

    #[test]
    fn search_respects_floor_and_filter() {
        let index = DenseIndex::new();
        index.upsert(chunk("close", vec![1.0, 0.0], vec![]));
        index.upsert(chunk("far", vec![0.0, 1.0], vec![]));
        index.upsert(chunk("sales-only", vec![1.0, 0.1], vec![TaxType::Sales]));

        let filter = ChunkFilter::for_tax_type(TaxType::Use);
        let hits = index.search(&[1.0, 0.0], &filter, 10, 0.5);

        // "far" is orthogonal (sim 0), "sales-only" filtered out
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "close");
    }

    #[test]
    fn reindex_replaces_embedding_in_place() {
        let index = DenseIndex::new();
        index.upsert(chunk("c1", vec![0.0, 1.0], vec![]));

        index.reindex_embedding("c1", vec![1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], &ChunkFilter::default(), 1, 0.9);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "c1");

        assert!(index.reindex_embedding("missing", vec![1.0]).is_err());
    }
}
