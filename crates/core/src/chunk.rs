//! Knowledge chunk model
//!
//! A chunk is one unit of retrievable text from the legal/vendor knowledge
//! base. Text is immutable after ingestion; the dense embedding may be
//! replaced (same id) when the embedding model changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::transaction::TaxType;

/// Semantic role of a chunk within its source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkRole {
    Definition,
    Rule,
    Example,
    Exception,
}

/// Structured tags carried by every chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkTags {
    /// Legal citation string, e.g. "Cal. Rev. & Tax. Code § 6377.1"
    pub citation: Option<String>,
    /// Tax category this chunk speaks to
    pub category: Option<String>,
    /// Tax types this chunk applies to; empty means both
    #[serde(default)]
    pub tax_applicability: Vec<TaxType>,
    pub role: Option<ChunkRole>,
}

impl ChunkTags {
    /// Whether this chunk applies to the given tax type
    pub fn applies_to(&self, tax_type: TaxType) -> bool {
        self.tax_applicability.is_empty() || self.tax_applicability.contains(&tax_type)
    }
}

/// One unit of retrievable text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Unique chunk id
    pub id: String,
    /// Owning document id
    pub document_id: String,
    /// Ordinal position within the document
    pub position: usize,
    /// Raw chunk text (immutable after ingestion)
    pub text: String,
    /// Dense embedding vector, if the chunk has been embedded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Whether the chunk has been added to the lexical index
    #[serde(default)]
    pub lexically_indexed: bool,
    #[serde(default)]
    pub tags: ChunkTags,
    /// Free-form metadata passed through to results
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl KnowledgeChunk {
    /// A chunk with neither an embedding nor a lexical entry cannot be
    /// found by any search path and must be flagged at ingestion.
    pub fn is_searchable(&self) -> bool {
        self.embedding.is_some() || self.lexically_indexed
    }
}

/// Filter over the knowledge base, applied before both search paths
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkFilter {
    /// Restrict to chunks applicable to this tax type
    pub tax_type: Option<TaxType>,
    /// Restrict to a tax category
    pub category: Option<String>,
    /// Restrict to a semantic role
    pub role: Option<ChunkRole>,
}

impl ChunkFilter {
    pub fn for_tax_type(tax_type: TaxType) -> Self {
        Self {
            tax_type: Some(tax_type),
            ..Default::default()
        }
    }

    /// Whether a chunk passes this filter
    pub fn matches(&self, chunk: &KnowledgeChunk) -> bool {
        if let Some(tax_type) = self.tax_type {
            if !chunk.tags.applies_to(tax_type) {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            match chunk.tags.category {
                Some(ref c) if c.eq_ignore_ascii_case(category) => {}
                _ => return false,
            }
        }
        if let Some(role) = self.role {
            if chunk.tags.role != Some(role) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tax: Vec<TaxType>, category: Option<&str>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: "c1".into(),
            document_id: "d1".into(),
            position: 0,
            text: "text".into(),
            embedding: Some(vec![0.1, 0.2]),
            lexically_indexed: false,
            tags: ChunkTags {
                citation: None,
                category: category.map(|s| s.to_string()),
                tax_applicability: tax,
                role: None,
            },
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn empty_applicability_matches_both_tax_types() {
        let c = chunk(vec![], None);
        assert!(ChunkFilter::for_tax_type(TaxType::Sales).matches(&c));
        assert!(ChunkFilter::for_tax_type(TaxType::Use).matches(&c));
    }

    #[test]
    fn tax_type_filter_excludes_other_type() {
        let c = chunk(vec![TaxType::Sales], None);
        assert!(ChunkFilter::for_tax_type(TaxType::Sales).matches(&c));
        assert!(!ChunkFilter::for_tax_type(TaxType::Use).matches(&c));
    }

    #[test]
    fn category_filter_is_case_insensitive() {
        let c = chunk(vec![], Some("Manufacturing"));
        let filter = ChunkFilter {
            category: Some("manufacturing".into()),
            ..Default::default()
        };
        assert!(filter.matches(&c));
    }

    #[test]
    fn unsearchable_chunk_detected() {
        let mut c = chunk(vec![], None);
        c.embedding = None;
        c.lexically_indexed = false;
        assert!(!c.is_searchable());
    }
}
