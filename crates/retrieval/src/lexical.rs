//! Lexical search using Tantivy (BM25)
//!
//! Term-frequency ranking over chunk text for the keyword half of hybrid
//! retrieval. Tax-type and category filtering happens against the chunk
//! registry after scoring, so the schema stays minimal.

use parking_lot::RwLock;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED, STRING},
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument,
};

use taxlens_config::constants::retrieval as retrieval_constants;
use taxlens_core::KnowledgeChunk;

use crate::RetrievalError;

/// Lexical index configuration
#[derive(Debug, Clone)]
pub struct LexicalConfig {
    /// Index path (in-RAM when None)
    pub index_path: Option<String>,
    /// Enable English stemming
    pub stemming: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            stemming: true,
        }
    }
}

/// A scored lexical candidate
#[derive(Debug, Clone)]
pub struct LexicalResult {
    pub chunk_id: String,
    /// BM25 score (not comparable to cosine similarity)
    pub score: f32,
}

/// BM25 index over chunk text
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<Option<IndexWriter>>,
    id_field: Field,
    text_field: Field,
    citation_field: Field,
}

impl LexicalIndex {
    pub fn new(config: LexicalConfig) -> Result<Self, RetrievalError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("folded")
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options.clone());
        let citation_field = schema_builder.add_text_field("citation", text_options);

        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RetrievalError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema.clone())
                .map_err(|e| RetrievalError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema.clone())
        };

        index.tokenizers().register("folded", Self::build_tokenizer(&config));

        let reader = index
            .reader()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let writer = index
            .writer(retrieval_constants::LEXICAL_WRITER_HEAP_BYTES)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: RwLock::new(Some(writer)),
            id_field,
            text_field,
            citation_field,
        })
    }

    fn build_tokenizer(config: &LexicalConfig) -> TextAnalyzer {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);

        if config.stemming {
            base.filter(Stemmer::new(Language::English)).build()
        } else {
            base.build()
        }
    }

    /// Index chunks, committing once at the end
    pub fn index_chunks(&self, chunks: &[KnowledgeChunk]) -> Result<(), RetrievalError> {
        let mut writer = self.writer.write();
        let writer = writer
            .as_mut()
            .ok_or_else(|| RetrievalError::Index("writer not available".to_string()))?;

        for chunk in chunks {
            let mut doc = TantivyDocument::default();
            doc.add_text(self.id_field, &chunk.id);
            doc.add_text(self.text_field, &chunk.text);
            if let Some(ref citation) = chunk.tags.citation {
                doc.add_text(self.citation_field, citation);
            }
            writer
                .add_document(doc)
                .map_err(|e| RetrievalError::Index(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        Ok(())
    }

    /// BM25 search over chunk text and citations
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<LexicalResult>, RetrievalError> {
        let searcher = self.reader.searcher();
        let query_parser =
            QueryParser::for_index(&self.index, vec![self.text_field, self.citation_field]);

        // Lenient parse: transaction descriptions contain arbitrary
        // punctuation that must not fail the whole search
        let (parsed, _errors) = query_parser.parse_query_lenient(query);

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(top_k))
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| RetrievalError::Search(e.to_string()))?;

            let id = doc
                .get_first(self.id_field)
                .and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .unwrap_or("")
                .to_string();

            results.push(LexicalResult {
                chunk_id: id,
                score,
            });
        }

        Ok(results)
    }

    /// Delete chunks by id (used when a document is retracted)
    pub fn delete(&self, chunk_ids: &[String]) -> Result<(), RetrievalError> {
        let mut writer = self.writer.write();
        let writer = writer
            .as_mut()
            .ok_or_else(|| RetrievalError::Index("writer not available".to_string()))?;

        for id in chunk_ids {
            let term = tantivy::Term::from_field_text(self.id_field, id);
            writer.delete_term(term);
        }

        writer
            .commit()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;
        self.reader
            .reload()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        Ok(())
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use taxlens_core::ChunkTags;

    fn chunk(id: &str, text: &str, citation: Option<&str>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            position: 0,
            text: text.to_string(),
            embedding: None,
            lexically_indexed: true,
            tags: ChunkTags {
                citation: citation.map(|s| s.to_string()),
                ..Default::default()
            },
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn empty_index_has_no_docs() {
        let index = LexicalIndex::new(LexicalConfig::default()).unwrap();
        assert_eq!(index.doc_count(), 0);
    }

    #[test]
    fn index_and_search() {
        let index = LexicalIndex::new(LexicalConfig::default()).unwrap();
        index
            .index_chunks(&[
                chunk(
                    "1",
                    "Machinery used directly in manufacturing is exempt from sales tax",
                    Some("Rev. Code 82.08.02565"),
                ),
                chunk("2", "Prepared food is subject to sales tax", None),
            ])
            .unwrap();

        let results = index.search("manufacturing machinery exemption", 10).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk_id, "1");
    }

    #[test]
    fn punctuation_heavy_query_does_not_error() {
        let index = LexicalIndex::new(LexicalConfig::default()).unwrap();
        index
            .index_chunks(&[chunk("1", "cloud software subscription", None)])
            .unwrap();

        let results = index
            .search("SaaS (cloud!) \"software\" subscription: 12-mo", 10)
            .unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn delete_removes_chunk() {
        let index = LexicalIndex::new(LexicalConfig::default()).unwrap();
        index
            .index_chunks(&[chunk("1", "exempt machinery", None)])
            .unwrap();
        assert_eq!(index.doc_count(), 1);

        index.delete(&["1".to_string()]).unwrap();
        assert_eq!(index.doc_count(), 0);
    }

    #[test]
    fn on_disk_index_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = LexicalConfig {
            index_path: Some(dir.path().to_string_lossy().to_string()),
            stemming: true,
        };
        let index = LexicalIndex::new(config).unwrap();
        index
            .index_chunks(&[chunk("1", "out-of-state service", None)])
            .unwrap();
        assert_eq!(index.doc_count(), 1);
    }
}
