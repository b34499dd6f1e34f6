//! BM25 lexical index over the active chunk set.
//!
//! The index is rebuilt wholesale from the active generation on every
//! ingestion pass; there is no incremental maintenance. Documents are keyed
//! by chunk ordinal, which is unique within a generation and maps back to
//! the chunk list held by the surrounding snapshot.

use bm25::{Document, Language, SearchEngineBuilder};

use crate::models::Chunk;

pub struct LexicalIndex {
    engine: bm25::SearchEngine<u64>,
    len: usize,
}

/// A scored hit: the chunk's global ordinal plus its raw BM25 score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub ordinal: i64,
    pub score: f64,
}

impl LexicalIndex {
    /// Builds the index from scratch over the given chunks.
    pub fn build(chunks: &[Chunk]) -> Self {
        let docs: Vec<Document<u64>> = chunks
            .iter()
            .map(|chunk| Document {
                id: chunk.ordinal as u64,
                contents: chunk.content.clone(),
            })
            .collect();
        let len = docs.len();
        let engine = SearchEngineBuilder::<u64>::with_documents(Language::English, docs).build();
        Self { engine, len }
    }

    pub fn empty() -> Self {
        let docs: Vec<Document<u64>> = Vec::new();
        let engine = SearchEngineBuilder::<u64>::with_documents(Language::English, docs).build();
        Self { engine, len: 0 }
    }

    /// Top-`k` chunks by BM25 score, descending. Raw scores; normalization
    /// happens at fusion time.
    pub fn search(&self, query: &str, k: usize) -> Vec<LexicalHit> {
        if self.len == 0 || query.trim().is_empty() {
            return Vec::new();
        }
        self.engine
            .search(query, k)
            .into_iter()
            .map(|result| LexicalHit {
                ordinal: result.document.id as i64,
                score: result.score as f64,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
