//! Immutable index snapshots with atomic publication.
//!
//! Queries never see a half-built index: ingestion builds a complete new
//! [`IndexSnapshot`] off to the side and swaps it in with one pointer store.
//! In-flight queries keep the `Arc` to the snapshot they started with.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::lexical::LexicalIndex;
use crate::models::Chunk;
use crate::vector::VectorIndex;

/// One consistent view of the active corpus generation: the chunks plus the
/// lexical and (optional) vector indexes built over exactly those chunks.
pub struct IndexSnapshot {
    pub generation: i64,
    /// Active chunks in ordinal order.
    pub chunks: Vec<Chunk>,
    ordinal_pos: HashMap<i64, usize>,
    pub lexical: LexicalIndex,
    pub vector: Option<VectorIndex>,
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            chunks: Vec::new(),
            ordinal_pos: HashMap::new(),
            lexical: LexicalIndex::empty(),
            vector: None,
        }
    }

    /// Assembles a snapshot from active chunks and a pre-built vector index.
    /// The lexical index is always rebuilt here, wholesale.
    pub fn build(chunks: Vec<Chunk>, vector: Option<VectorIndex>, generation: i64) -> Self {
        let lexical = LexicalIndex::build(&chunks);
        let ordinal_pos = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.ordinal, i))
            .collect();
        Self {
            generation,
            chunks,
            ordinal_pos,
            lexical,
            vector,
        }
    }

    pub fn chunk_by_ordinal(&self, ordinal: i64) -> Option<&Chunk> {
        self.ordinal_pos.get(&ordinal).map(|&i| &self.chunks[i])
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Shared handle to the currently published snapshot.
pub struct SnapshotStore {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SnapshotStore {
    pub fn new(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot as of this call; later publishes do not affect it.
    pub fn current(&self) -> Arc<IndexSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Atomically replaces the published snapshot.
    pub fn publish(&self, snapshot: IndexSnapshot) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(snapshot);
    }
}
