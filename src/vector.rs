//! In-memory vector index with flat on-disk persistence.
//!
//! Storage layout under the configured index directory:
//! - `manifest.json`: embedding model tag, dimensionality, generation, and
//!   the ordinal of each stored vector, in storage order.
//! - `vectors.bin`: `count * dims` little-endian f32 values, densely packed
//!   in manifest order.
//!
//! Both files are written together and must load together. A directory with
//! only one of the two, or a manifest whose model tag differs from the
//! configured embedder, fails loudly so the caller rebuilds from source
//! instead of serving stale or mismatched vectors. An index with zero
//! vectors is valid and simply returns no results.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::models::Chunk;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    model: String,
    dims: usize,
    generation: i64,
    ordinals: Vec<i64>,
}

#[derive(Debug)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    generation: i64,
    ordinals: Vec<i64>,
    /// Flat row-major storage, one `dims`-length row per ordinal.
    vectors: Vec<f32>,
}

/// A scored hit: chunk ordinal plus cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub ordinal: i64,
    pub score: f64,
}

impl VectorIndex {
    pub fn empty(model: &str, dims: usize, generation: i64) -> Self {
        Self {
            model: model.to_string(),
            dims,
            generation,
            ordinals: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Embeds every chunk and builds a fresh index. Batches requests per the
    /// embedder config; any batch failure aborts the build.
    pub async fn build(
        embedder: &dyn Embedder,
        chunks: &[Chunk],
        generation: i64,
        batch_size: usize,
    ) -> Result<Self> {
        let mut index = Self::empty(embedder.model_name(), embedder.dims(), generation);
        if chunks.is_empty() {
            return Ok(index);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch_size = batch_size.max(1);

        for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
            let embeddings = embedder
                .embed(batch)
                .await
                .with_context(|| format!("Failed to embed batch {}", batch_idx))?;
            if embeddings.len() != batch.len() {
                bail!(
                    "Embedding count mismatch: sent {} texts, got {} vectors",
                    batch.len(),
                    embeddings.len()
                );
            }
            for (offset, vec) in embeddings.into_iter().enumerate() {
                if vec.len() != index.dims {
                    bail!(
                        "Embedding dimension mismatch: expected {}, got {}",
                        index.dims,
                        vec.len()
                    );
                }
                let chunk = &chunks[batch_idx * batch_size + offset];
                index.ordinals.push(chunk.ordinal);
                index.vectors.extend_from_slice(&vec);
            }
        }

        info!(
            vectors = index.ordinals.len(),
            model = %index.model,
            "vector index built"
        );
        Ok(index)
    }

    /// Nearest neighbors by cosine similarity, descending, ties broken by
    /// ascending ordinal. Empty index yields no results.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        if self.ordinals.is_empty() || query.len() != self.dims {
            return Vec::new();
        }

        let mut hits: Vec<VectorHit> = self
            .ordinals
            .iter()
            .enumerate()
            .map(|(i, &ordinal)| {
                let row = &self.vectors[i * self.dims..(i + 1) * self.dims];
                VectorHit {
                    ordinal,
                    score: cosine_similarity(query, row) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        hits.truncate(k);
        hits
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// Writes manifest and vectors to `dir`, replacing any prior index.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;

        let manifest = Manifest {
            model: self.model.clone(),
            dims: self.dims,
            generation: self.generation,
            ordinals: self.ordinals.clone(),
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(dir.join(MANIFEST_FILE), manifest_json)
            .with_context(|| "Failed to write vector index manifest")?;
        std::fs::write(dir.join(VECTORS_FILE), vec_to_blob(&self.vectors))
            .with_context(|| "Failed to write vector data")?;

        info!(dir = %dir.display(), vectors = self.ordinals.len(), "vector index saved");
        Ok(())
    }

    /// Loads a previously saved index.
    ///
    /// Returns `Ok(None)` when neither file exists (no index has been built
    /// yet). Fails when only one file is present, when the stored model tag
    /// or dimensionality differs from the given embedder, or when the vector
    /// file length disagrees with the manifest. Callers recover from those
    /// failures by rebuilding from source documents.
    pub fn load(dir: &Path, embedder: &dyn Embedder) -> Result<Option<Self>> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let vectors_path = dir.join(VECTORS_FILE);

        match (manifest_path.exists(), vectors_path.exists()) {
            (false, false) => return Ok(None),
            (true, true) => {}
            (have_manifest, _) => {
                let missing = if have_manifest {
                    VECTORS_FILE
                } else {
                    MANIFEST_FILE
                };
                bail!(
                    "Vector index at {} is incomplete: {} is missing. \
                     Rebuild the index from source documents.",
                    dir.display(),
                    missing
                );
            }
        }

        let manifest_json = std::fs::read_to_string(&manifest_path)
            .with_context(|| "Failed to read vector index manifest")?;
        let manifest: Manifest = serde_json::from_str(&manifest_json)
            .with_context(|| "Failed to parse vector index manifest")?;

        if manifest.model != embedder.model_name() {
            bail!(
                "Vector index was built with embedding model '{}' but '{}' is configured. \
                 Rebuild the index from source documents.",
                manifest.model,
                embedder.model_name()
            );
        }
        if manifest.dims != embedder.dims() {
            bail!(
                "Vector index dimensionality {} does not match configured {}",
                manifest.dims,
                embedder.dims()
            );
        }

        let blob = std::fs::read(&vectors_path).with_context(|| "Failed to read vector data")?;
        let expected_bytes = manifest.ordinals.len() * manifest.dims * 4;
        if blob.len() != expected_bytes {
            bail!(
                "Vector data is corrupt: expected {} bytes, found {}. \
                 Rebuild the index from source documents.",
                expected_bytes,
                blob.len()
            );
        }

        let index = Self {
            model: manifest.model,
            dims: manifest.dims,
            generation: manifest.generation,
            ordinals: manifest.ordinals,
            vectors: blob_to_vec(&blob),
        };
        if index.is_empty() {
            warn!(dir = %dir.display(), "loaded vector index contains zero vectors");
        }
        Ok(Some(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::HashEmbedder;
    use crate::models::{ChunkMetadata, ChunkStatus};

    fn chunk(ordinal: i64, content: &str) -> Chunk {
        Chunk {
            id: format!("chunk-{}", ordinal),
            content: content.to_string(),
            document_title: "doc".to_string(),
            file_path: "/docs/doc.txt".to_string(),
            file_hash: "hash".to_string(),
            ordinal,
            total_chunks: 2,
            generation: 1,
            status: ChunkStatus::Active,
            metadata: ChunkMetadata::new(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let embedder = HashEmbedder::new(64);
        let chunks = vec![
            chunk(1, "termination of the agreement requires written notice"),
            chunk(2, "quarterly payments are due on the first business day"),
        ];
        let index = VectorIndex::build(&embedder, &chunks, 1, 16).await.unwrap();
        assert_eq!(index.len(), 2);

        let query = crate::embedding::embed_query(&embedder, "agreement termination notice")
            .await
            .unwrap();
        let hits = index.search(&query, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].ordinal, 1);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_empty_index_is_valid() {
        let embedder = HashEmbedder::new(16);
        let index = VectorIndex::build(&embedder, &[], 1, 16).await.unwrap();
        assert!(index.is_empty());
        assert!(index.search(&vec![0.0; 16], 5).is_empty());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let embedder = HashEmbedder::new(32);
        let chunks = vec![chunk(1, "alpha beta gamma"), chunk(2, "delta epsilon zeta")];
        let index = VectorIndex::build(&embedder, &chunks, 7, 16).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        index.save(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), &embedder).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.generation(), 7);
        assert_eq!(loaded.model(), "hash-trigram-test");

        let query = crate::embedding::embed_query(&embedder, "alpha beta")
            .await
            .unwrap();
        assert_eq!(index.search(&query, 2), loaded.search(&query, 2));
    }

    #[test]
    fn test_missing_index_loads_as_none() {
        let embedder = HashEmbedder::new(32);
        let dir = tempfile::tempdir().unwrap();
        assert!(VectorIndex::load(dir.path(), &embedder).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_index_fails_loudly() {
        let embedder = HashEmbedder::new(32);
        let chunks = vec![chunk(1, "some content")];
        let index = VectorIndex::build(&embedder, &chunks, 1, 16).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        index.save(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(VECTORS_FILE)).unwrap();

        let err = VectorIndex::load(dir.path(), &embedder).unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }

    #[tokio::test]
    async fn test_model_mismatch_fails_loudly() {
        let embedder = HashEmbedder::new(32);
        let chunks = vec![chunk(1, "some content")];
        let index = VectorIndex::build(&embedder, &chunks, 1, 16).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        index.save(dir.path()).unwrap();

        // Tamper with the stored model tag.
        let manifest_path = dir.path().join(MANIFEST_FILE);
        let tampered = std::fs::read_to_string(&manifest_path)
            .unwrap()
            .replace("hash-trigram-test", "some-other-model");
        std::fs::write(&manifest_path, tampered).unwrap();

        let err = VectorIndex::load(dir.path(), &embedder).unwrap_err();
        assert!(err.to_string().contains("some-other-model"));
    }

    #[tokio::test]
    async fn test_corrupt_vector_data_fails_loudly() {
        let embedder = HashEmbedder::new(32);
        let chunks = vec![chunk(1, "some content")];
        let index = VectorIndex::build(&embedder, &chunks, 1, 16).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        index.save(dir.path()).unwrap();
        std::fs::write(dir.path().join(VECTORS_FILE), b"short").unwrap();

        let err = VectorIndex::load(dir.path(), &embedder).unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }
}
