//! Ingestion: load documents, chunk, persist, rebuild indexes, publish.
//!
//! The ordering matters. A pass builds the complete new state off to the
//! side (chunks, vector index) before touching the database, persists the
//! new generation in one transaction, saves the vector index, and only then
//! publishes the new snapshot. Queries running during a pass keep serving
//! the previous snapshot; nothing is ever served half-built.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chunker;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::loader;
use crate::snapshot::{IndexSnapshot, SnapshotStore};
use crate::store;
use crate::vector::VectorIndex;

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub generation: i64,
    /// True when the corpus was unchanged and the pass did nothing.
    pub skipped: bool,
}

/// Runs one full ingestion pass and publishes the resulting snapshot.
///
/// With `force` false, an unchanged corpus (same paths, same content
/// hashes) is skipped entirely; superseded history only grows when content
/// actually changed.
pub async fn ingest(
    pool: &SqlitePool,
    config: &Config,
    embedder: Option<&Arc<dyn Embedder>>,
    snapshots: &SnapshotStore,
    force: bool,
) -> Result<IngestReport> {
    let documents = loader::load_documents(&config.docs)?;
    info!(documents = documents.len(), "corpus scan complete");

    if !force && store::corpus_unchanged(pool, &documents).await? {
        let stats = store::corpus_stats(pool).await?;
        info!(generation = stats.generation, "corpus unchanged, skipping ingestion");
        return Ok(IngestReport {
            documents: documents.len(),
            chunks: stats.total_chunks as usize,
            generation: stats.generation,
            skipped: true,
        });
    }

    let generation = store::next_generation(pool).await?;
    let chunks = chunker::chunk_documents(&documents, &config.chunking, generation);
    info!(generation, chunks = chunks.len(), "chunking complete");

    // Embed before persisting so an embedding failure leaves the previous
    // generation fully intact.
    let vector = match embedder {
        Some(embedder) => Some(
            VectorIndex::build(
                embedder.as_ref(),
                &chunks,
                generation,
                config.embedding.batch_size,
            )
            .await
            .context("Vector index build failed; previous generation left untouched")?,
        ),
        None => None,
    };

    store::replace_generation(pool, &chunks).await?;
    store::upsert_documents(pool, &documents).await?;

    if let Some(index) = &vector {
        index.save(&config.embedding.index_dir)?;
    }

    let report = IngestReport {
        documents: documents.len(),
        chunks: chunks.len(),
        generation,
        skipped: false,
    };
    snapshots.publish(IndexSnapshot::build(chunks, vector, generation));
    info!(
        generation,
        chunks = report.chunks,
        documents = report.documents,
        "ingestion pass published"
    );
    Ok(report)
}

/// Rebuilds the in-memory snapshot from persisted state at startup.
///
/// The vector index is loaded from disk when present and matching; a
/// missing, partial, stale, or model-mismatched index is rebuilt from the
/// active chunks and re-saved. Load failures are loud but recoverable.
pub async fn restore_snapshot(
    pool: &SqlitePool,
    config: &Config,
    embedder: Option<&Arc<dyn Embedder>>,
    snapshots: &SnapshotStore,
) -> Result<()> {
    let chunks = store::active_chunks(pool).await?;
    let generation = chunks.first().map(|c| c.generation).unwrap_or(0);

    let vector = match embedder {
        None => None,
        Some(embedder) => {
            let loaded = match VectorIndex::load(&config.embedding.index_dir, embedder.as_ref()) {
                Ok(Some(index)) if index.generation() == generation => Some(index),
                Ok(Some(index)) => {
                    warn!(
                        on_disk = index.generation(),
                        active = generation,
                        "persisted vector index is for a different generation, rebuilding"
                    );
                    None
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "failed to load persisted vector index, rebuilding");
                    None
                }
            };
            match loaded {
                Some(index) => Some(index),
                None => {
                    let index = VectorIndex::build(
                        embedder.as_ref(),
                        &chunks,
                        generation,
                        config.embedding.batch_size,
                    )
                    .await?;
                    index.save(&config.embedding.index_dir)?;
                    Some(index)
                }
            }
        }
    };

    info!(
        generation,
        chunks = chunks.len(),
        vector = vector.is_some(),
        "snapshot restored"
    );
    snapshots.publish(IndexSnapshot::build(chunks, vector, generation));
    Ok(())
}
