//! Chunk store and query-record persistence.
//!
//! The chunk store is the single source of truth for chunk content and the
//! only writer of chunk status. Each ingestion pass marks every `active`
//! chunk `superseded` before inserting the new generation inside one
//! transaction, so no reader ever observes a mixed corpus.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    metadata_from_json_str, Chunk, ChunkStatus, LoadedDocument, QueryRecord, QueryStatus,
};

/// Returns the next chunk generation number (1 for a fresh database).
pub async fn next_generation(pool: &SqlitePool) -> Result<i64> {
    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(generation) FROM chunks")
        .fetch_one(pool)
        .await?;
    Ok(current.unwrap_or(0) + 1)
}

/// Supersedes the previous generation and inserts the new one atomically.
pub async fn replace_generation(pool: &SqlitePool, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    // Mark before insert: the invariant is that every chunk of a prior
    // generation is superseded before any new chunk becomes visible.
    sqlx::query("UPDATE chunks SET status = 'superseded' WHERE status = 'active'")
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks
                (id, content, document_title, file_path, file_hash, ordinal,
                 total_chunks, generation, status, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.content)
        .bind(&chunk.document_title)
        .bind(&chunk.file_path)
        .bind(&chunk.file_hash)
        .bind(chunk.ordinal)
        .bind(chunk.total_chunks)
        .bind(chunk.generation)
        .bind(chunk.status.as_str())
        .bind(serde_json::to_string(&chunk.metadata)?)
        .bind(chunk.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Upserts document records for the current corpus snapshot.
pub async fn upsert_documents(pool: &SqlitePool, documents: &[LoadedDocument]) -> Result<()> {
    let now = Utc::now().timestamp();
    for doc in documents {
        sqlx::query(
            r#"
            INSERT INTO documents (file_path, title, byte_size, content_hash, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                title = excluded.title,
                byte_size = excluded.byte_size,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.file_path)
        .bind(&doc.title)
        .bind(doc.byte_size as i64)
        .bind(&doc.content_hash)
        .bind(now)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Returns true when every document's content hash matches the stored one
/// and no stored document is missing from the batch; lets ingestion skip
/// re-embedding an unchanged corpus.
pub async fn corpus_unchanged(pool: &SqlitePool, documents: &[LoadedDocument]) -> Result<bool> {
    let rows = sqlx::query("SELECT file_path, content_hash FROM documents")
        .fetch_all(pool)
        .await?;
    if rows.len() != documents.len() {
        return Ok(false);
    }
    for doc in documents {
        let matched = rows.iter().any(|row| {
            let path: String = row.get("file_path");
            let hash: String = row.get("content_hash");
            path == doc.file_path && hash == doc.content_hash
        });
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Loads all `active` chunks ordered by ordinal.
pub async fn active_chunks(pool: &SqlitePool) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        r#"
        SELECT id, content, document_title, file_path, file_hash, ordinal,
               total_chunks, generation, status, metadata_json, created_at
        FROM chunks
        WHERE status = 'active'
        ORDER BY ordinal
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_chunk).collect())
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let status_raw: String = row.get("status");
    let metadata_raw: String = row.get("metadata_json");
    Chunk {
        id: row.get("id"),
        content: row.get("content"),
        document_title: row.get("document_title"),
        file_path: row.get("file_path"),
        file_hash: row.get("file_hash"),
        ordinal: row.get("ordinal"),
        total_chunks: row.get("total_chunks"),
        generation: row.get("generation"),
        status: ChunkStatus::parse(&status_raw).unwrap_or(ChunkStatus::Superseded),
        metadata: metadata_from_json_str(&metadata_raw),
        created_at: row.get("created_at"),
    }
}

/// Filters a list of chunk ids down to those that actually exist.
pub async fn resolve_chunk_ids(pool: &SqlitePool, ids: &[String]) -> Result<Vec<String>> {
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        if exists {
            resolved.push(id.clone());
        }
    }
    Ok(resolved)
}

/// Persists a query record plus its chunk links.
///
/// Chunk ids that no longer resolve are logged and skipped; a bookkeeping
/// mismatch must never drop the answer itself. Returns the record id.
pub async fn insert_query_record(pool: &SqlitePool, record: &QueryRecord) -> Result<String> {
    sqlx::query(
        r#"
        INSERT INTO query_records
            (id, question, prompt, answer, duration_ms, status, error, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.question)
    .bind(&record.prompt)
    .bind(&record.answer)
    .bind(record.duration_ms)
    .bind(record.status.as_str())
    .bind(&record.error)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    let resolved = resolve_chunk_ids(pool, &record.chunk_ids).await?;
    if resolved.len() < record.chunk_ids.len() {
        let missing: Vec<&String> = record
            .chunk_ids
            .iter()
            .filter(|id| !resolved.contains(id))
            .collect();
        warn!(
            record_id = %record.id,
            ?missing,
            "some cited chunk ids no longer resolve; persisting record without them"
        );
    }

    for (rank, chunk_id) in record
        .chunk_ids
        .iter()
        .filter(|id| resolved.contains(id))
        .enumerate()
    {
        sqlx::query(
            "INSERT INTO query_record_chunks (query_record_id, chunk_id, rank) VALUES (?, ?, ?)",
        )
        .bind(&record.id)
        .bind(chunk_id)
        .bind(rank as i64)
        .execute(pool)
        .await?;
    }

    Ok(record.id.clone())
}

/// Builds a fresh query record with a new id and current timestamp.
pub fn new_query_record(question: &str) -> QueryRecord {
    QueryRecord {
        id: Uuid::new_v4().to_string(),
        question: question.to_string(),
        prompt: None,
        answer: None,
        duration_ms: 0,
        status: QueryStatus::Error,
        error: None,
        chunk_ids: Vec::new(),
        created_at: Utc::now().timestamp(),
    }
}

/// Corpus statistics for the stats surfaces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CorpusStats {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub total_bytes: i64,
    pub generation: i64,
    pub last_ingested_at: Option<i64>,
}

pub async fn corpus_stats(pool: &SqlitePool) -> Result<CorpusStats> {
    let total_documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let total_bytes: Option<i64> = sqlx::query_scalar("SELECT SUM(byte_size) FROM documents")
        .fetch_one(pool)
        .await?;
    let total_chunks: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE status = 'active'")
            .fetch_one(pool)
            .await?;
    let generation: Option<i64> = sqlx::query_scalar("SELECT MAX(generation) FROM chunks")
        .fetch_one(pool)
        .await?;
    let last_ingested_at: Option<i64> =
        sqlx::query_scalar("SELECT MAX(created_at) FROM chunks WHERE status = 'active'")
            .fetch_one(pool)
            .await?;

    Ok(CorpusStats {
        total_documents,
        total_chunks,
        total_bytes: total_bytes.unwrap_or(0),
        generation: generation.unwrap_or(0),
        last_ingested_at,
    })
}
