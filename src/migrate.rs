use anyhow::Result;
use sqlx::SqlitePool;

/// Creates the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Source documents, keyed by path; content_hash detects unchanged files
    // across ingestion passes.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            file_path TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            byte_size INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunks are immutable once created; prior generations are marked
    // superseded, never deleted, so historical query records keep resolving.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            document_title TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            generation INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_records (
            id TEXT PRIMARY KEY,
            question TEXT NOT NULL,
            prompt TEXT,
            answer TEXT,
            duration_ms INTEGER NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_record_chunks (
            query_record_id TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            rank INTEGER NOT NULL,
            PRIMARY KEY (query_record_id, chunk_id),
            FOREIGN KEY (query_record_id) REFERENCES query_records(id),
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_status ON chunks(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_generation ON chunks(generation)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_query_records_created_at ON query_records(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
