//! Query pipeline: retrieve, assemble, generate, persist.
//!
//! Every question produces exactly one persisted query record, whatever the
//! outcome. The record carries the finished prompt, the cited chunk ids in
//! rank order, the answer (partial answers included), and a terminal status.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::context;
use crate::embedding::{self, Embedder};
use crate::generation::{GenerationClient, GenerationState};
use crate::models::{Chunk, Citation, QueryStatus};
use crate::retriever;
use crate::snapshot::{IndexSnapshot, SnapshotStore};
use crate::store;

/// A chunk selected for context, with its fused relevance score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Runs hybrid retrieval against the current snapshot.
///
/// When embeddings are unavailable, or query embedding fails, retrieval
/// degrades to lexical-only rather than failing the whole query.
pub async fn retrieve(
    snapshot: &Arc<IndexSnapshot>,
    embedder: Option<&Arc<dyn Embedder>>,
    config: &Config,
    question: &str,
) -> Vec<RetrievedChunk> {
    let candidate_k = config.retrieval.candidate_k;
    let lexical_hits = snapshot.lexical.search(question, candidate_k);

    let vector_hits = match (embedder, &snapshot.vector) {
        (Some(embedder), Some(_)) => {
            match embedding::embed_query(embedder.as_ref(), question).await {
                Ok(query_vec) => {
                    // Scoring is a dense scan; keep it off the async runtime.
                    let snap = snapshot.clone();
                    tokio::task::spawn_blocking(move || {
                        snap.vector
                            .as_ref()
                            .map(|v| v.search(&query_vec, candidate_k))
                            .unwrap_or_default()
                    })
                    .await
                    .unwrap_or_default()
                }
                Err(e) => {
                    warn!(error = %e, "query embedding failed, falling back to lexical-only");
                    Vec::new()
                }
            }
        }
        _ => Vec::new(),
    };

    let ranked = retriever::fuse(
        &lexical_hits,
        &vector_hits,
        config.retrieval.hybrid_weight,
        config.retrieval.top_k,
    );

    ranked
        .into_iter()
        .filter_map(|hit| {
            snapshot
                .chunk_by_ordinal(hit.ordinal)
                .map(|chunk| RetrievedChunk {
                    chunk: chunk.clone(),
                    score: hit.score,
                })
        })
        .collect()
}

/// Terminal result of one answered question.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub record_id: String,
    pub answer: String,
    pub status: QueryStatus,
    pub error: Option<String>,
    pub citations: Vec<Citation>,
    pub duration_ms: i64,
}

/// Progress events emitted while a question is being answered: the citation
/// block first, then tokens as they arrive, then exactly one `Done`.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    Citations(Vec<Citation>),
    Token(String),
    Done {
        record_id: String,
        status: QueryStatus,
        error: Option<String>,
    },
}

/// Maps a generation terminal state to a query status. A failed or timed
/// out run that produced text is a partial answer, not a total error; a
/// completed run that produced nothing is an error, never an empty success.
fn status_for(state: GenerationState, answer: &str) -> QueryStatus {
    match state {
        GenerationState::Completed if !answer.is_empty() => QueryStatus::Success,
        _ if !answer.is_empty() => QueryStatus::Partial,
        _ => QueryStatus::Error,
    }
}

/// Sends an event without failing the query when the listener went away.
/// A disconnected caller never stops the run; the record still gets
/// persisted with whatever arrived.
async fn emit(events: Option<&mpsc::Sender<QueryEvent>>, event: QueryEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

/// Answers one question end to end and persists the query record.
///
/// With an event sender, progress is streamed as [`QueryEvent`]s; the
/// outcome is returned either way and the record is persisted regardless of
/// whether the receiver stays around.
pub async fn answer_question(
    pool: &SqlitePool,
    config: &Config,
    embedder: Option<&Arc<dyn Embedder>>,
    snapshots: &SnapshotStore,
    client: &GenerationClient,
    question: &str,
    events: Option<mpsc::Sender<QueryEvent>>,
) -> Result<AnswerOutcome> {
    let started = Instant::now();
    let mut record = store::new_query_record(question);
    let snapshot = snapshots.current();

    if snapshot.is_empty() {
        let message = "No documents have been ingested; the corpus is empty".to_string();
        record.status = QueryStatus::Error;
        record.error = Some(message.clone());
        record.duration_ms = started.elapsed().as_millis() as i64;
        let record_id = store::insert_query_record(pool, &record).await?;
        emit(
            events.as_ref(),
            QueryEvent::Done {
                record_id: record_id.clone(),
                status: QueryStatus::Error,
                error: Some(message.clone()),
            },
        )
        .await;
        return Ok(AnswerOutcome {
            record_id,
            answer: String::new(),
            status: QueryStatus::Error,
            error: Some(message),
            citations: Vec::new(),
            duration_ms: record.duration_ms,
        });
    }

    let retrieved = retrieve(&snapshot, embedder, config, question).await;
    let citations: Vec<Citation> = retrieved
        .iter()
        .map(|r| Citation {
            title: r.chunk.document_title.clone(),
            content: r.chunk.content.clone(),
            relevance_score: r.score,
            metadata: r.chunk.metadata.clone(),
        })
        .collect();
    emit(events.as_ref(), QueryEvent::Citations(citations.clone())).await;

    let chunk_refs: Vec<&Chunk> = retrieved.iter().map(|r| &r.chunk).collect();
    let context_text = context::assemble_context(&chunk_refs);
    let prompt = context::build_prompt(
        config.generation.prompt_template.as_deref(),
        &context_text,
        question,
    );

    record.prompt = Some(prompt.clone());
    record.chunk_ids = retrieved.iter().map(|r| r.chunk.id.clone()).collect();

    // Bridge raw tokens into the event stream.
    let (token_tx, forwarder) = match &events {
        Some(tx) => {
            let (token_tx, mut token_rx) = mpsc::channel::<String>(32);
            let tx = tx.clone();
            let handle = tokio::spawn(async move {
                while let Some(token) = token_rx.recv().await {
                    if tx.send(QueryEvent::Token(token)).await.is_err() {
                        break;
                    }
                }
            });
            (Some(token_tx), Some(handle))
        }
        None => (None, None),
    };

    let outcome = client.generate(&prompt, token_tx).await;
    if let Some(handle) = forwarder {
        let _ = handle.await;
    }
    let status = status_for(outcome.state, &outcome.answer);
    let error = match (&outcome.error, status) {
        (None, QueryStatus::Error) => Some("Generation produced no output".to_string()),
        _ => outcome.error.clone(),
    };

    record.answer = if outcome.answer.is_empty() {
        None
    } else {
        Some(outcome.answer.clone())
    };
    record.status = status;
    record.error = error.clone();
    record.duration_ms = started.elapsed().as_millis() as i64;

    let record_id = store::insert_query_record(pool, &record).await?;
    info!(
        record_id = %record_id,
        status = status.as_str(),
        chunks = record.chunk_ids.len(),
        duration_ms = record.duration_ms,
        "query answered"
    );

    emit(
        events.as_ref(),
        QueryEvent::Done {
            record_id: record_id.clone(),
            status,
            error: error.clone(),
        },
    )
    .await;

    Ok(AnswerOutcome {
        record_id,
        answer: outcome.answer,
        status,
        error,
        citations,
        duration_ms: record.duration_ms,
    })
}
