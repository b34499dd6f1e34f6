//! Core data types flowing through the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A source document after loading and text extraction, before chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub title: String,
    pub file_path: String,
    pub byte_size: u64,
    /// SHA-256 of the extracted text; stable identity across re-ingestion.
    pub content_hash: String,
    pub text: String,
}

/// Lifecycle status of a chunk.
///
/// Chunks of a prior ingestion generation are marked superseded, never
/// deleted, so historical query records keep resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Active,
    Superseded,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Active => "active",
            ChunkStatus::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ChunkStatus::Active),
            "superseded" => Some(ChunkStatus::Superseded),
            _ => None,
        }
    }
}

/// A contiguous slice of a document's text; the atomic unit of retrieval.
///
/// `ordinal` is global across the whole corpus generation (1..=total_chunks),
/// assigned after every document in the batch has been split.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub document_title: String,
    pub file_path: String,
    pub file_hash: String,
    pub ordinal: i64,
    pub total_chunks: i64,
    pub generation: i64,
    pub status: ChunkStatus,
    pub metadata: ChunkMetadata,
    pub created_at: i64,
}

/// Strict chunk-metadata value: anything outside this shape is rejected at
/// the ingestion boundary so persisted metadata stays JSON-serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Map(BTreeMap<String, MetadataValue>),
}

pub type ChunkMetadata = BTreeMap<String, MetadataValue>;

impl MetadataValue {
    /// Converts an arbitrary JSON value into the strict metadata schema.
    /// Arrays and other unsupported shapes are stringified rather than kept.
    pub fn from_json(value: serde_json::Value) -> MetadataValue {
        match value {
            serde_json::Value::Null => MetadataValue::Null,
            serde_json::Value::Bool(b) => MetadataValue::Bool(b),
            serde_json::Value::Number(n) => MetadataValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => MetadataValue::String(s),
            serde_json::Value::Object(map) => MetadataValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, MetadataValue::from_json(v)))
                    .collect(),
            ),
            other => MetadataValue::String(other.to_string()),
        }
    }
}

/// Parses a persisted metadata JSON string into the strict schema.
pub fn metadata_from_json_str(raw: &str) -> ChunkMetadata {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| (k, MetadataValue::from_json(v)))
            .collect(),
        _ => ChunkMetadata::new(),
    }
}

/// Terminal status of a query record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Success,
    Partial,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Success => "success",
            QueryStatus::Partial => "partial",
            QueryStatus::Error => "error",
        }
    }
}

/// One user interaction, persisted for citation and auditing.
///
/// `prompt` is the finished prompt string sent to the generation endpoint;
/// it is a first-class artifact so generation inputs stay reproducible.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub id: String,
    pub question: String,
    pub prompt: Option<String>,
    pub answer: Option<String>,
    pub duration_ms: i64,
    pub status: QueryStatus,
    pub error: Option<String>,
    /// Chunk ids used as context, in retrieval-rank order.
    pub chunk_ids: Vec<String>,
    pub created_at: i64,
}

/// A citation returned to the caller alongside an answer.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub title: String,
    pub content: String,
    pub relevance_score: f64,
    pub metadata: ChunkMetadata,
}
