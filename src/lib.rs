//! # docqa
//!
//! Question answering over a private document corpus: hybrid retrieval
//! (BM25 + embeddings) feeding a streaming generation endpoint, with full
//! provenance for every answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────────┐
//! │  Corpus  │──▶│  Ingestion    │──▶│  SQLite + indexes  │
//! │ docx/pdf │   │ chunk+embed  │   │ chunks, vectors   │
//! └──────────┘   └──────────────┘   └─────────┬─────────┘
//!                                             │
//!                         ┌───────────────────┤
//!                         ▼                   ▼
//!                   ┌──────────┐        ┌──────────┐
//!                   │   CLI    │        │   HTTP   │
//!                   │ (docqa)  │        │  (axum)  │
//!                   └──────────┘        └──────────┘
//! ```
//!
//! ## Query flow
//!
//! A question is matched against the active chunk set by both a BM25 index
//! and a cosine-similarity vector index; the two candidate lists are
//! normalized and fused into one ranking. The top chunks are joined into a
//! prompt, the prompt is streamed through an OpenAI-compatible chat
//! endpoint, and the whole interaction (prompt, cited chunk ids, answer,
//! terminal status) is persisted as a query record.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Corpus directory scanning |
//! | [`extract`] | Text extraction (docx, pdf, plain text) |
//! | [`chunker`] | Boundary-aware overlapping chunking |
//! | [`embedding`] | Embedding providers behind the `Embedder` trait |
//! | [`lexical`] | BM25 index |
//! | [`vector`] | Embedding index with on-disk persistence |
//! | [`retriever`] | Hybrid score fusion |
//! | [`context`] | Context and prompt assembly |
//! | [`generation`] | Streaming generation client |
//! | [`snapshot`] | Atomic index snapshot publication |
//! | [`ingest`] | Ingestion pipeline |
//! | [`pipeline`] | Query pipeline |
//! | [`store`] | Chunk and query-record persistence |
//! | [`db`] | SQLite pool setup |
//! | [`migrate`] | Schema migrations |
//! | [`server`] | HTTP API |

pub mod chunker;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod lexical;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod vector;
