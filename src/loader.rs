//! Document source: scans the configured corpus directory and produces
//! [`LoadedDocument`]s with extracted text and content hashes.
//!
//! Unreadable or empty documents are logged and skipped; partial ingestion
//! success is the norm.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::DocsConfig;
use crate::extract;
use crate::models::LoadedDocument;

pub fn load_documents(docs: &DocsConfig) -> Result<Vec<LoadedDocument>> {
    let root = &docs.root;
    if !root.exists() {
        bail!("Document root does not exist: {}", root.display());
    }

    let include_set = build_globset(&docs.include_globs)?;
    let exclude_set = build_globset(&docs.exclude_globs)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match load_one(path) {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => {
                warn!(path = %path.display(), "document has no extractable text, skipping");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load document, skipping");
            }
        }
    }

    // Sort for deterministic ordering across ingestion passes
    documents.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    Ok(documents)
}

/// Loads a single file. Returns `Ok(None)` when the extracted text is empty
/// or whitespace-only; such documents produce zero chunks.
fn load_one(path: &Path) -> Result<Option<LoadedDocument>> {
    let bytes = std::fs::read(path)?;
    let byte_size = bytes.len() as u64;

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let text = extract::extract_text(&bytes, &extension)?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    let title = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Some(LoadedDocument {
        title,
        file_path: path.to_string_lossy().to_string(),
        byte_size,
        content_hash: content_hash(&text),
        text,
    }))
}

/// SHA-256 over the extracted text; detects changed files without
/// reprocessing unchanged ones.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
