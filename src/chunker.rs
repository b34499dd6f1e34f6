//! Boundary-aware overlapping text chunker.
//!
//! Splits document text into chunks of at most `chunk_size` characters with
//! an exact `overlap`-character overlap between consecutive chunks. Split
//! points prefer, in order: paragraph breaks (`\n\n`), line breaks (`\n`),
//! word breaks (space), and finally raw character cuts, so no information is
//! ever lost and output is deterministic for identical input and parameters.
//!
//! After every document in a batch has been split, [`chunk_documents`]
//! renumbers all chunks with a single global ascending sequence (1..=M) and
//! stamps each with the batch total, so ordinals always describe the live
//! corpus generation as a whole.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkMetadata, ChunkStatus, LoadedDocument};

/// Splits `text` into overlapping chunks of at most `chunk_size` characters.
///
/// `overlap` must be smaller than `chunk_size` (validated at config load).
/// All offsets are in characters, not bytes, so multi-byte scripts split
/// safely.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    split_spans(&chars, chunk_size, overlap)
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect())
        .collect()
}

/// Computes chunk spans as `(start, end)` character offsets.
///
/// Invariants: the first span starts at 0, the last span ends at the text
/// length, and every span after the first starts exactly `overlap`
/// characters before the previous span's end.
fn split_spans(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }
    if n <= chunk_size {
        return vec![(0, n)];
    }

    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + chunk_size).min(n);
        if window_end == n {
            spans.push((start, n));
            break;
        }

        let cut = find_cut(chars, start, window_end, start + overlap);
        spans.push((start, cut));
        start = cut - overlap;
    }

    spans
}

/// Picks the best split point in `(min_cut, window_end]`, preferring
/// paragraph breaks, then line breaks, then word breaks, then a raw cut at
/// the window edge. The cut lands just after the separator so separators
/// stay part of the preceding chunk.
fn find_cut(chars: &[char], start: usize, window_end: usize, min_cut: usize) -> usize {
    // Paragraph break: "\n\n" ending at p
    for p in (min_cut + 1..=window_end).rev() {
        if p >= start + 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n' {
            return p;
        }
    }
    // Line break
    for p in (min_cut + 1..=window_end).rev() {
        if chars[p - 1] == '\n' {
            return p;
        }
    }
    // Word break
    for p in (min_cut + 1..=window_end).rev() {
        if chars[p - 1] == ' ' {
            return p;
        }
    }
    // Raw character cut
    window_end
}

/// Splits every document in the batch, then renumbers the whole batch with
/// one ascending ordinal sequence starting at 1.
///
/// Documents whose text is empty or whitespace-only are logged and produce
/// zero chunks. Returns chunks stamped with the given generation, all
/// `active`.
pub fn chunk_documents(
    documents: &[LoadedDocument],
    config: &ChunkingConfig,
    generation: i64,
) -> Vec<Chunk> {
    let mut drafts: Vec<(usize, String)> = Vec::new();

    for (doc_idx, doc) in documents.iter().enumerate() {
        if doc.text.trim().is_empty() {
            warn!(title = %doc.title, "document text is empty, producing zero chunks");
            continue;
        }
        for piece in split_text(&doc.text, config.chunk_size, config.overlap) {
            drafts.push((doc_idx, piece));
        }
    }

    let total = drafts.len() as i64;
    let now = Utc::now().timestamp();

    drafts
        .into_iter()
        .enumerate()
        .map(|(i, (doc_idx, content))| {
            let doc = &documents[doc_idx];
            Chunk {
                id: Uuid::new_v4().to_string(),
                content,
                document_title: doc.title.clone(),
                file_path: doc.file_path.clone(),
                file_hash: doc.content_hash.clone(),
                ordinal: (i + 1) as i64,
                total_chunks: total,
                generation,
                status: ChunkStatus::Active,
                metadata: ChunkMetadata::new(),
                created_at: now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, text: &str) -> LoadedDocument {
        LoadedDocument {
            title: title.to_string(),
            file_path: format!("/docs/{}.txt", title),
            byte_size: text.len() as u64,
            content_hash: crate::loader::content_hash(text),
            text: text.to_string(),
        }
    }

    /// Removes the configured overlap from each chunk after the first and
    /// concatenates; must reconstruct the original text exactly.
    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("Hello, world!", 100, 10);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(split_text("", 100, 10).is_empty());
    }

    #[test]
    fn test_chunk_length_bounded() {
        let text = "word ".repeat(200);
        for chunk in split_text(&text, 50, 10) {
            assert!(chunk.chars().count() <= 50);
        }
    }

    #[test]
    fn test_coverage_reconstruction() {
        let cases = [
            ("Para one.\n\nPara two.\n\nPara three with more text.", 20, 5),
            ("a line\nanother line\nthird line\nfourth line", 15, 3),
            ("no boundaries at all just one long token stream", 12, 4),
            ("Clause 1. Payment terms.\n\nClause 2. Termination.", 30, 5),
        ];
        for (text, size, overlap) in cases {
            let chunks = split_text(text, size, overlap);
            assert_eq!(
                reconstruct(&chunks, overlap),
                text,
                "reconstruction failed for size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "First paragraph.\n\nSecond paragraph here.";
        let chunks = split_text(text, 25, 3);
        // The first cut should land just after the paragraph break.
        assert!(chunks[0].ends_with("\n\n"), "got {:?}", chunks[0]);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta.\n\nEpsilon zeta eta theta iota kappa.";
        assert_eq!(split_text(text, 20, 5), split_text(text, 20, 5));
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "Статья 1. Оплата услуг.\n\nСтатья 2. Расторжение договора.";
        let chunks = split_text(text, 30, 5);
        assert!(chunks.len() >= 2);
        assert_eq!(reconstruct(&chunks, 5), text);
    }

    #[test]
    fn test_two_clause_document_splits_on_paragraph() {
        let text = "Clause 1. Payment terms.\n\nClause 2. Termination.";
        let chunks = split_text(text, 30, 5);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30);
        }
        // Second chunk starts within the last 5 characters of the first.
        let first: Vec<char> = chunks[0].chars().collect();
        let tail: String = first[first.len() - 5..].iter().collect();
        assert!(chunks[1].starts_with(&tail));
    }

    #[test]
    fn test_global_renumbering() {
        let docs = vec![
            doc("one", &"alpha ".repeat(30)),
            doc("two", &"beta ".repeat(30)),
            doc("empty", "   "),
        ];
        let cfg = ChunkingConfig {
            chunk_size: 40,
            overlap: 8,
        };
        let chunks = chunk_documents(&docs, &cfg, 1);
        let m = chunks.len() as i64;
        assert!(m > 2);

        let ordinals: Vec<i64> = chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, (1..=m).collect::<Vec<i64>>());
        assert!(chunks.iter().all(|c| c.total_chunks == m));
        assert!(chunks.iter().all(|c| c.status == ChunkStatus::Active));
        // The empty document contributed nothing.
        assert!(chunks.iter().all(|c| c.document_title != "empty"));
    }

    #[test]
    fn test_renumbering_spans_documents_in_order() {
        let docs = vec![doc("a", "short one"), doc("b", "short two")];
        let cfg = ChunkingConfig {
            chunk_size: 100,
            overlap: 10,
        };
        let chunks = chunk_documents(&docs, &cfg, 3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].ordinal, 1);
        assert_eq!(chunks[0].document_title, "a");
        assert_eq!(chunks[1].ordinal, 2);
        assert_eq!(chunks[1].document_title, "b");
        assert!(chunks.iter().all(|c| c.generation == 3));
    }
}
