//! Hybrid score fusion over lexical and vector candidate lists.
//!
//! Raw BM25 scores and cosine similarities live on different scales, so each
//! candidate list is min-max normalized to [0, 1] before mixing. The fused
//! score is `weight * vector + (1 - weight) * lexical` with the configured
//! vector share (0.5 by default). Ties break toward the lower ordinal so
//! results are stable across runs.
//!
//! When one retriever produced no candidates (embeddings disabled, empty
//! index), the other's normalized scores are used unscaled rather than
//! halving every score through the fusion formula.

use std::collections::BTreeMap;

use crate::lexical::LexicalHit;
use crate::vector::VectorHit;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedHit {
    pub ordinal: i64,
    pub score: f64,
}

/// Min-max normalizes scores to [0, 1]. A single-element or constant-score
/// list maps to 1.0 so a sole strong hit is not erased.
fn normalize(pairs: &[(i64, f64)]) -> BTreeMap<i64, f64> {
    if pairs.is_empty() {
        return BTreeMap::new();
    }
    let min = pairs.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max = pairs.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    pairs
        .iter()
        .map(|&(ordinal, score)| {
            let norm = if range < f64::EPSILON {
                1.0
            } else {
                (score - min) / range
            };
            (ordinal, norm)
        })
        .collect()
}

/// Fuses the two candidate lists into a single ranking of at most `top_k`
/// hits. `weight` is the vector share of the fused score.
pub fn fuse(
    lexical: &[LexicalHit],
    vector: &[VectorHit],
    weight: f64,
    top_k: usize,
) -> Vec<RankedHit> {
    let lexical_pairs: Vec<(i64, f64)> = lexical.iter().map(|h| (h.ordinal, h.score)).collect();
    let vector_pairs: Vec<(i64, f64)> = vector.iter().map(|h| (h.ordinal, h.score)).collect();

    let lexical_norm = normalize(&lexical_pairs);
    let vector_norm = normalize(&vector_pairs);

    let mut fused: Vec<RankedHit> = match (lexical_norm.is_empty(), vector_norm.is_empty()) {
        (true, true) => Vec::new(),
        // Single-retriever fallback: pass normalized scores through.
        (false, true) => lexical_norm
            .into_iter()
            .map(|(ordinal, score)| RankedHit { ordinal, score })
            .collect(),
        (true, false) => vector_norm
            .into_iter()
            .map(|(ordinal, score)| RankedHit { ordinal, score })
            .collect(),
        (false, false) => {
            let mut ordinals: Vec<i64> = lexical_norm.keys().copied().collect();
            for ordinal in vector_norm.keys() {
                if !lexical_norm.contains_key(ordinal) {
                    ordinals.push(*ordinal);
                }
            }
            ordinals
                .into_iter()
                .map(|ordinal| {
                    let l = lexical_norm.get(&ordinal).copied().unwrap_or(0.0);
                    let v = vector_norm.get(&ordinal).copied().unwrap_or(0.0);
                    RankedHit {
                        ordinal,
                        score: weight * v + (1.0 - weight) * l,
                    }
                })
                .collect()
        }
    };

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.ordinal.cmp(&b.ordinal))
    });
    fused.truncate(top_k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(ordinal: i64, score: f64) -> LexicalHit {
        LexicalHit { ordinal, score }
    }

    fn vec_hit(ordinal: i64, score: f64) -> VectorHit {
        VectorHit { ordinal, score }
    }

    #[test]
    fn test_balanced_fusion_mixes_both_sources() {
        let lexical = vec![lex(1, 10.0), lex(2, 5.0), lex(3, 0.0)];
        let vector = vec![vec_hit(3, 0.9), vec_hit(2, 0.5), vec_hit(1, 0.1)];

        let fused = fuse(&lexical, &vector, 0.5, 3);
        assert_eq!(fused.len(), 3);
        // Chunk 2 sits mid-range in both lists; 1 and 3 each win one list
        // and lose the other. All three land at 0.5, tie-broken by ordinal.
        assert_eq!(fused[0].ordinal, 1);
        assert_eq!(fused[1].ordinal, 2);
        assert_eq!(fused[2].ordinal, 3);
        for hit in &fused {
            assert!((hit.score - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_weight_shifts_ranking_toward_vector() {
        let lexical = vec![lex(1, 10.0), lex(2, 1.0)];
        let vector = vec![vec_hit(2, 0.99), vec_hit(1, 0.01)];

        let lexical_heavy = fuse(&lexical, &vector, 0.1, 2);
        assert_eq!(lexical_heavy[0].ordinal, 1);

        let vector_heavy = fuse(&lexical, &vector, 0.9, 2);
        assert_eq!(vector_heavy[0].ordinal, 2);
    }

    #[test]
    fn test_lexical_only_fallback_keeps_full_scores() {
        let lexical = vec![lex(1, 8.0), lex(2, 4.0), lex(3, 2.0)];
        let fused = fuse(&lexical, &[], 0.5, 3);
        assert_eq!(fused[0].ordinal, 1);
        // Top normalized score passes through at 1.0, not halved.
        assert!((fused[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_vector_only_fallback() {
        let vector = vec![vec_hit(5, 0.8), vec_hit(2, 0.3)];
        let fused = fuse(&[], &vector, 0.5, 5);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].ordinal, 5);
        assert!((fused[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_both_empty_yields_empty() {
        assert!(fuse(&[], &[], 0.5, 5).is_empty());
    }

    #[test]
    fn test_ties_break_by_ordinal() {
        let lexical = vec![lex(7, 3.0), lex(4, 3.0), lex(9, 3.0)];
        let fused = fuse(&lexical, &[], 0.5, 3);
        let ordinals: Vec<i64> = fused.iter().map(|h| h.ordinal).collect();
        assert_eq!(ordinals, vec![4, 7, 9]);
    }

    #[test]
    fn test_top_k_truncates() {
        let lexical: Vec<LexicalHit> = (1..=10).map(|i| lex(i, i as f64)).collect();
        let fused = fuse(&lexical, &[], 0.5, 3);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].ordinal, 10);
    }

    #[test]
    fn test_single_hit_normalizes_to_one() {
        let fused = fuse(&[lex(1, 42.0)], &[], 0.5, 5);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_in_one_list_scores_zero_in_other() {
        let lexical = vec![lex(1, 10.0), lex(2, 5.0)];
        let vector = vec![vec_hit(3, 0.9), vec_hit(1, 0.2)];
        let fused = fuse(&lexical, &vector, 0.5, 3);
        let three = fused.iter().find(|h| h.ordinal == 3).unwrap();
        // Ordinal 3 only appears in the vector list; its lexical share is 0.
        assert!((three.score - 0.5).abs() < 1e-9);
    }
}
