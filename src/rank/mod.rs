//! Result ranking primitives
//!
//! This module handles:
//! - BM25 keyword scoring over a candidate set
//! - Reciprocal rank fusion of several ranked id lists
//! - Cosine similarity and maximal-marginal-relevance selection

use std::collections::HashMap;

/// RRF K constant
pub const RRF_K: f32 = 60.0;

/// Relevance/diversity trade-off used by MMR selection
pub const MMR_LAMBDA: f32 = 0.5;

/// Simple BM25 scorer
pub struct Bm25Scorer {
    k1: f32,
    b: f32,
}

impl Bm25Scorer {
    pub fn new() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }

    /// Score a single document against a query
    pub fn score(&self, query_terms: &[String], doc_text: &str, avg_doc_len: f32) -> f32 {
        let doc_lower = doc_text.to_lowercase();
        let doc_len = doc_text.len() as f32;
        let avg_doc_len = if avg_doc_len > 0.0 { avg_doc_len } else { 1.0 };
        let mut total_score = 0.0;

        for term in query_terms {
            let tf = doc_lower.matches(term.as_str()).count() as f32;

            if tf > 0.0 {
                let numerator = tf * (self.k1 + 1.0);
                let denominator = tf + self.k1 * (1.0 - self.b + self.b * (doc_len / avg_doc_len));
                total_score += numerator / denominator;
            }
        }

        total_score
    }

    /// Score every document of a candidate set, in input order
    pub fn score_all(&self, query: &str, docs: &[&str]) -> Vec<f32> {
        if docs.is_empty() {
            return Vec::new();
        }
        let terms = self.tokenize(query);
        let avg_doc_len = docs.iter().map(|d| d.len() as f32).sum::<f32>() / docs.len() as f32;
        docs.iter()
            .map(|doc| self.score(&terms, doc, avg_doc_len))
            .collect()
    }

    /// Tokenize query into terms
    pub fn tokenize(&self, query: &str) -> Vec<String> {
        query
            .split_whitespace()
            .map(|s| {
                s.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|s| s.len() >= 2)
            .collect()
    }
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fuse ranked id lists: score(id) = sum of 1 / (k + rank + 1).
///
/// Sorted by fused score descending; ties keep first-seen order.
pub fn reciprocal_rank_fusion(rankings: &[Vec<String>], k: f32) -> Vec<(String, f32)> {
    let mut order: Vec<String> = Vec::new();
    let mut scores: HashMap<String, f32> = HashMap::new();

    for ranking in rankings {
        for (rank, id) in ranking.iter().enumerate() {
            let rrf_score = 1.0 / (k + rank as f32 + 1.0);
            match scores.get_mut(id) {
                Some(score) => *score += rrf_score,
                None => {
                    order.push(id.clone());
                    scores.insert(id.clone(), rrf_score);
                }
            }
        }
    }

    let mut fused: Vec<(String, f32)> = order
        .into_iter()
        .map(|id| {
            let score = scores.get(&id).copied().unwrap_or(0.0);
            (id, score)
        })
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Cosine similarity; 0.0 when either vector is zero or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Maximal marginal relevance selection.
///
/// Greedily picks up to `k` candidates maximizing
/// `lambda * sim(query, d) - (1 - lambda) * max sim(d, selected)`.
/// Returns candidate indices in selection order.
pub fn mmr_select(query: &[f32], candidates: &[Vec<f32>], k: usize, lambda: f32) -> Vec<usize> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&candidates[idx], &candidates[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if redundancy.is_finite() { redundancy } else { 0.0 };
            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}
