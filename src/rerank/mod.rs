//! Reranking support for retrieved documents
//!
//! A reranker takes the query and the current result list and returns a
//! new list, possibly reordered, rescored or shortened. The retrieval
//! pipeline applies the configured rerankers in declaration order.

mod http_backend;
mod min_score;

#[cfg(feature = "local-models")]
mod fastembed_impl;

pub use http_backend::*;
pub use min_score::*;

#[cfg(feature = "local-models")]
pub use fastembed_impl::*;

use crate::config::RerankerConfig;
use crate::error::{Error, Result};
use crate::retrieval::RetrievedDocument;
use async_trait::async_trait;
use std::sync::Arc;

/// Score assigned by a cross-encoder to the document at `index`
#[derive(Debug, Clone)]
pub struct RerankResult {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>>;

    fn model_name(&self) -> &str;
}

/// Build one chain stage from its configuration
pub fn create_reranker(config: &RerankerConfig) -> Result<Arc<dyn Reranker>> {
    match config.backend.to_lowercase().as_str() {
        "http" => Ok(Arc::new(HttpReranker::new(config)?)),
        "min-score" | "min_score" => Ok(Arc::new(MinScoreReranker::new(config))),
        #[cfg(feature = "local-models")]
        "fastembed" => Ok(Arc::new(FastEmbedReranker::new(config)?)),
        #[cfg(not(feature = "local-models"))]
        "fastembed" => Err(Error::Config(
            "Reranker backend 'fastembed' requires the 'local-models' feature".to_string(),
        )),
        other => Err(Error::Config(format!(
            "Unsupported reranker backend '{}'; expected 'http', 'min-score' or 'fastembed'",
            other
        ))),
    }
}

/// Build the whole chain, preserving order
pub fn create_reranker_chain(configs: &[RerankerConfig]) -> Result<Vec<Arc<dyn Reranker>>> {
    configs.iter().map(create_reranker).collect()
}

/// Reorder documents by cross-encoder scores and keep the best `top_k`.
///
/// Indices the model did not score, or that are out of range, are dropped.
pub fn apply_scores(
    documents: Vec<RetrievedDocument>,
    mut scores: Vec<RerankResult>,
    top_k: usize,
) -> Vec<RetrievedDocument> {
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut slots: Vec<Option<RetrievedDocument>> = documents.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(scores.len().min(top_k));
    for item in scores {
        if ordered.len() >= top_k {
            break;
        }
        if let Some(mut doc) = slots.get_mut(item.index).and_then(Option::take) {
            doc.score = item.score;
            ordered.push(doc);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, score: f32) -> RetrievedDocument {
        RetrievedDocument::new(id, format!("text of {}", id), score)
    }

    #[test]
    fn test_apply_scores_orders_and_truncates() {
        let docs = vec![doc("a", 0.1), doc("b", 0.2), doc("c", 0.3)];
        let scores = vec![
            RerankResult { index: 0, score: 0.9 },
            RerankResult { index: 2, score: 0.5 },
            RerankResult { index: 1, score: 0.7 },
            RerankResult { index: 7, score: 1.0 },
        ];

        let reranked = apply_scores(docs, scores, 2);
        let ids: Vec<&str> = reranked.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(reranked[0].score, 0.9);
    }

    #[test]
    fn test_create_reranker_rejects_unknown_backend() {
        let config = RerankerConfig {
            backend: "cohere-v9".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_reranker(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_chain_preserves_order() {
        let configs = vec![
            RerankerConfig {
                backend: "min-score".to_string(),
                ..Default::default()
            },
            RerankerConfig {
                backend: "http".to_string(),
                ..Default::default()
            },
        ];
        let chain = create_reranker_chain(&configs).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].model_name(), "min-score");
    }
}
