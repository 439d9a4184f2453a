//! Threshold stage: drops results below a minimum score

use super::Reranker;
use crate::config::RerankerConfig;
use crate::error::Result;
use crate::retrieval::RetrievedDocument;
use async_trait::async_trait;

pub struct MinScoreReranker {
    min_score: f32,
    top_k: usize,
}

impl MinScoreReranker {
    pub fn new(config: &RerankerConfig) -> Self {
        Self {
            min_score: config.min_score,
            top_k: config.top_k,
        }
    }
}

#[async_trait]
impl Reranker for MinScoreReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>> {
        Ok(documents
            .into_iter()
            .filter(|doc| doc.score >= self.min_score)
            .take(self.top_k)
            .collect())
    }

    fn model_name(&self) -> &str {
        "min-score"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filters_and_keeps_order() {
        let stage = MinScoreReranker::new(&RerankerConfig {
            backend: "min-score".to_string(),
            min_score: 0.5,
            top_k: 10,
            ..Default::default()
        });

        let kept = stage
            .rerank(
                "q",
                vec![
                    RetrievedDocument::new("a", "", 0.9),
                    RetrievedDocument::new("b", "", 0.1),
                    RetrievedDocument::new("c", "", 0.5),
                ],
            )
            .await
            .unwrap();
        let ids: Vec<&str> = kept.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
