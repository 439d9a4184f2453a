//! Relevance scoring of retrieved documents
//!
//! A scorer assigns each document a 0-1 relevance to the query. Scores
//! annotate results; they never reorder or remove them.

mod llm;

pub use llm::*;

use crate::config::ScorerConfig;
use crate::error::Result;
use crate::retrieval::RetrievedDocument;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per document, aligned with the input order
    async fn score(&self, query: &str, documents: &[RetrievedDocument]) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

/// Build the configured scorer, if enabled
pub fn create_scorer(config: &ScorerConfig) -> Result<Option<Arc<dyn RelevanceScorer>>> {
    if !config.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(LlmRelevanceScorer::new(config)?)))
}
