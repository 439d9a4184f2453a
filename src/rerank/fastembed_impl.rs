//! Local cross-encoder reranking through fastembed

use super::{apply_scores, RerankResult, Reranker};
use crate::config::RerankerConfig;
use crate::error::{Error, Result};
use crate::local_models::{resolve_reranker_model, BlockingModel};
use crate::retrieval::RetrievedDocument;
use async_trait::async_trait;
use fastembed::{RerankInitOptions, TextRerank};
use tracing::{debug, info};

pub struct FastEmbedReranker {
    model: BlockingModel<TextRerank>,
    model_name: String,
    top_k: usize,
}

impl FastEmbedReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let model = resolve_reranker_model(&config.model)?;

        info!(model = %config.model, "Loading local reranker model");
        let options = RerankInitOptions::new(model).with_show_download_progress(true);
        let model = TextRerank::try_new(options)
            .map_err(|e| Error::Rerank(format!("Failed to initialize reranker: {}", e)))?;

        Ok(Self {
            model: BlockingModel::new(model),
            model_name: config.model.clone(),
            top_k: config.top_k,
        })
    }
}

#[async_trait]
impl Reranker for FastEmbedReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>> {
        if documents.is_empty() {
            return Ok(documents);
        }

        debug!("Reranking {} documents locally", documents.len());

        let query = query.to_string();
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let results = self
            .model
            .run(Error::Rerank, move |model: &TextRerank| {
                let doc_refs: Vec<&String> = texts.iter().collect();
                model.rerank(&query, doc_refs, false, None)
            })
            .await?;

        let scores = results
            .into_iter()
            .map(|r| RerankResult {
                index: r.index,
                score: r.score,
            })
            .collect();

        Ok(apply_scores(documents, scores, self.top_k))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
