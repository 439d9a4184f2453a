use super::{apply_scores, RerankResult, Reranker};
use crate::config::RerankerConfig;
use crate::error::{Error, Result};
use crate::retrieval::RetrievedDocument;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(alias = "relevance_score")]
    score: f32,
}

/// Cross-encoder served over HTTP (`POST /v1/rerank`)
pub struct HttpReranker {
    client: Client,
    endpoint: Url,
    model_id: String,
    top_k: usize,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid reranker backend URL: {}", e)))?;
        let endpoint = base_url
            .join("/v1/rerank")
            .map_err(|e| Error::Config(format!("Invalid reranker backend URL: {}", e)))?;
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            endpoint,
            model_id: config.model.clone(),
            top_k: config.top_k,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>> {
        if documents.is_empty() {
            return Ok(documents);
        }

        debug!("Reranking {} documents with {}", documents.len(), self.model_id);

        let request = RerankRequest {
            model: &self.model_id,
            query,
            documents: documents.iter().map(|d| d.text.clone()).collect(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Rerank(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Rerank(e.to_string()))?;

        let parsed = response
            .json::<RerankResponse>()
            .await
            .map_err(|e| Error::Rerank(e.to_string()))?;
        let scores = parsed
            .results
            .into_iter()
            .map(|item| RerankResult {
                index: item.index,
                score: item.score,
            })
            .collect();

        Ok(apply_scores(documents, scores, self.top_k))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
