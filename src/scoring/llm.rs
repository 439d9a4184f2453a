//! LLM relevance scorer over an OpenAI-compatible chat endpoint

use super::RelevanceScorer;
use crate::config::ScorerConfig;
use crate::error::{Error, Result};
use crate::retrieval::RetrievedDocument;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Requests in flight at once
const CONCURRENCY: usize = 4;

const SYSTEM_PROMPT: &str = "You are a relevance grader. Given a question and a passage, \
rate how relevant the passage is to answering the question on a scale from 0 to 10, \
where 0 is unrelated and 10 answers it fully. Respond with the number only.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct LlmRelevanceScorer {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    number: Regex,
}

impl LlmRelevanceScorer {
    pub fn new(config: &ScorerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid scorer URL: {}", e)))?;
        let endpoint = base_url
            .join("/v1/chat/completions")
            .map_err(|e| Error::Config(format!("Invalid scorer URL: {}", e)))?;
        let number = Regex::new(r"\d+(?:\.\d+)?")
            .map_err(|e| Error::Scoring(format!("Invalid score pattern: {}", e)))?;
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            endpoint,
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            number,
        })
    }

    /// First number in the reply, mapped from 0-10 onto 0-1
    fn parse_score(&self, reply: &str) -> Result<f32> {
        let raw: f32 = self
            .number
            .find(reply)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| Error::Scoring(format!("No score in reply: {:?}", reply)))?;
        Ok((raw / 10.0).clamp(0.0, 1.0))
    }

    async fn score_one(&self, query: &str, passage: &str) -> Result<f32> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Question: {}\n\nPassage:\n{}", query, passage),
                },
            ],
            temperature: 0.0,
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Scoring(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Scoring(e.to_string()))?
            .json::<ChatResponse>()
            .await
            .map_err(|e| Error::Scoring(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Scoring("Empty completion".to_string()))?;
        self.parse_score(&reply)
    }
}

#[async_trait]
impl RelevanceScorer for LlmRelevanceScorer {
    async fn score(&self, query: &str, documents: &[RetrievedDocument]) -> Result<Vec<f32>> {
        debug!("Scoring {} documents with {}", documents.len(), self.model);

        let requests: Vec<_> = documents
            .iter()
            .map(|doc| self.score_one(query, &doc.text))
            .collect();

        stream::iter(requests)
            .buffered(CONCURRENCY)
            .try_collect()
            .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    fn scorer_for(server: &MockServer) -> LlmRelevanceScorer {
        LlmRelevanceScorer::new(&ScorerConfig {
            enabled: true,
            url: server.uri(),
            model: "grader".to_string(),
            api_key_env: "DOCINDEX_TEST_UNSET_KEY".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_scores_align_with_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("alpha passage"))
            .respond_with(completion("8"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("beta passage"))
            .respond_with(completion("Score: 2.5 out of 10"))
            .mount(&server)
            .await;

        let scorer = scorer_for(&server);
        let docs = vec![
            RetrievedDocument::new("a", "alpha passage", 0.9),
            RetrievedDocument::new("b", "beta passage", 0.8),
        ];

        let scores = scorer.score("question", &docs).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 0.8).abs() < 1e-6);
        assert!((scores[1] - 0.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(completion("very relevant"))
            .mount(&server)
            .await;

        let scorer = scorer_for(&server);
        let err = scorer
            .score("q", &[RetrievedDocument::new("a", "text", 0.1)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Scoring(_)));
    }

    #[tokio::test]
    async fn test_more_documents_than_concurrency_keep_order() {
        let server = MockServer::start().await;
        for n in 0..6 {
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .and(body_string_contains(format!("passage number {}", n)))
                .respond_with(completion(&n.to_string()))
                .mount(&server)
                .await;
        }

        let scorer = Arc::new(scorer_for(&server));
        let docs: Vec<RetrievedDocument> = (0..6)
            .map(|n| RetrievedDocument::new(n.to_string(), format!("passage number {}", n), 0.5))
            .collect();

        // scoring must be usable from a spawned task
        let task = {
            let scorer = scorer.clone();
            tokio::spawn(async move { scorer.score("q", &docs).await })
        };
        let scores = task.await.unwrap().unwrap();

        let expected: Vec<f32> = (0..6).map(|n| n as f32 / 10.0).collect();
        assert_eq!(scores.len(), expected.len());
        for (got, want) in scores.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }
}
