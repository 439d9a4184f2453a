//! Shared plumbing for the fastembed backends
//!
//! Model names from the config are resolved here, so the embedder and the
//! reranker reject unknown names the same way. fastembed models are
//! synchronous; `BlockingModel` runs them on the blocking pool.

use crate::error::{Error, Result};
use fastembed::{EmbeddingModel, RerankerModel};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;

const EMBEDDING_MODELS: &[&str] = &[
    "BAAI/bge-small-en-v1.5",
    "BAAI/bge-base-en-v1.5",
    "BAAI/bge-large-en-v1.5",
    "sentence-transformers/all-MiniLM-L6-v2",
];

const RERANKER_MODELS: &[&str] = &["BAAI/bge-reranker-base"];

/// Resolve a configured embedding model to its fastembed variant and output dimension
pub(crate) fn resolve_embedding_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    match name {
        "BAAI/bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "BAAI/bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "BAAI/bge-large-en-v1.5" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        "sentence-transformers/all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        other => Err(unknown_model("embedding", other, EMBEDDING_MODELS)),
    }
}

pub(crate) fn resolve_reranker_model(name: &str) -> Result<RerankerModel> {
    match name {
        "BAAI/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        other => Err(unknown_model("reranker", other, RERANKER_MODELS)),
    }
}

fn unknown_model(kind: &str, name: &str, known: &[&str]) -> Error {
    Error::Config(format!(
        "Unknown local {} model '{}'; available: {}",
        kind,
        name,
        known.join(", ")
    ))
}

/// A synchronous model shared between tasks
pub(crate) struct BlockingModel<M> {
    inner: Arc<Mutex<M>>,
}

impl<M: Send + 'static> BlockingModel<M> {
    pub fn new(model: M) -> Self {
        Self {
            inner: Arc::new(Mutex::new(model)),
        }
    }

    /// Run `task` against the model on the blocking pool; failures are wrapped with `wrap`
    pub async fn run<T, E, F>(&self, wrap: fn(String) -> Error, task: F) -> Result<T>
    where
        T: Send + 'static,
        E: Display,
        F: FnOnce(&M) -> std::result::Result<T, E> + Send + 'static,
    {
        let model = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            task(&*model).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| wrap(format!("Task join error: {}", e)))?
        .map_err(wrap)
    }
}
