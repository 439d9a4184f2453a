//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - HTTP (OpenAI-compatible) and feature-hashing backends
//! - Optional local FastEmbed models behind the `local-models` feature
//! - Batch processing for efficiency

mod hashing;
mod http_backend;

#[cfg(feature = "local-models")]
mod fastembed_impl;

pub use hashing::*;
pub use http_backend::*;

#[cfg(feature = "local-models")]
pub use fastembed_impl::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Scale a vector to unit length; zero vectors are returned unchanged
pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend.to_lowercase().as_str() {
        "http" | "openai-compatible" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        #[cfg(feature = "local-models")]
        "fastembed" => Ok(Arc::new(FastEmbedder::new(config)?)),
        #[cfg(not(feature = "local-models"))]
        "fastembed" => Err(Error::Config(
            "Embedding backend 'fastembed' requires the 'local-models' feature".to_string(),
        )),
        other => Err(Error::Config(format!(
            "Unsupported embedding backend '{}'; expected 'http', 'hashing' or 'fastembed'",
            other
        ))),
    }
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch_texts: Vec<String> = chunk.to_vec();
        let expected = batch_texts.len();
        let embeddings = embedder.embed(batch_texts).await?;
        if embeddings.len() != expected {
            return Err(Error::Embedding(format!(
                "Embedder '{}' returned {} vectors for {} inputs",
                embedder.model_name(),
                embeddings.len(),
                expected
            )));
        }
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}
