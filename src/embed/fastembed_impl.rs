//! Local text embeddings through fastembed

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::local_models::{resolve_embedding_model, BlockingModel};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use tracing::{debug, info};

pub struct FastEmbedder {
    model: BlockingModel<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Load a local model. The configured dimension must match the model's
    /// output, since it sizes the vector collection.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dimension) = resolve_embedding_model(&config.model)?;
        if config.dimension != dimension {
            return Err(Error::Config(format!(
                "Model '{}' produces {}-dimensional vectors but embedding.dimension is {}",
                config.model, dimension, config.dimension
            )));
        }

        info!(model = %config.model, dimension, "Loading local embedding model");
        let options = InitOptions::new(model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| Error::Embedding(format!("Failed to initialize model: {}", e)))?;

        Ok(Self {
            model: BlockingModel::new(model),
            model_name: config.model.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts locally", texts.len());
        self.model
            .run(Error::Embedding, move |model: &TextEmbedding| model.embed(texts, None))
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
