//! Default values for configuration

/// Default Qdrant URL for local development
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "docindex_chunks".to_string()
}

/// Default embedding backend
pub fn default_embedding_backend() -> String {
    "http".to_string()
}

/// Default embedding service URL
pub fn default_embedding_url() -> String {
    std::env::var("DOCINDEX_EMBEDDING_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension for bge-small-en-v1.5
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default name of the index created by `init`
pub fn default_index_name() -> String {
    "File Collection".to_string()
}

/// Default file types accepted by a new index
pub fn default_supported_file_types() -> String {
    ".pdf, .txt".to_string()
}

/// Default maximum characters per chunk for the plain-text loader
pub fn default_max_chunk_chars() -> usize {
    1200
}

/// Default number of retrieved chunks
pub fn default_top_k() -> usize {
    10
}

/// Default candidate widening factor for the first retrieval round
pub fn default_first_round_multiplier() -> usize {
    10
}

/// Default reranker backend
pub fn default_reranker_backend() -> String {
    "http".to_string()
}

/// Default reranker model (cross-encoder)
pub fn default_reranker_model() -> String {
    "BAAI/bge-reranker-base".to_string()
}

/// Default reranker service URL
pub fn default_reranker_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

/// Default number of results kept by a reranker
pub fn default_reranker_top_k() -> usize {
    10
}

/// Default minimum score for the threshold reranker
pub fn default_reranker_min_score() -> f32 {
    0.0
}

/// Default LLM endpoint for relevance scoring
pub fn default_scorer_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

/// Default LLM used for relevance scoring
pub fn default_scorer_model() -> String {
    "llama3.1".to_string()
}

/// Default environment variable name for the scorer API key
pub fn default_scorer_api_key_env() -> String {
    "DOCINDEX_LLM_API_KEY".to_string()
}
