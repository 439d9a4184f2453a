//! Vector and document store adapters
//!
//! Chunks live in two external stores keyed by the same chunk id:
//! - a vector store (embeddings plus filterable metadata), queried by
//!   vector, text or hybrid retrieval
//! - a document store (chunk text plus metadata), read back by id
//!
//! Both are traits so the coordinator and the retrieval pipeline can run
//! against Qdrant/SQLite in production and in-memory stores in tests.

mod docstore;
mod memory;
mod payload;
mod qdrant;

pub use docstore::*;
pub use memory::*;
pub use payload::*;
pub use qdrant::*;

use crate::error::Result;
use crate::rank::{cosine_similarity, mmr_select, reciprocal_rank_fusion, Bm25Scorer, RRF_K};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// How the vector store ranks candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Vector,
    Text,
    #[default]
    Hybrid,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalMode::Vector => write!(f, "vector"),
            RetrievalMode::Text => write!(f, "text"),
            RetrievalMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for RetrievalMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "vector" => Ok(RetrievalMode::Vector),
            "text" => Ok(RetrievalMode::Text),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            _ => Err(crate::error::Error::Validation(format!(
                "Unknown retrieval mode: {}",
                s
            ))),
        }
    }
}

/// A chunk as written to both stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Predicate over chunk metadata
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Eq { key: String, value: String },
    In { key: String, values: Vec<String> },
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        MetadataFilter::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_in(key: impl Into<String>, values: Vec<String>) -> Self {
        MetadataFilter::In {
            key: key.into(),
            values,
        }
    }

    /// Evaluate against a metadata map
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            MetadataFilter::Eq { key, value } => {
                metadata.get(key).and_then(value_as_string).as_deref() == Some(value.as_str())
            }
            MetadataFilter::In { key, values } => metadata
                .get(key)
                .and_then(value_as_string)
                .map(|v| values.contains(&v))
                .unwrap_or(false),
            MetadataFilter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
        }
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A vector store query
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub text: String,
    pub top_k: usize,
    pub mode: RetrievalMode,
    /// Restrict to these chunk ids; `Some(vec![])` matches nothing
    pub scope: Option<Vec<String>>,
    pub filter: Option<MetadataFilter>,
    /// MMR lambda; `None` disables diversification
    pub mmr_threshold: Option<f32>,
}

impl VectorQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            mode: RetrievalMode::default(),
            scope: None,
            filter: None,
            mmr_threshold: None,
        }
    }
}

/// A ranked vector store result
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// Embedding-backed chunk index
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and insert (or replace) records
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()>;

    /// Remove records by id; unknown ids are ignored
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Rank records against a query
    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorHit>>;

    /// Collection statistics; `None` when the collection does not exist yet
    async fn info(&self) -> Result<Option<CollectionInfo>>;
}

/// Size and health of a vector collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// Chunk text store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert (or replace) records
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()>;

    /// Fetch records by id, in request order; missing ids are skipped
    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkRecord>>;

    /// Remove records by id; unknown ids are ignored
    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// Candidate gathered by a vector store adapter before final ranking
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub vector: Option<Vec<f32>>,
    pub metadata: Map<String, Value>,
}

impl Candidate {
    fn into_hit(self) -> VectorHit {
        VectorHit {
            id: self.id,
            score: self.score,
            metadata: self.metadata,
        }
    }
}

/// How many vector candidates to fetch before MMR narrows to `top_k`
pub(crate) fn mmr_fetch_limit(top_k: usize) -> usize {
    top_k.saturating_mul(4).max(top_k)
}

/// Score candidates with BM25; drops non-matching ones unless the query
/// is empty, in which case every candidate is kept with score 0.
pub(crate) fn rank_by_text(query: &str, mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    let scorer = Bm25Scorer::new();
    if scorer.tokenize(query).is_empty() {
        for candidate in &mut candidates {
            candidate.score = 0.0;
        }
        candidates.truncate(top_k);
        return candidates;
    }

    let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
    let scores = scorer.score_all(query, &texts);
    let mut ranked: Vec<Candidate> = candidates
        .into_iter()
        .zip(scores)
        .filter(|(_, score)| *score > 0.0)
        .map(|(mut candidate, score)| {
            candidate.score = score;
            candidate
        })
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_k);
    ranked
}

/// Narrow score-sorted vector candidates with MMR
pub(crate) fn diversify(
    query_vector: &[f32],
    candidates: Vec<Candidate>,
    top_k: usize,
    lambda: f32,
) -> Vec<Candidate> {
    let vectors: Vec<Vec<f32>> = candidates
        .iter()
        .map(|c| c.vector.clone().unwrap_or_default())
        .collect();
    let picked = mmr_select(query_vector, &vectors, top_k, lambda);

    let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
    picked
        .into_iter()
        .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
        .collect()
}

/// Fuse vector and text rankings with reciprocal rank fusion
pub(crate) fn fuse_hybrid(
    vector_ranked: Vec<Candidate>,
    text_ranked: Vec<Candidate>,
    top_k: usize,
) -> Vec<VectorHit> {
    let rankings = vec![
        vector_ranked.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
        text_ranked.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
    ];

    let mut by_id: HashMap<String, Candidate> = HashMap::new();
    for candidate in vector_ranked.into_iter().chain(text_ranked) {
        by_id.entry(candidate.id.clone()).or_insert(candidate);
    }

    reciprocal_rank_fusion(&rankings, RRF_K)
        .into_iter()
        .take(top_k)
        .filter_map(|(id, score)| {
            by_id.remove(&id).map(|mut candidate| {
                candidate.score = score;
                candidate.into_hit()
            })
        })
        .collect()
}

/// Rank candidates by cosine similarity to the query vector
pub(crate) fn rank_by_vector(query_vector: &[f32], mut candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    for candidate in &mut candidates {
        candidate.score = candidate
            .vector
            .as_deref()
            .map(|v| cosine_similarity(query_vector, v))
            .unwrap_or(0.0);
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(limit);
    candidates
}

pub(crate) fn into_hits(candidates: Vec<Candidate>) -> Vec<VectorHit> {
    candidates.into_iter().map(Candidate::into_hit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn candidate(id: &str, text: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            text: text.to_string(),
            score: 0.0,
            vector: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_filter_matches() {
        let meta = metadata(json!({"file_name": "a.pdf", "page_label": 3}));

        assert!(MetadataFilter::eq("file_name", "a.pdf").matches(&meta));
        assert!(!MetadataFilter::eq("file_name", "b.pdf").matches(&meta));
        assert!(MetadataFilter::is_in("page_label", vec!["1".into(), "3".into()]).matches(&meta));
        assert!(!MetadataFilter::eq("missing", "x").matches(&meta));

        let and = MetadataFilter::And(vec![
            MetadataFilter::eq("file_name", "a.pdf"),
            MetadataFilter::is_in("page_label", vec!["4".into()]),
        ]);
        assert!(!and.matches(&meta));

        let or = MetadataFilter::Or(vec![
            MetadataFilter::eq("file_name", "b.pdf"),
            MetadataFilter::eq("file_name", "a.pdf"),
        ]);
        assert!(or.matches(&meta));
    }

    #[test]
    fn test_retrieval_mode_parse() {
        assert_eq!("Text".parse::<RetrievalMode>().unwrap(), RetrievalMode::Text);
        assert_eq!(RetrievalMode::default(), RetrievalMode::Hybrid);
        assert!("fuzzy".parse::<RetrievalMode>().is_err());
    }

    #[test]
    fn test_rank_by_text_drops_non_matching() {
        let ranked = rank_by_text(
            "qdrant filters",
            vec![
                candidate("1", "nothing relevant here"),
                candidate("2", "qdrant payload filters"),
                candidate("3", "qdrant only"),
            ],
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_rank_by_text_empty_query_keeps_all() {
        let ranked = rank_by_text("", vec![candidate("1", "a"), candidate("2", "b")], 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 0.0);
    }

    #[test]
    fn test_fuse_hybrid_dedupes() {
        let fused = fuse_hybrid(
            vec![candidate("a", ""), candidate("b", "")],
            vec![candidate("b", ""), candidate("c", "")],
            10,
        );
        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids[0], "b");
        assert_eq!(ids.len(), 3);
    }
}
