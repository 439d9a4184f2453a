//! In-process stores
//!
//! Same ranking semantics as the Qdrant adapter, held in memory. Used by
//! the test suite and by callers embedding the library without services.

use super::{
    diversify, fuse_hybrid, into_hits, mmr_fetch_limit, rank_by_text, rank_by_vector, Candidate,
    ChunkRecord, CollectionInfo, DocumentStore, RetrievalMode, VectorHit, VectorQuery, VectorStore,
};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

struct StoredPoint {
    record: ChunkRecord,
    vector: Vec<f32>,
}

/// Vector store held in memory
pub struct MemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    points: RwLock<Vec<StoredPoint>>,
}

impl MemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            points: RwLock::new(Vec::new()),
        }
    }

    /// Stored ids in insertion order
    pub async fn ids(&self) -> Vec<String> {
        self.points
            .read()
            .await
            .iter()
            .map(|p| p.record.id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    async fn candidates(&self, query: &VectorQuery) -> Vec<Candidate> {
        let scope: Option<HashSet<&String>> = query.scope.as_ref().map(|s| s.iter().collect());
        self.points
            .read()
            .await
            .iter()
            .filter(|p| scope.as_ref().map_or(true, |s| s.contains(&p.record.id)))
            .filter(|p| {
                query
                    .filter
                    .as_ref()
                    .map_or(true, |f| f.matches(&p.record.metadata))
            })
            .map(|p| Candidate {
                id: p.record.id.clone(),
                text: p.record.text.clone(),
                score: 0.0,
                vector: Some(p.vector.clone()),
                metadata: p.record.metadata.clone(),
            })
            .collect()
    }

    async fn vector_ranked(&self, query: &VectorQuery, candidates: Vec<Candidate>) -> Result<Vec<Candidate>> {
        let query_vector = self
            .embedder
            .embed(vec![query.text.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Embedder returned no vector for query".to_string()))?;

        match query.mmr_threshold {
            Some(lambda) => {
                let pool = rank_by_vector(&query_vector, candidates, mmr_fetch_limit(query.top_k));
                Ok(diversify(&query_vector, pool, query.top_k, lambda))
            }
            None => Ok(rank_by_vector(&query_vector, candidates, query.top_k)),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, 64).await?;

        let mut points = self.points.write().await;
        for (record, vector) in records.iter().zip(vectors) {
            let point = StoredPoint {
                record: record.clone(),
                vector,
            };
            match points.iter_mut().find(|p| p.record.id == record.id) {
                Some(existing) => *existing = point,
                None => points.push(point),
            }
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let doomed: HashSet<&String> = ids.iter().collect();
        self.points
            .write()
            .await
            .retain(|p| !doomed.contains(&p.record.id));
        Ok(())
    }

    async fn info(&self) -> Result<Option<CollectionInfo>> {
        let count = self.points.read().await.len() as u64;
        Ok(Some(CollectionInfo {
            points_count: count,
            indexed_vectors_count: count,
            status: "Green".to_string(),
        }))
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorHit>> {
        if query.top_k == 0 || matches!(query.scope, Some(ref scope) if scope.is_empty()) {
            return Ok(Vec::new());
        }

        let candidates = self.candidates(query).await;

        match query.mode {
            RetrievalMode::Vector => Ok(into_hits(self.vector_ranked(query, candidates).await?)),
            RetrievalMode::Text => Ok(into_hits(rank_by_text(&query.text, candidates, query.top_k))),
            RetrievalMode::Hybrid => {
                let vector = self.vector_ranked(query, candidates.clone()).await?;
                let text = rank_by_text(&query.text, candidates, query.top_k);
                Ok(fuse_hybrid(vector, text, query.top_k))
            }
        }
    }
}

/// Document store held in memory
#[derive(Default)]
pub struct MemoryDocumentStore {
    records: RwLock<HashMap<String, ChunkRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.contains_key(id)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkRecord>> {
        let stored = self.records.read().await;
        Ok(ids.iter().filter_map(|id| stored.get(id).cloned()).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.records.write().await;
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }
}
