//! Retrieval pipeline
//!
//! `run(query, scope)`:
//! 1. normalize the scope (file ids); empty scope means no results
//! 2. resolve files to chunk ids through the catalog
//! 3. query the vector store over that chunk universe, widened by
//!    `first_round_multiplier`, optionally diversified with MMR
//! 4. hydrate text from the document store
//! 5. run the reranker chain, then keep `top_k`
//! 6. optionally append sibling chunks from the same pages (extra tables)
//! 7. optionally annotate relevance with a scorer
//!
//! Steps 6 and 7 are best effort: their failures are logged, never returned.

mod scope;

pub use scope::normalize_scope;

use crate::catalog::{CatalogDb, RelationType};
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::rank::MMR_LAMBDA;
use crate::rerank::Reranker;
use crate::scoring::RelevanceScorer;
use crate::store::{DocumentStore, MetadataFilter, RetrievalMode, VectorHit, VectorQuery, VectorStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidates fetched by the extra-table query
pub const EXTRA_TABLE_TOP_K: usize = 50;

/// A retrieval result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub doc_id: String,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievedDocument {
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            score,
            relevance: None,
            metadata: Map::new(),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get("file_name").and_then(Value::as_str)
    }

    /// Page label as a string, whether stored as string or number
    pub fn page_label(&self) -> Option<String> {
        match self.metadata.get("page_label")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub struct RetrievalPipeline {
    catalog: CatalogDb,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
    settings: RetrievalConfig,
    rerankers: Vec<Arc<dyn Reranker>>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
}

impl RetrievalPipeline {
    pub fn new(
        catalog: CatalogDb,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        settings: RetrievalConfig,
    ) -> Self {
        Self {
            catalog,
            vectors,
            documents,
            settings,
            rerankers: Vec::new(),
            scorer: None,
        }
    }

    /// Rerankers run in the given order
    pub fn with_rerankers(mut self, rerankers: Vec<Arc<dyn Reranker>>) -> Self {
        self.rerankers = rerankers;
        self
    }

    pub fn with_scorer(mut self, scorer: Option<Arc<dyn RelevanceScorer>>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn settings(&self) -> &RetrievalConfig {
        &self.settings
    }

    pub async fn run(&self, query: &str, scope: &[Option<String>]) -> Result<Vec<RetrievedDocument>> {
        let file_ids = normalize_scope(scope)?;
        if file_ids.is_empty() {
            debug!("Empty scope, nothing to retrieve");
            return Ok(Vec::new());
        }

        let chunk_ids = self
            .catalog
            .target_ids_for_sources(&file_ids, RelationType::Document)
            .await?;
        if chunk_ids.is_empty() {
            debug!(files = file_ids.len(), "Scoped files have no chunks");
            return Ok(Vec::new());
        }

        let top_k = self.settings.top_k;
        let first_round = VectorQuery {
            text: query.to_string(),
            top_k: top_k.saturating_mul(self.settings.first_round_multiplier.max(1)),
            mode: self.settings.mode,
            scope: Some(chunk_ids.clone()),
            filter: None,
            mmr_threshold: self.settings.mmr.then_some(MMR_LAMBDA),
        };

        let hits = self.vectors.query(&first_round).await?;
        let mut docs = self.hydrate(hits).await?;
        debug!(candidates = docs.len(), "First round retrieved");

        for reranker in &self.rerankers {
            docs = reranker.rerank(query, docs).await?;
            debug!(
                reranker = reranker.model_name(),
                remaining = docs.len(),
                "Reranker applied"
            );
        }
        docs.truncate(top_k);

        if self.settings.get_extra_table {
            match self.extra_tables(&docs, &chunk_ids).await {
                Ok(extra) => {
                    if !extra.is_empty() {
                        debug!(added = extra.len(), "Appended extra table chunks");
                    }
                    docs.extend(extra);
                }
                Err(e) => warn!(error = %e, "Extra table retrieval failed; returning base results"),
            }
        }

        if let Some(ref scorer) = self.scorer {
            self.annotate(scorer.as_ref(), query, &mut docs).await;
        }

        info!(results = docs.len(), "Retrieval complete");
        Ok(docs)
    }

    /// Attach text from the document store; hits without a document are dropped
    async fn hydrate(&self, hits: Vec<VectorHit>) -> Result<Vec<RetrievedDocument>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let mut records: HashMap<String, _> = self
            .documents
            .get(&ids)
            .await?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        let mut docs = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(record) = records.remove(&hit.id) else {
                warn!(chunk_id = %hit.id, "Chunk missing from document store, dropping");
                continue;
            };
            let mut metadata = record.metadata;
            for (key, value) in hit.metadata {
                metadata.entry(key).or_insert(value);
            }
            docs.push(RetrievedDocument {
                doc_id: hit.id,
                text: record.text,
                score: hit.score,
                relevance: None,
                metadata,
            });
        }
        Ok(docs)
    }

    /// Chunks sharing (file_name, page_label) with the results, not yet seen
    async fn extra_tables(
        &self,
        docs: &[RetrievedDocument],
        chunk_ids: &[String],
    ) -> Result<Vec<RetrievedDocument>> {
        let mut pages: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for doc in docs {
            let Some(page_label) = doc.page_label() else {
                continue;
            };
            match doc.file_name() {
                Some(file_name) => {
                    pages
                        .entry(file_name.to_string())
                        .or_default()
                        .insert(page_label);
                }
                None => warn!(chunk_id = %doc.doc_id, "Chunk has page_label but no file_name"),
            }
        }

        let mut filters: Vec<MetadataFilter> = pages
            .into_iter()
            .map(|(file_name, labels)| {
                MetadataFilter::And(vec![
                    MetadataFilter::eq("file_name", file_name),
                    MetadataFilter::is_in("page_label", labels.into_iter().collect()),
                ])
            })
            .collect();

        let filter = match filters.len() {
            0 => return Ok(Vec::new()),
            1 => filters.remove(0),
            _ => MetadataFilter::Or(filters),
        };

        let query = VectorQuery {
            text: String::new(),
            top_k: EXTRA_TABLE_TOP_K,
            mode: RetrievalMode::Text,
            scope: Some(chunk_ids.to_vec()),
            filter: Some(filter),
            mmr_threshold: None,
        };

        let hits = self
            .vectors
            .query(&query)
            .await
            .map_err(|e| Error::Augmentation(e.to_string()))?;

        let seen: HashSet<&str> = docs.iter().map(|d| d.doc_id.as_str()).collect();
        let mut added: HashSet<String> = HashSet::new();
        let fresh: Vec<VectorHit> = hits
            .into_iter()
            .filter(|hit| !seen.contains(hit.id.as_str()) && added.insert(hit.id.clone()))
            .collect();

        self.hydrate(fresh)
            .await
            .map_err(|e| Error::Augmentation(e.to_string()))
    }

    async fn annotate(&self, scorer: &dyn RelevanceScorer, query: &str, docs: &mut [RetrievedDocument]) {
        if docs.is_empty() {
            return;
        }

        match scorer.score(query, docs).await {
            Ok(scores) if scores.len() == docs.len() => {
                for (doc, score) in docs.iter_mut().zip(scores) {
                    doc.relevance = Some(score);
                }
            }
            Ok(scores) => warn!(
                expected = docs.len(),
                got = scores.len(),
                scorer = scorer.model_name(),
                "Relevance scorer returned wrong number of scores; leaving results unannotated"
            ),
            Err(e) => warn!(
                error = %e,
                scorer = scorer.model_name(),
                "Relevance scoring failed; leaving results unannotated"
            ),
        }
    }
}
