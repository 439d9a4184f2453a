//! Qdrant vector store
//!
//! Points are keyed by chunk id (UUID strings) and carry the chunk text
//! and metadata in their payload. Vector search runs server side; text
//! and hybrid ranking score the filtered candidate set locally with BM25.

use super::{
    diversify, fuse_hybrid, into_hits, mmr_fetch_limit, rank_by_text, to_qdrant_payload,
    from_qdrant_payload, Candidate, ChunkRecord, CollectionInfo, MetadataFilter, RetrievalMode,
    VectorHit, VectorQuery, VectorStore,
};
use crate::config::Config;
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, GetCollectionInfoResponse, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::sync::Arc;
use tracing::{debug, info};

/// Payload fields that get a keyword index on collection creation
const INDEXED_FIELDS: [&str; 3] = ["file_id", "file_name", "page_label"];

const SCROLL_PAGE_SIZE: u32 = 256;

/// Qdrant store handle
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl QdrantVectorStore {
    /// Connect to Qdrant using config
    pub async fn connect(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
            &config.collection_name,
            embedder,
            config.embedding.batch_size,
        )
        .await
    }

    /// Create a new store connection directly with URL and collection name
    pub async fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            embedder,
            batch_size,
        })
    }

    /// Get the expected vector dimension for this store
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Ensure the collection exists with correct configuration
    pub async fn ensure_collection(&self) -> Result<()> {
        let dimension = self.dimension();

        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);

            let info = self.client.collection_info(&self.collection).await?;
            if let Some(size) = extract_vector_size(&info) {
                if size as usize != dimension {
                    return Err(Error::Qdrant(format!(
                        "Collection '{}' has vector size {}, but model '{}' produces {}. Use a new collection name or re-index.",
                        self.collection,
                        size,
                        self.embedder.model_name(),
                        dimension
                    )));
                }
            }
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, dimension
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await?;

        for field in INDEXED_FIELDS {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field,
                    FieldType::Keyword,
                ))
                .await?;
        }

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Embedder returned no vector for query".to_string()))
    }

    async fn search_candidates(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        filter: Option<Filter>,
    ) -> Result<Vec<Candidate>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, limit
        );

        let mut search = SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
            .with_payload(true);
        if let Some(filter) = filter {
            search = search.filter(filter);
        }

        let response = self.client.search_points(search).await?;
        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let (text, metadata) = from_qdrant_payload(point.payload);
                Candidate {
                    id: point_id_to_string(point.id),
                    text,
                    score: point.score,
                    vector: None,
                    metadata,
                }
            })
            .collect())
    }

    /// Every point matching `filter`, in scroll order
    async fn scroll_candidates(&self, filter: Option<Filter>) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut scroll = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(ref filter) = filter {
                scroll = scroll.filter(filter.clone());
            }
            if let Some(ref o) = offset {
                scroll = scroll.offset(o.clone());
            }

            let response = self.client.scroll(scroll).await?;
            if response.result.is_empty() {
                break;
            }

            for point in response.result {
                let (text, metadata) = from_qdrant_payload(point.payload);
                candidates.push(Candidate {
                    id: point_id_to_string(point.id),
                    text,
                    score: 0.0,
                    vector: None,
                    metadata,
                });
            }

            offset = response.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(candidates)
    }

    async fn vector_ranked(&self, query: &VectorQuery, filter: Option<Filter>) -> Result<Vec<Candidate>> {
        let query_vector = self.embed_query(&query.text).await?;
        let limit = match query.mmr_threshold {
            Some(_) => mmr_fetch_limit(query.top_k),
            None => query.top_k,
        };
        let mut candidates = self
            .search_candidates(query_vector.clone(), limit, filter)
            .await?;

        if let Some(lambda) = query.mmr_threshold {
            // search results come back without vectors; re-embed the candidates
            let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
            let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size).await?;
            for (candidate, vector) in candidates.iter_mut().zip(vectors) {
                candidate.vector = Some(vector);
            }
            candidates = diversify(&query_vector, candidates, query.top_k, lambda);
        }

        Ok(candidates)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn info(&self) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(&self.collection).await?;
        Ok(info.result.map(|result| CollectionInfo {
            points_count: result.points_count.unwrap_or(0),
            indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
            status: format!("{:?}", result.status()),
        }))
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size).await?;

        let dimension = self.dimension();
        if let Some(mismatch) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {} (got {})",
                self.collection,
                dimension,
                mismatch.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            records.len(),
            self.collection
        );

        let points: Vec<PointStruct> = records
            .iter()
            .zip(vectors)
            .map(|(record, vector)| {
                PointStruct::new(
                    record.id.clone(),
                    vector,
                    to_qdrant_payload(&record.text, &record.metadata),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;

        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        debug!(
            "Deleting {} points from collection {}",
            ids.len(),
            self.collection
        );

        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(point_ids)
                    .wait(true),
            )
            .await?;

        Ok(())
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorHit>> {
        if query.top_k == 0 || matches!(query.scope, Some(ref scope) if scope.is_empty()) {
            return Ok(Vec::new());
        }

        let filter = build_filter(query);

        match query.mode {
            RetrievalMode::Vector => Ok(into_hits(self.vector_ranked(query, filter).await?)),
            RetrievalMode::Text => {
                let candidates = self.scroll_candidates(filter).await?;
                Ok(into_hits(rank_by_text(&query.text, candidates, query.top_k)))
            }
            RetrievalMode::Hybrid => {
                let vector = self.vector_ranked(query, filter.clone()).await?;
                let candidates = self.scroll_candidates(filter).await?;
                let text = rank_by_text(&query.text, candidates, query.top_k);
                Ok(fuse_hybrid(vector, text, query.top_k))
            }
        }
    }
}

impl MetadataFilter {
    /// Translate into a Qdrant condition
    pub fn to_qdrant_condition(&self) -> Condition {
        match self {
            MetadataFilter::Eq { key, value } => Condition::matches(key.as_str(), value.clone()),
            MetadataFilter::In { key, values } => Condition::matches(key.as_str(), values.clone()),
            MetadataFilter::And(filters) => {
                Filter::must(filters.iter().map(MetadataFilter::to_qdrant_condition)).into()
            }
            MetadataFilter::Or(filters) => {
                Filter::should(filters.iter().map(MetadataFilter::to_qdrant_condition)).into()
            }
        }
    }
}

/// Combine scope and metadata filter into one Qdrant filter
fn build_filter(query: &VectorQuery) -> Option<Filter> {
    let mut must: Vec<Condition> = Vec::new();

    if let Some(ref scope) = query.scope {
        let ids: Vec<PointId> = scope.iter().map(|id| PointId::from(id.clone())).collect();
        must.push(Condition::has_id(ids));
    }

    if let Some(ref filter) = query.filter {
        must.push(filter.to_qdrant_condition());
    }

    if must.is_empty() {
        None
    } else {
        Some(Filter::must(must))
    }
}

fn extract_vector_size(info: &GetCollectionInfoResponse) -> Option<u64> {
    let config = info
        .result
        .as_ref()?
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;

    match config {
        qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size),
        qdrant_client::qdrant::vectors_config::Config::ParamsMap(_) => None,
    }
}

/// Convert PointId to string
fn point_id_to_string(id: Option<PointId>) -> String {
    match id {
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)),
        }) => uuid,
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)),
        }) => num.to_string(),
        _ => String::new(),
    }
}
