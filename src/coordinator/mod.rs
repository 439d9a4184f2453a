//! Index coordinator
//!
//! Adds and deletes files across the catalog, the document store and the
//! vector store. There is no transaction spanning all three, so writes are
//! ordered to keep the catalog truthful:
//!
//! - add: document store, then vector store, then one catalog transaction
//!   (relations first, source row last)
//! - delete: one catalog transaction, then vector store, then document store
//!
//! A crash between steps can leave unreferenced store records (orphans), but
//! never a catalog relation pointing at a missing record.

mod locks;

pub use locks::KeyedLocks;

use crate::catalog::{CatalogDb, Footprint, IndexRecord, IndexRelation, RelationType, Source};
use crate::error::{Error, Result};
use crate::loader::ChunkLoader;
use crate::store::{ChunkMetadata, ChunkRecord, DocumentStore, VectorStore};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a successful `add`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AddOutcome {
    Indexed { file_id: String, chunks: usize },
    Skipped { file_id: String, reason: String },
}

impl AddOutcome {
    pub fn file_id(&self) -> &str {
        match self {
            AddOutcome::Indexed { file_id, .. } | AddOutcome::Skipped { file_id, .. } => file_id,
        }
    }
}

/// Result of a successful `delete`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted {
        file_id: String,
        file_name: String,
        documents: usize,
        vectors: usize,
    },
    NotFound,
}

/// How a caller names the file to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Id(String),
    Name(String),
}

impl FileRef {
    /// UUID-looking strings are ids, anything else a file name
    pub fn parse(value: &str) -> Self {
        match Uuid::try_parse(value) {
            Ok(_) => FileRef::Id(value.to_string()),
            Err(_) => FileRef::Name(value.to_string()),
        }
    }
}

/// Progress notifications emitted while adding a file
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    Started { file_name: String },
    ChunksLoaded { count: usize },
    PreviousFootprintRemoved { file_id: String, documents: usize, vectors: usize },
    DocumentsStored { count: usize },
    VectorsStored { count: usize },
}

/// Coordinates writes for one index
pub struct IndexCoordinator {
    catalog: CatalogDb,
    index: IndexRecord,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
    loader: Arc<dyn ChunkLoader>,
    locks: Arc<KeyedLocks>,
    match_content_hash: bool,
}

impl IndexCoordinator {
    pub fn new(
        catalog: CatalogDb,
        index: IndexRecord,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        loader: Arc<dyn ChunkLoader>,
    ) -> Self {
        Self {
            catalog,
            index,
            vectors,
            documents,
            loader,
            locks: Arc::new(KeyedLocks::new()),
            match_content_hash: false,
        }
    }

    /// Treat an identical file under another name as already indexed
    pub fn with_content_hash_matching(mut self, enabled: bool) -> Self {
        self.match_content_hash = enabled;
        self
    }

    /// Share a lock table with other coordinators of the same process
    pub fn with_locks(mut self, locks: Arc<KeyedLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn index(&self) -> &IndexRecord {
        &self.index
    }

    pub fn catalog(&self) -> &CatalogDb {
        &self.catalog
    }

    fn lock_key(&self, user: Option<&str>, name: &str) -> String {
        format!("{}\u{0}{}\u{0}{}", self.index.id, user.unwrap_or(""), name)
    }

    /// Index one file
    pub async fn add(&self, path: &Path, reindex: bool, user: Option<&str>) -> Result<AddOutcome> {
        self.add_with_events(path, reindex, user, None).await
    }

    /// Index one file, reporting progress on `events`
    pub async fn add_with_events(
        &self,
        path: &Path,
        reindex: bool,
        user: Option<&str>,
        events: Option<&UnboundedSender<IndexEvent>>,
    ) -> Result<AddOutcome> {
        let emit = |event: IndexEvent| {
            if let Some(tx) = events {
                // receiver may be gone; progress is best effort
                let _ = tx.send(event);
            }
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Validation(format!("No file name in {}", path.display())))?;

        let _guard = self.locks.lock(&self.lock_key(user, &name)).await;
        emit(IndexEvent::Started {
            file_name: name.clone(),
        });

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Load(format!("Failed to read {}: {}", path.display(), e)))?;
        let content_hash = blake3::hash(&bytes).to_hex().to_string();

        let by_name = self
            .catalog
            .find_source_by_name(self.index.id, &name, user)
            .await?;
        let by_hash = match (&by_name, self.match_content_hash) {
            (None, true) => {
                self.catalog
                    .find_source_by_hash(self.index.id, &content_hash, user)
                    .await?
            }
            _ => None,
        };

        let previous = by_name.or(by_hash);

        if !reindex {
            if let Some(existing) = previous.as_ref() {
                info!(
                    file_id = %existing.id,
                    file_name = %name,
                    "File already indexed, skipping"
                );
                return Ok(AddOutcome::Skipped {
                    file_id: existing.id.clone(),
                    reason: format!("already indexed as '{}'", existing.name),
                });
            }
        }

        let size = bytes.len() as i64;
        let chunks = self.loader.load_bytes(path, bytes).await?;
        emit(IndexEvent::ChunksLoaded {
            count: chunks.len(),
        });

        let mut source = Source::new(
            self.index.id,
            name.clone(),
            path.to_string_lossy().to_string(),
            content_hash,
        );
        source.user = user.map(str::to_string);
        source.size = size;

        if let Some(previous) = previous {
            let footprint = self.remove_footprint(&previous).await?;
            emit(IndexEvent::PreviousFootprintRemoved {
                file_id: previous.id.clone(),
                documents: footprint.document_ids.len(),
                vectors: footprint.vector_ids.len(),
            });
            source.id = previous.id;
            source.created_at = previous.created_at;
            source.updated_at = Utc::now().to_rfc3339();
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, chunk)| {
                let metadata = ChunkMetadata {
                    file_id: source.id.clone(),
                    file_name: name.clone(),
                    page_label: chunk.page_label,
                    user: source.user.clone(),
                    chunk_index: chunk_index as i64,
                };
                ChunkRecord {
                    id: Uuid::new_v4().to_string(),
                    text: chunk.text,
                    metadata: metadata.to_map(),
                }
            })
            .collect();

        if !records.is_empty() {
            self.documents.upsert(&records).await?;
            emit(IndexEvent::DocumentsStored {
                count: records.len(),
            });

            self.vectors.upsert(&records).await?;
            emit(IndexEvent::VectorsStored {
                count: records.len(),
            });
        }

        let relations: Vec<IndexRelation> = records
            .iter()
            .flat_map(|record| {
                [
                    IndexRelation::new(&source.id, &record.id, RelationType::Document),
                    IndexRelation::new(&source.id, &record.id, RelationType::Vector),
                ]
            })
            .collect();

        match self.catalog.commit_footprint(&source, &relations).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation() => {
                warn!(
                    file_name = %name,
                    orphaned_chunks = records.len(),
                    "Lost indexing race for file; store records left orphaned"
                );
                let winner = self
                    .catalog
                    .find_source_by_name(self.index.id, &name, user)
                    .await?
                    .map(|s| s.id)
                    .unwrap_or_default();
                return Ok(AddOutcome::Skipped {
                    file_id: winner,
                    reason: "indexed concurrently by another writer".to_string(),
                });
            }
            Err(e) => return Err(e),
        }

        info!(
            file_id = %source.id,
            file_name = %name,
            chunks = records.len(),
            "Indexed file"
        );

        Ok(AddOutcome::Indexed {
            file_id: source.id,
            chunks: records.len(),
        })
    }

    /// Delete one file and its store records
    pub async fn delete(&self, target: &FileRef, user: Option<&str>) -> Result<DeleteOutcome> {
        let resolved = match target {
            FileRef::Id(id) => self
                .catalog
                .get_source(self.index.id, id)
                .await?
                .filter(|s| user.is_none() || s.user.as_deref() == user),
            FileRef::Name(name) => {
                self.catalog
                    .find_source_by_name(self.index.id, name, user)
                    .await?
            }
        };

        let Some(resolved) = resolved else {
            debug!(?target, "Nothing to delete");
            return Ok(DeleteOutcome::NotFound);
        };

        let _guard = self
            .locks
            .lock(&self.lock_key(resolved.user.as_deref(), &resolved.name))
            .await;

        // a concurrent delete or reindex may have won while we waited
        let Some(source) = self.catalog.get_source(self.index.id, &resolved.id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };

        let footprint = self.remove_footprint(&source).await?;

        info!(
            file_id = %source.id,
            file_name = %source.name,
            documents = footprint.document_ids.len(),
            vectors = footprint.vector_ids.len(),
            "Deleted file"
        );

        Ok(DeleteOutcome::Deleted {
            file_id: source.id,
            file_name: source.name,
            documents: footprint.document_ids.len(),
            vectors: footprint.vector_ids.len(),
        })
    }

    /// Files of this index owned by `user` (all files when `None`)
    pub async fn list_files(&self, user: Option<&str>) -> Result<Vec<Source>> {
        self.catalog.list_sources(self.index.id, user).await
    }

    /// Commit the catalog removal, then clean both stores.
    ///
    /// Store failures after the commit only leak orphans and are logged.
    async fn remove_footprint(&self, source: &Source) -> Result<Footprint> {
        let footprint = self.catalog.remove_footprint(&source.id).await?;

        if !footprint.vector_ids.is_empty() {
            if let Err(e) = self.vectors.delete(&footprint.vector_ids).await {
                warn!(
                    file_id = %source.id,
                    orphaned = footprint.vector_ids.len(),
                    error = %e,
                    "Vector store cleanup failed; records orphaned"
                );
            }
        }

        if !footprint.document_ids.is_empty() {
            if let Err(e) = self.documents.delete(&footprint.document_ids).await {
                warn!(
                    file_id = %source.id,
                    orphaned = footprint.document_ids.len(),
                    error = %e,
                    "Document store cleanup failed; records orphaned"
                );
            }
        }

        Ok(footprint)
    }
}
