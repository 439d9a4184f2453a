//! CLI commands implementation

pub mod files;
pub mod index;
pub mod indices;
pub mod init;
pub mod query;
pub mod status;

pub use files::*;
pub use index::*;
pub use indices::*;
pub use init::*;
pub use query::*;
pub use status::*;

use crate::catalog::{CatalogDb, IndexRecord};
use crate::config::Config;
use crate::coordinator::IndexCoordinator;
use crate::embed::create_embedder;
use crate::error::Result;
use crate::loader::PlainTextLoader;
use crate::store::{DocumentStore, QdrantVectorStore, SqliteDocumentStore, VectorStore};
use std::sync::Arc;
use tracing::debug;

/// Store handles shared by the commands
#[derive(Clone)]
pub struct StoreHandles {
    pub catalog: CatalogDb,
    pub vectors: Arc<dyn VectorStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl StoreHandles {
    /// Open the catalog and docstore, connect to Qdrant and ensure the collection
    pub async fn open(config: &Config) -> Result<Self> {
        let catalog = CatalogDb::new(&config.paths.db_file).await?;
        let documents = SqliteDocumentStore::new(&config.paths.docstore_file).await?;

        let embedder = create_embedder(&config.embedding)?;
        let vectors = QdrantVectorStore::connect(config, embedder).await?;
        vectors.ensure_collection().await?;
        debug!(collection = %config.collection_name, "Stores ready");

        Ok(Self {
            catalog,
            vectors: Arc::new(vectors),
            documents: Arc::new(documents),
        })
    }

    /// Coordinator for `index` configured from `config`
    pub fn coordinator(&self, config: &Config, index: IndexRecord) -> IndexCoordinator {
        IndexCoordinator::new(
            self.catalog.clone(),
            index,
            self.vectors.clone(),
            self.documents.clone(),
            Arc::new(PlainTextLoader::new(config.indexing.max_chunk_chars)),
        )
        .with_content_hash_matching(config.indexing.match_content_hash)
    }
}

/// How the caller picked an index on the command line
#[derive(Debug, Clone, Default)]
pub struct IndexSelector {
    pub name: Option<String>,
    pub id: Option<i64>,
}
