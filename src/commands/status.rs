//! Status command implementation

use crate::catalog::{CatalogDb, CatalogStats};
use crate::config::Config;
use crate::error::Result;
use crate::store::{CollectionInfo, VectorStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub catalog_path: String,
    pub docstore_path: String,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub vector_store_connected: bool,
    pub collection: Option<CollectionInfo>,
    pub catalog: CatalogStats,
}

/// Gather catalog counts and vector collection info.
///
/// An unreachable vector store is reported, not returned as an error.
pub async fn cmd_status(
    config: &Config,
    catalog: &CatalogDb,
    vectors: &dyn VectorStore,
) -> Result<StatusInfo> {
    info!("Getting status");

    let stats = catalog.get_stats().await?;

    let (vector_store_connected, collection) = match vectors.info().await {
        Ok(info) => (true, info),
        Err(e) => {
            debug!("Vector store unavailable: {}", e);
            (false, None)
        }
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        catalog_path: config.paths.db_file.display().to_string(),
        docstore_path: config.paths.docstore_file.display().to_string(),
        qdrant_url: config.qdrant_url.clone(),
        collection_name: config.collection_name.clone(),
        embedding_model: config.embedding.model.clone(),
        vector_store_connected,
        collection,
        catalog: stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 docindex Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Catalog: {}", status.catalog_path);
    println!("Document store: {}", status.docstore_path);

    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);
    println!("  Collection: {}", status.collection_name);

    let connection = match (&status.collection, status.vector_store_connected) {
        (Some(_), true) => "✓ Connected",
        (None, true) => "⚠ Connected (collection not created - run 'docindex index' to create)",
        (_, false) => "✗ Not connected",
    };
    println!("  Status: {}", connection);
    if let Some(ref collection) = status.collection {
        println!("  Points: {}", collection.points_count);
        println!("  Indexed vectors: {}", collection.indexed_vectors_count);
        println!("  Health: {}", collection.status);
    }

    println!("\nEmbedding Model: {}", status.embedding_model);
    println!("\nCatalog:");
    println!("  Indices: {}", status.catalog.index_count);
    println!("  Files: {}", status.catalog.source_count);
    println!("  Relations: {}", status.catalog.relation_count);
}
