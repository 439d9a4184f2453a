//! Init command implementation

use crate::catalog::{CatalogDb, IndexRecord, IndexSettings};
use crate::config::{default_index_name, Config};
use crate::error::{Error, Result};
use crate::store::SqliteDocumentStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub config_path: String,
    pub catalog_path: String,
    pub docstore_path: String,
    pub index: IndexRecord,
    pub created_index: bool,
}

/// Write a default config, create both SQLite files and the default index
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    if options.config_path.exists() && !options.force {
        return Err(Error::AlreadyInitialized(
            options.config_path.display().to_string(),
        ));
    }

    let mut config = Config::default();
    config.init_paths(Some(options.base_dir));
    config.paths.config_file = options.config_path;
    config.save()?;

    let catalog = CatalogDb::new(&config.paths.db_file).await?;
    SqliteDocumentStore::new(&config.paths.docstore_file).await?;

    let name = default_index_name();
    let (index, created_index) = match catalog.get_index_by_name(&name).await? {
        Some(existing) => (existing, false),
        None => {
            let settings = IndexSettings {
                supported_file_types: config.indexing.supported_file_types.clone(),
            };
            (catalog.create_index(&name, "FileIndex", &settings).await?, true)
        }
    };

    info!(index = %index.name, index_id = index.id, "docindex initialized");

    Ok(InitReport {
        config_path: config.paths.config_file.display().to_string(),
        catalog_path: config.paths.db_file.display().to_string(),
        docstore_path: config.paths.docstore_file.display().to_string(),
        index,
        created_index,
    })
}

pub fn print_init_report(report: &InitReport) {
    println!("✓ docindex initialized successfully");
    println!("  Config: {}", report.config_path);
    println!("  Catalog: {}", report.catalog_path);
    println!("  Document store: {}", report.docstore_path);
    if report.created_index {
        println!("  Created index '{}' (id {})", report.index.name, report.index.id);
    }
    println!("\nNext steps:");
    println!("  1. Edit the config file to choose embedding and reranker backends");
    println!("  2. Start Qdrant: docker run -p 6333:6333 qdrant/qdrant");
    println!("  3. Index files: docindex index /path/to/folder");
}
