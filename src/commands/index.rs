//! Index command implementation

use super::{IndexSelector, StoreHandles};
use crate::batch::{resolve_index, BatchIndexer, BatchReport, FileStatus, ProgressFn};
use crate::config::Config;
use crate::error::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub paths: Vec<PathBuf>,
    pub reindex: bool,
    pub user: Option<String>,
    pub index: IndexSelector,
}

/// Index a folder (one directory argument) or a list of files.
///
/// A folder run without an explicit index falls back to the first index;
/// a file list requires one.
pub async fn cmd_index(
    config: &Config,
    stores: &StoreHandles,
    options: IndexOptions,
    progress: Option<ProgressFn<'_>>,
) -> Result<BatchReport> {
    let folder = match options.paths.as_slice() {
        [single] if single.is_dir() => Some(single.clone()),
        _ => None,
    };

    let index = resolve_index(
        &stores.catalog,
        options.index.name.as_deref(),
        options.index.id,
        folder.is_some(),
    )
    .await?;
    info!(index = %index.name, index_id = index.id, "Indexing into");

    let user = config.effective_user(options.user);
    let batch = BatchIndexer::new(stores.coordinator(config, index));

    match folder {
        Some(folder) => {
            batch
                .index_folder(&folder, options.reindex, user.as_deref(), progress)
                .await
        }
        None => Ok(batch
            .index_files(options.paths, options.reindex, user.as_deref(), progress)
            .await),
    }
}

pub fn print_batch_report(report: &BatchReport) {
    for result in &report.results {
        let marker = match result.status {
            FileStatus::Indexed => "✓",
            FileStatus::Skipped => "•",
            FileStatus::Failed => "✗",
        };
        println!("{} {}: {}", marker, result.file_name, result.message);
    }

    println!("\n{} Indexing complete", if report.success { "✓" } else { "⚠" });
    println!("  Files: {}", report.total_files);
    println!("  Indexed: {}", report.indexed);
    println!("  Skipped: {}", report.skipped);
    println!("  Errors: {}", report.errors);
}
