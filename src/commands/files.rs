//! File listing and deletion commands

use super::{IndexSelector, StoreHandles};
use crate::batch::{resolve_index, BatchIndexer, DeleteReport, DeleteStatus};
use crate::catalog::Source;
use crate::config::Config;
use crate::error::Result;
use tracing::info;

/// Files of the selected index (first index when none is selected)
pub async fn cmd_list_files(
    config: &Config,
    stores: &StoreHandles,
    selector: &IndexSelector,
    user: Option<String>,
) -> Result<Vec<Source>> {
    let index = resolve_index(
        &stores.catalog,
        selector.name.as_deref(),
        selector.id,
        true,
    )
    .await?;
    let user = config.effective_user(user);
    info!(index = %index.name, "Listing files");
    stores.catalog.list_sources(index.id, user.as_deref()).await
}

/// Delete files by id or name; the index must be named explicitly
pub async fn cmd_delete(
    config: &Config,
    stores: &StoreHandles,
    selector: &IndexSelector,
    targets: &[String],
    user: Option<String>,
) -> Result<DeleteReport> {
    let index = resolve_index(
        &stores.catalog,
        selector.name.as_deref(),
        selector.id,
        false,
    )
    .await?;
    let user = config.effective_user(user);
    let batch = BatchIndexer::new(stores.coordinator(config, index));
    Ok(batch.delete_files(targets, user.as_deref()).await)
}

pub fn print_files(files: &[Source]) {
    println!("\n📚 Indexed Files\n");

    if files.is_empty() {
        println!("No files indexed. Use 'docindex index' to add files.");
        return;
    }

    for file in files {
        println!("• {}", file.name);
        println!("  ID: {}", file.id);
        println!("  Path: {}", file.path);
        if let Some(user) = &file.user {
            println!("  Owner: {}", user);
        }
        println!("  Size: {} bytes", file.size);
        println!("  Updated: {}", file.updated_at);
        println!();
    }
}

pub fn print_delete_report(report: &DeleteReport) {
    for result in &report.results {
        match result.status {
            DeleteStatus::Deleted => println!("✓ {}: {}", result.target, result.message),
            DeleteStatus::NotFound => println!("• {}: {}", result.target, result.message),
            DeleteStatus::Failed => println!("✗ {}: {}", result.target, result.message),
        }
    }
    println!(
        "\nDeleted: {}, not found: {}, errors: {}",
        report.deleted, report.not_found, report.errors
    );
}
