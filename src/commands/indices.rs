//! Index registry commands
//!
//! `delete` removes catalog rows only. Sources, relations and store records
//! of a deleted index are left in place; use `docindex delete` on its files
//! first when their data should go too.

use crate::catalog::{CatalogDb, IndexRecord, IndexSettings};
use crate::config::Config;
use crate::error::{Error, Result};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

pub async fn cmd_list_indices(catalog: &CatalogDb) -> Result<Vec<IndexRecord>> {
    catalog.list_indices().await
}

/// Register a new index; file types default to the configured ones
pub async fn cmd_create_index(
    config: &Config,
    catalog: &CatalogDb,
    name: &str,
    file_types: Option<String>,
) -> Result<IndexRecord> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Index name must not be empty".to_string()));
    }
    if catalog.get_index_by_name(name).await?.is_some() {
        return Err(Error::Validation(format!("Index '{}' already exists", name)));
    }

    let settings = IndexSettings {
        supported_file_types: file_types
            .unwrap_or_else(|| config.indexing.supported_file_types.clone()),
    };
    let index = catalog.create_index(name, "FileIndex", &settings).await?;
    info!(index = %index.name, index_id = index.id, "Created index");
    Ok(index)
}

/// Delete index rows by id after showing them and asking for confirmation.
///
/// Returns the number of rows removed; 0 when nothing matched or the user
/// declined.
pub async fn cmd_delete_indices(catalog: &CatalogDb, ids: &[i64], yes: bool) -> Result<u64> {
    let matched = catalog.get_indices_by_ids(ids).await?;
    let missing = missing_ids(ids, &matched);
    if !missing.is_empty() {
        let listed: Vec<String> = missing.iter().map(i64::to_string).collect();
        println!("Note: The following IDs were not found: {}", listed.join(", "));
    }
    if matched.is_empty() {
        println!("No indices match the given ids.");
        return Ok(0);
    }

    println!("The following indices will be deleted:");
    print_indices(&matched);
    println!("Files and stored chunks of these indices are NOT removed.");

    if !yes && !confirm("Delete these indices?")? {
        println!("Aborted.");
        return Ok(0);
    }

    let matched_ids: Vec<i64> = matched.iter().map(|index| index.id).collect();
    let removed = catalog.delete_indices_by_ids(&matched_ids).await?;
    warn!(removed, "Deleted index rows; their sources and store records remain");
    Ok(removed)
}

/// Requested ids with no matching index, in request order without repeats
fn missing_ids(requested: &[i64], matched: &[IndexRecord]) -> Vec<i64> {
    let mut missing: Vec<i64> = Vec::new();
    for id in requested {
        if !matched.iter().any(|index| index.id == *id) && !missing.contains(id) {
            missing.push(*id);
        }
    }
    missing
}

fn confirm(prompt: &str) -> Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{} [y/N] ", prompt)?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(parse_confirmation(&answer))
}

fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub fn print_indices(indices: &[IndexRecord]) {
    if indices.is_empty() {
        println!("No indices. Use 'docindex indices create <name>' to add one.");
        return;
    }

    for index in indices {
        println!(
            "{:>4}  {}  [{}]  types: {}  created {}",
            index.id,
            index.name,
            index.index_type,
            index.settings().supported_file_types,
            index.created_at
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_confirmation() {
        assert!(parse_confirmation("y\n"));
        assert!(parse_confirmation(" YES "));
        assert!(!parse_confirmation("\n"));
        assert!(!parse_confirmation("nope"));
    }

    #[tokio::test]
    async fn test_missing_ids_reported() {
        let tmp = TempDir::new().unwrap();
        let catalog = CatalogDb::new(&tmp.path().join("catalog.db")).await.unwrap();
        let config = Config::default();

        let docs = cmd_create_index(&config, &catalog, "Docs", None).await.unwrap();
        let matched = catalog.get_indices_by_ids(&[docs.id, 42, 7, 42]).await.unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(missing_ids(&[docs.id, 42, 7, 42], &matched), vec![42, 7]);
        assert!(missing_ids(&[docs.id], &matched).is_empty());
    }

    #[tokio::test]
    async fn test_create_and_delete_indices() {
        let tmp = TempDir::new().unwrap();
        let catalog = CatalogDb::new(&tmp.path().join("catalog.db")).await.unwrap();
        let config = Config::default();

        let docs = cmd_create_index(&config, &catalog, "Docs", Some(".md".into()))
            .await
            .unwrap();
        assert_eq!(docs.supported_extensions(), vec![".md"]);

        let duplicate = cmd_create_index(&config, &catalog, "Docs", None).await;
        assert!(matches!(duplicate, Err(Error::Validation(_))));

        let removed = cmd_delete_indices(&catalog, &[docs.id, 42], true).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cmd_list_indices(&catalog).await.unwrap().is_empty());

        assert_eq!(cmd_delete_indices(&catalog, &[7], true).await.unwrap(), 0);
    }
}
