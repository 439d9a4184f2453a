//! Batch ingestion and deletion
//!
//! Drives the coordinator over a set of files. One file's failure never
//! stops the others; every file gets an entry in the report.

use crate::catalog::{CatalogDb, IndexRecord};
use crate::coordinator::{AddOutcome, DeleteOutcome, FileRef, IndexCoordinator};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Called before each file with (current, total, file); current is 1-based
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, &Path) + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Indexed,
    Skipped,
    Failed,
}

/// Outcome for one file of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub file_path: String,
    pub file_name: String,
    pub status: FileStatus,
    pub file_id: Option<String>,
    pub message: String,
}

/// Aggregate outcome of an indexing batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub success: bool,
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_files: usize,
    pub results: Vec<FileResult>,
}

impl BatchReport {
    fn push(&mut self, result: FileResult) {
        match result.status {
            FileStatus::Indexed => self.indexed += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed => self.errors += 1,
        }
        self.results.push(result);
    }

    fn finish(mut self) -> Self {
        self.total_files = self.results.len();
        self.success = self.errors == 0;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Deleted,
    NotFound,
    Failed,
}

/// Outcome for one deletion target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResult {
    pub target: String,
    pub status: DeleteStatus,
    pub file_id: Option<String>,
    pub message: String,
}

/// Aggregate outcome of a deletion batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteReport {
    pub success: bool,
    pub deleted: usize,
    pub not_found: usize,
    pub errors: usize,
    pub total: usize,
    pub results: Vec<DeleteResult>,
}

/// Pick an index by name or id.
///
/// With neither, `fallback_to_first` selects the oldest index; otherwise
/// that is a validation error.
pub async fn resolve_index(
    catalog: &CatalogDb,
    name: Option<&str>,
    id: Option<i64>,
    fallback_to_first: bool,
) -> Result<IndexRecord> {
    if let Some(name) = name {
        return catalog
            .get_index_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("Index", name));
    }

    if let Some(id) = id {
        return catalog
            .get_index(id)
            .await?
            .ok_or_else(|| Error::not_found("Index", id.to_string()));
    }

    if !fallback_to_first {
        return Err(Error::Validation("No index specified".to_string()));
    }

    let index = catalog
        .list_indices()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Validation("No indices available".to_string()))?;
    info!(index = %index.name, index_id = index.id, "Using default index");
    Ok(index)
}

/// Recursively list files under `folder` whose extension is in `extensions`
pub fn collect_files(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(Error::not_found("Folder", folder.display().to_string()));
    }
    if !folder.is_dir() {
        return Err(Error::Validation(format!(
            "{} is not a directory",
            folder.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()));
        if ext.is_some_and(|ext| extensions.contains(&ext)) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

pub struct BatchIndexer {
    coordinator: IndexCoordinator,
}

impl BatchIndexer {
    pub fn new(coordinator: IndexCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &IndexCoordinator {
        &self.coordinator
    }

    /// Index files in sorted path order
    pub async fn index_files(
        &self,
        mut files: Vec<PathBuf>,
        reindex: bool,
        user: Option<&str>,
        progress: Option<ProgressFn<'_>>,
    ) -> BatchReport {
        files.sort();
        let total = files.len();
        let mut report = BatchReport::default();

        for (position, path) in files.iter().enumerate() {
            if let Some(progress) = progress {
                progress(position + 1, total, path);
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let (status, file_id, message) = match self.coordinator.add(path, reindex, user).await {
                Ok(AddOutcome::Indexed { file_id, chunks }) => (
                    FileStatus::Indexed,
                    Some(file_id),
                    format!("File indexed successfully ({} chunks)", chunks),
                ),
                Ok(AddOutcome::Skipped { file_id, reason }) => {
                    (FileStatus::Skipped, Some(file_id), reason)
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to index file");
                    (FileStatus::Failed, None, e.to_string())
                }
            };

            report.push(FileResult {
                file_path: path.display().to_string(),
                file_name,
                status,
                file_id,
                message,
            });
        }

        let report = report.finish();
        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            errors = report.errors,
            total = report.total_files,
            "Batch indexing finished"
        );
        report
    }

    /// Index every supported file under `folder`
    pub async fn index_folder(
        &self,
        folder: &Path,
        reindex: bool,
        user: Option<&str>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<BatchReport> {
        let extensions = self.coordinator.index().supported_extensions();
        info!(
            index = %self.coordinator.index().name,
            types = %extensions.join(", "),
            "Scanning folder"
        );
        let files = collect_files(folder, &extensions)?;
        info!("Found {} files to index", files.len());
        Ok(self.index_files(files, reindex, user, progress).await)
    }

    /// Delete files by id or name
    pub async fn delete_files(&self, targets: &[String], user: Option<&str>) -> DeleteReport {
        let mut report = DeleteReport::default();

        for target in targets {
            let file_ref = FileRef::parse(target);
            let result = match self.coordinator.delete(&file_ref, user).await {
                Ok(DeleteOutcome::Deleted {
                    file_id,
                    documents,
                    vectors,
                    ..
                }) => {
                    report.deleted += 1;
                    DeleteResult {
                        target: target.clone(),
                        status: DeleteStatus::Deleted,
                        file_id: Some(file_id),
                        message: format!(
                            "Deleted {} documents and {} vectors",
                            documents, vectors
                        ),
                    }
                }
                Ok(DeleteOutcome::NotFound) => {
                    report.not_found += 1;
                    DeleteResult {
                        target: target.clone(),
                        status: DeleteStatus::NotFound,
                        file_id: None,
                        message: "File not found in index".to_string(),
                    }
                }
                Err(e) => {
                    warn!(target = %target, error = %e, "Failed to delete file");
                    report.errors += 1;
                    DeleteResult {
                        target: target.clone(),
                        status: DeleteStatus::Failed,
                        file_id: None,
                        message: e.to_string(),
                    }
                }
            };
            report.results.push(result);
        }

        report.total = report.results.len();
        report.success = report.errors == 0;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexSettings;
    use tempfile::TempDir;

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("nested/deeper")).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.TXT"), "a").unwrap();
        std::fs::write(tmp.path().join("nested/deeper/c.pdf"), "c").unwrap();
        std::fs::write(tmp.path().join("nested/skip.md"), "d").unwrap();

        let files = collect_files(tmp.path(), &[".pdf".to_string(), ".txt".to_string()]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.TXT", "b.txt", "nested/deeper/c.pdf"]);
    }

    #[test]
    fn test_collect_files_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = collect_files(&tmp.path().join("nope"), &[]).unwrap_err();
        assert!(matches!(missing, Error::NotFound { .. }));

        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let not_dir = collect_files(&file, &[]).unwrap_err();
        assert!(matches!(not_dir, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_resolve_index() {
        let tmp = TempDir::new().unwrap();
        let catalog = CatalogDb::new(&tmp.path().join("catalog.db")).await.unwrap();

        let none = resolve_index(&catalog, None, None, true).await.unwrap_err();
        assert!(matches!(none, Error::Validation(_)));

        let first = catalog
            .create_index("First", "FileIndex", &IndexSettings::default())
            .await
            .unwrap();
        catalog
            .create_index("Second", "FileIndex", &IndexSettings::default())
            .await
            .unwrap();

        let unspecified = resolve_index(&catalog, None, None, false).await.unwrap_err();
        assert!(matches!(unspecified, Error::Validation(msg) if msg == "No index specified"));

        assert_eq!(resolve_index(&catalog, None, None, true).await.unwrap().id, first.id);
        assert_eq!(
            resolve_index(&catalog, Some("Second"), None, false).await.unwrap().name,
            "Second"
        );
        assert!(matches!(
            resolve_index(&catalog, None, Some(99), false).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_report_serialization_shape() {
        let mut report = BatchReport::default();
        report.push(FileResult {
            file_path: "/x/a.txt".into(),
            file_name: "a.txt".into(),
            status: FileStatus::Failed,
            file_id: None,
            message: "boom".into(),
        });
        let report = report.finish();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["errors"], 1);
        assert_eq!(value["total_files"], 1);
        assert_eq!(value["results"][0]["status"], "failed");
    }
}
