//! Catalog storage using SQLite
//!
//! The catalog is the source of truth for what is indexed:
//! - Indices (named collections with their settings)
//! - Sources (one per ingested file)
//! - Index relations (pointers from a source to its document store and
//!   vector store records)
//!
//! Chunk payloads live in the external stores; the catalog only holds
//! their ids. Multi-row mutations go through `commit_footprint` and
//! `remove_footprint`, each of which runs in a single transaction.

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite caps bound parameters per statement; id lists are split below this.
const MAX_BIND_PARAMS: usize = 500;

/// Which store an index relation points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Document,
    Vector,
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationType::Document => write!(f, "document"),
            RelationType::Vector => write!(f, "vector"),
        }
    }
}

impl FromStr for RelationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "document" => Ok(RelationType::Document),
            "vector" => Ok(RelationType::Vector),
            _ => Err(Error::Validation(format!("Unknown relation type: {}", s))),
        }
    }
}

/// Settings stored alongside an index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "crate::config::default_supported_file_types")]
    pub supported_file_types: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            supported_file_types: crate::config::default_supported_file_types(),
        }
    }
}

/// A named index
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: i64,
    pub name: String,
    pub index_type: String,
    pub config_json: String,
    pub created_at: String,
}

impl IndexRecord {
    pub fn settings(&self) -> IndexSettings {
        serde_json::from_str(&self.config_json).unwrap_or_default()
    }

    /// Lowercased extensions, each with a leading dot
    pub fn supported_extensions(&self) -> Vec<String> {
        self.settings()
            .supported_file_types
            .split(',')
            .map(|ext| ext.trim().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| {
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect()
    }
}

/// An ingested file
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub index_id: i64,
    pub name: String,
    pub path: String,
    pub user: Option<String>,
    pub file_type: Option<String>,
    pub content_hash: String,
    pub size: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Source {
    pub fn new(index_id: i64, name: String, path: String, content_hash: String) -> Self {
        let now = Utc::now().to_rfc3339();
        let file_type = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()));
        Self {
            id: Uuid::new_v4().to_string(),
            index_id,
            name,
            path,
            user: None,
            file_type,
            content_hash,
            size: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One edge from a source to a chunk record in an external store
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IndexRelation {
    pub id: i64,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
}

impl IndexRelation {
    pub fn new(source_id: &str, target_id: &str, relation_type: RelationType) -> Self {
        Self {
            id: 0,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation_type: relation_type.to_string(),
        }
    }

    pub fn kind(&self) -> Result<RelationType> {
        self.relation_type.parse()
    }
}

/// Store record ids referenced by a source, split by store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Footprint {
    pub document_ids: Vec<String>,
    pub vector_ids: Vec<String>,
}

impl Footprint {
    fn from_relations(relations: &[IndexRelation]) -> Result<Self> {
        let mut footprint = Footprint::default();
        for relation in relations {
            match relation.kind()? {
                RelationType::Document => footprint.document_ids.push(relation.target_id.clone()),
                RelationType::Vector => footprint.vector_ids.push(relation.target_id.clone()),
            }
        }
        Ok(footprint)
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty() && self.vector_ids.is_empty()
    }
}

/// Catalog statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub index_count: usize,
    pub source_count: usize,
    pub relation_count: usize,
}

/// Catalog database handle
#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
}

impl CatalogDb {
    /// Open (and create if missing) the catalog at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        debug!("Connecting to catalog database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing catalog schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='sources'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Index Operations =====

    /// Register a new index
    pub async fn create_index(
        &self,
        name: &str,
        index_type: &str,
        settings: &IndexSettings,
    ) -> Result<IndexRecord> {
        let config_json = serde_json::to_string(settings)?;
        let id = sqlx::query(
            r#"
            INSERT INTO indices (name, index_type, config_json, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(index_type)
        .bind(&config_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_index(id)
            .await?
            .ok_or_else(|| Error::not_found("Index", id.to_string()))
    }

    /// Get index by numeric ID
    pub async fn get_index(&self, id: i64) -> Result<Option<IndexRecord>> {
        let index = sqlx::query_as::<_, IndexRecord>("SELECT * FROM indices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(index)
    }

    /// Get index by name
    pub async fn get_index_by_name(&self, name: &str) -> Result<Option<IndexRecord>> {
        let index = sqlx::query_as::<_, IndexRecord>("SELECT * FROM indices WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(index)
    }

    /// List all indices, oldest first
    pub async fn list_indices(&self) -> Result<Vec<IndexRecord>> {
        let indices = sqlx::query_as::<_, IndexRecord>("SELECT * FROM indices ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(indices)
    }

    /// Fetch the index rows matching `ids`
    pub async fn get_indices_by_ids(&self, ids: &[i64]) -> Result<Vec<IndexRecord>> {
        let mut found = Vec::new();
        for batch in ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT * FROM indices WHERE id IN ({}) ORDER BY id",
                placeholders(batch.len())
            );
            let mut query = sqlx::query_as::<_, IndexRecord>(&sql);
            for id in batch {
                query = query.bind(id);
            }
            found.extend(query.fetch_all(&self.pool).await?);
        }
        Ok(found)
    }

    /// Delete index rows by ID.
    ///
    /// Only the registry rows are removed; sources, relations and store
    /// records of those indices are left in place.
    pub async fn delete_indices_by_ids(&self, ids: &[i64]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for batch in ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!("DELETE FROM indices WHERE id IN ({})", placeholders(batch.len()));
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(id);
            }
            removed += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    // ===== Source Operations =====

    /// Get source by ID within an index
    pub async fn get_source(&self, index_id: i64, id: &str) -> Result<Option<Source>> {
        let source =
            sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE index_id = ? AND id = ?")
                .bind(index_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(source)
    }

    /// Find a user's source by file name
    pub async fn find_source_by_name(
        &self,
        index_id: i64,
        name: &str,
        user: Option<&str>,
    ) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>(
            r#"
            SELECT * FROM sources
            WHERE index_id = ? AND name = ? AND user IS ?
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(index_id)
        .bind(name)
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    /// Find a user's source by content hash
    pub async fn find_source_by_hash(
        &self,
        index_id: i64,
        content_hash: &str,
        user: Option<&str>,
    ) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>(
            r#"
            SELECT * FROM sources
            WHERE index_id = ? AND content_hash = ? AND user IS ?
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(index_id)
        .bind(content_hash)
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    /// List sources of an index, restricted to `user` when given
    pub async fn list_sources(&self, index_id: i64, user: Option<&str>) -> Result<Vec<Source>> {
        let sources = match user {
            Some(user) => {
                sqlx::query_as::<_, Source>(
                    "SELECT * FROM sources WHERE index_id = ? AND user = ? ORDER BY name",
                )
                .bind(index_id)
                .bind(user)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Source>(
                    "SELECT * FROM sources WHERE index_id = ? ORDER BY name",
                )
                .bind(index_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(sources)
    }

    // ===== Relation Operations =====

    /// All relations of a source
    pub async fn relations_for_source(&self, source_id: &str) -> Result<Vec<IndexRelation>> {
        let relations = sqlx::query_as::<_, IndexRelation>(
            "SELECT * FROM index_relations WHERE source_id = ? ORDER BY id",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(relations)
    }

    /// Target ids of the given relation type for a set of sources
    pub async fn target_ids_for_sources(
        &self,
        source_ids: &[String],
        relation_type: RelationType,
    ) -> Result<Vec<String>> {
        let mut targets = Vec::new();
        for batch in source_ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT target_id FROM index_relations WHERE relation_type = ? AND source_id IN ({}) ORDER BY id",
                placeholders(batch.len())
            );
            let mut query = sqlx::query_scalar::<_, String>(&sql).bind(relation_type.to_string());
            for id in batch {
                query = query.bind(id);
            }
            targets.extend(query.fetch_all(&self.pool).await?);
        }
        Ok(targets)
    }

    // ===== Transactional Footprint Operations =====

    /// Insert a source's relations, then the source row, in one transaction.
    ///
    /// Either every row becomes visible or none does.
    pub async fn commit_footprint(
        &self,
        source: &Source,
        relations: &[IndexRelation],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for relation in relations {
            sqlx::query(
                r#"
                INSERT INTO index_relations (source_id, target_id, relation_type)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(&relation.source_id)
            .bind(&relation.target_id)
            .bind(&relation.relation_type)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO sources (id, index_id, name, path, user, file_type, content_hash, size, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.id)
        .bind(source.index_id)
        .bind(&source.name)
        .bind(&source.path)
        .bind(&source.user)
        .bind(&source.file_type)
        .bind(&source.content_hash)
        .bind(source.size)
        .bind(&source.created_at)
        .bind(&source.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            source_id = %source.id,
            relations = relations.len(),
            "Committed source footprint"
        );
        Ok(())
    }

    /// Delete a source row and all of its relations in one transaction,
    /// returning the store ids those relations pointed at.
    pub async fn remove_footprint(&self, source_id: &str) -> Result<Footprint> {
        let mut tx = self.pool.begin().await?;

        let relations = sqlx::query_as::<_, IndexRelation>(
            "SELECT * FROM index_relations WHERE source_id = ? ORDER BY id",
        )
        .bind(source_id)
        .fetch_all(&mut *tx)
        .await?;
        let footprint = Footprint::from_relations(&relations)?;

        sqlx::query("DELETE FROM index_relations WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            source_id = %source_id,
            documents = footprint.document_ids.len(),
            vectors = footprint.vector_ids.len(),
            "Removed source footprint"
        );
        Ok(footprint)
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_stats(&self) -> Result<CatalogStats> {
        let index_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indices")
            .fetch_one(&self.pool)
            .await?;

        let source_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;

        let relation_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_relations")
            .fetch_one(&self.pool)
            .await?;

        Ok(CatalogStats {
            index_count: index_count as usize,
            source_count: source_count as usize,
            relation_count: relation_count as usize,
        })
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}
