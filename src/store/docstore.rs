//! SQLite-backed document store
//!
//! Keeps chunk text and metadata in a database file separate from the
//! catalog, so store writes never share a transaction with catalog writes.

use super::{ChunkRecord, DocumentStore};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const DOCSTORE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS docstore (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}'
);
"#;

const MAX_BIND_PARAMS: usize = 500;

#[derive(Debug, FromRow)]
struct DocRow {
    id: String,
    text: String,
    metadata_json: String,
}

impl DocRow {
    fn into_record(self) -> ChunkRecord {
        let metadata: Map<String, Value> =
            serde_json::from_str(&self.metadata_json).unwrap_or_default();
        ChunkRecord {
            id: self.id,
            text: self.text,
            metadata,
        }
    }
}

/// Document store handle
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        debug!("Opening document store at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(DOCSTORE_SCHEMA_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM docstore")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO docstore (id, text, metadata_json) VALUES (?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&record.id)
            .bind(&record.text)
            .bind(serde_json::to_string(&record.metadata)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Stored {} documents", records.len());
        Ok(())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkRecord>> {
        let mut found: HashMap<String, ChunkRecord> = HashMap::new();

        for batch in ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT id, text, metadata_json FROM docstore WHERE id IN ({})",
                vec!["?"; batch.len()].join(",")
            );
            let mut query = sqlx::query_as::<_, DocRow>(&sql);
            for id in batch {
                query = query.bind(id);
            }
            for row in query.fetch_all(&self.pool).await? {
                found.insert(row.id.clone(), row.into_record());
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for batch in ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "DELETE FROM docstore WHERE id IN ({})",
                vec!["?"; batch.len()].join(",")
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(id);
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!("Deleted {} documents", ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, text: &str) -> ChunkRecord {
        let metadata = match json!({"file_name": "a.txt"}) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ChunkRecord {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteDocumentStore::new(&tmp.path().join("docstore.db"))
            .await
            .unwrap();

        store
            .upsert(&[record("a", "alpha"), record("b", "beta")])
            .await
            .unwrap();
        store.upsert(&[record("a", "alpha v2")]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let ids = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        let fetched = store.get(&ids).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].id, "b");
        assert_eq!(fetched[1].text, "alpha v2");
        assert_eq!(fetched[1].metadata["file_name"], "a.txt");

        store.delete(&["a".to_string()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
