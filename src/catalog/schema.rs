//! SQLite schema definition

/// SQL schema for the catalog database
pub const SCHEMA_SQL: &str = r#"
-- Indices: named collections of sources
CREATE TABLE IF NOT EXISTS indices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    index_type TEXT NOT NULL,
    config_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

-- Sources: one row per ingested file
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    index_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    user TEXT,
    file_type TEXT,
    content_hash TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Index relations: source -> document store / vector store records
CREATE TABLE IF NOT EXISTS index_relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    UNIQUE(source_id, target_id, relation_type)
);

-- One file name per owner per index
CREATE UNIQUE INDEX IF NOT EXISTS idx_sources_owner_name
    ON sources(index_id, name, COALESCE(user, ''));

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_sources_hash ON sources(index_id, content_hash);
CREATE INDEX IF NOT EXISTS idx_relations_source ON index_relations(source_id, relation_type);
CREATE INDEX IF NOT EXISTS idx_relations_target ON index_relations(target_id);
"#;
