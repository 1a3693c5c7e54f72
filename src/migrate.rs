//! Database schema creation.
//!
//! All statements use `IF NOT EXISTS`, so `weave init` can be run any
//! number of times.
//!
//! # Tables
//!
//! | Table | Contents |
//! |-------|----------|
//! | `documents` | Registry rows with the two sync flags |
//! | `document_chunks` | Chunk text plus its embedding literal |
//! | `entities` | Facts extracted from a document |
//! | `chat_chunk` | Conversation log |
//! | `graph_nodes` | Knowledge-graph nodes, attributes as JSON |
//! | `graph_relationships` | Typed edges between graph nodes |
//!
//! Chunks and entities cascade with their document; relationships cascade
//! with either endpoint. Timestamps are microseconds since the Unix epoch.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            doc_id TEXT PRIMARY KEY,
            doc_name TEXT NOT NULL,
            doc_hash TEXT NOT NULL,
            file_path TEXT NOT NULL UNIQUE,
            file_type TEXT NOT NULL DEFAULT '',
            sync_rag_state INTEGER NOT NULL DEFAULT 0,
            sync_entity_state INTEGER NOT NULL DEFAULT 0,
            ctime INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            ctime INTEGER NOT NULL,
            UNIQUE(doc_id, chunk_index),
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_name TEXT NOT NULL,
            entity_value TEXT NOT NULL DEFAULT '',
            metadata TEXT NOT NULL DEFAULT '{}',
            ctime INTEGER NOT NULL,
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_chunk (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            ctime INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}',
            additional_attributes TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_relationships (
            id TEXT PRIMARY KEY,
            rel_type TEXT NOT NULL,
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (from_id) REFERENCES graph_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (to_id) REFERENCES graph_nodes(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_documents_ctime ON documents(ctime)",
        "CREATE INDEX IF NOT EXISTS idx_documents_rag_state ON documents(sync_rag_state)",
        "CREATE INDEX IF NOT EXISTS idx_entities_doc ON entities(doc_id)",
        "CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type)",
        "CREATE INDEX IF NOT EXISTS idx_chat_chunk_index ON chat_chunk(chunk_index)",
        "CREATE INDEX IF NOT EXISTS idx_chat_role ON chat_chunk(role)",
        "CREATE INDEX IF NOT EXISTS idx_graph_nodes_label ON graph_nodes(label)",
        "CREATE INDEX IF NOT EXISTS idx_graph_rel_from ON graph_relationships(from_id, rel_type)",
        "CREATE INDEX IF NOT EXISTS idx_graph_rel_to ON graph_relationships(to_id, rel_type)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}
