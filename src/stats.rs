//! Database statistics: `weave status`.
//!
//! Summarizes what is registered and indexed: document counts by sync
//! state, chunk and entity totals, chat log size and graph size. Useful
//! after `weave sync` to confirm documents moved out of `pending`.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::migrate;

pub struct Stats {
    pub documents: i64,
    pub rag_pending: i64,
    pub rag_synced: i64,
    pub entity_synced: i64,
    pub chunks: i64,
    pub entities: i64,
    pub chat_messages: i64,
    pub graph_nodes: i64,
    pub graph_relationships: i64,
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

pub async fn collect(pool: &SqlitePool) -> Result<Stats> {
    Ok(Stats {
        documents: count(pool, "SELECT COUNT(*) FROM documents").await?,
        rag_pending: count(pool, "SELECT COUNT(*) FROM documents WHERE sync_rag_state = 0").await?,
        rag_synced: count(pool, "SELECT COUNT(*) FROM documents WHERE sync_rag_state = 1").await?,
        entity_synced: count(pool, "SELECT COUNT(*) FROM documents WHERE sync_entity_state = 1").await?,
        chunks: count(pool, "SELECT COUNT(*) FROM document_chunks").await?,
        entities: count(pool, "SELECT COUNT(*) FROM entities").await?,
        chat_messages: count(pool, "SELECT COUNT(*) FROM chat_chunk").await?,
        graph_nodes: count(pool, "SELECT COUNT(*) FROM graph_nodes").await?,
        graph_relationships: count(pool, "SELECT COUNT(*) FROM graph_relationships").await?,
    })
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let stats = collect(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("ragweave status");
    println!("===============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Embedding:   {}", config.embedding.provider);
    println!("  LLM:         {}", config.llm.provider);
    println!();
    println!("  Documents:   {}", stats.documents);
    println!(
        "    indexed:   {} / {} ({} pending)",
        stats.rag_synced, stats.documents, stats.rag_pending
    );
    println!("    in graph:  {} / {}", stats.entity_synced, stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Entities:    {}", stats.entities);
    println!("  Chat:        {}", stats.chat_messages);
    println!(
        "  Graph:       {} nodes, {} relationships",
        stats.graph_nodes, stats.graph_relationships
    );
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
