//! Knowledge-graph commands: `weave graph ...`.

use anyhow::Result;

use crate::app::App;
use crate::config::Config;

/// Project a document and its extracted entities into the graph.
pub async fn run_sync(config: &Config, doc_id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let summary = app.graph_sync.sync_document(doc_id).await?;
    println!("graph sync {}", doc_id);
    println!("  entities: {}", summary.entities);
    println!("  relationships: {}", summary.relationships);
    Ok(())
}

pub async fn run_entities(config: &Config, doc_id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let entities = app.document_graph().entities_of(doc_id).await?;

    if entities.is_empty() {
        println!("No entities linked to {}.", doc_id);
        return Ok(());
    }
    println!("{:<10} {:<16} {:<24} {}", "ID", "TYPE", "NAME", "VALUE");
    println!("{}", "-".repeat(76));
    for entity in &entities {
        println!(
            "{:<10} {:<16} {:<24} {}",
            entity.id, entity.attrs.entity_type, entity.attrs.entity_name, entity.attrs.entity_value
        );
    }
    Ok(())
}

/// Documents reachable over reference and relatedness edges, plus
/// similarity neighbours with their scores.
pub async fn run_related(config: &Config, doc_id: &str, depth: u32, limit: usize) -> Result<()> {
    let app = App::open(config).await?;
    let graph = app.document_graph();

    let related = graph.related_documents(doc_id, depth).await?;
    let similar = graph.find_similar(doc_id, limit).await?;

    println!("related to {} (depth {})", doc_id, depth.max(1));
    if related.is_empty() {
        println!("  (none)");
    }
    for doc in related.iter().take(limit) {
        println!("  {} {}", doc.id, doc.attrs.doc_name);
    }

    println!("similar");
    if similar.is_empty() {
        println!("  (none)");
    }
    for (doc, score) in &similar {
        println!("  [{:.3}] {} {}", score, doc.id, doc.attrs.doc_name);
    }
    Ok(())
}
