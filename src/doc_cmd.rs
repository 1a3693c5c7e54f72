//! Document registry commands: `weave doc ...` and `weave sync`.
//!
//! Thin wrappers over [`DocumentService`](ragweave_core::documents::DocumentService)
//! that print a short human-readable summary of each operation.

use std::path::Path;

use anyhow::{bail, Result};
use walkdir::WalkDir;

use ragweave_core::models::Document;
use ragweave_core::ErrorKind;

use crate::app::{normalize_path, App};
use crate::config::Config;

/// File extensions picked up by `weave doc import`.
const IMPORT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

pub async fn run_add(config: &Config, path: &Path, name: Option<&str>, process: bool) -> Result<()> {
    let app = App::open(config).await?;
    let doc = app.documents.upload(&normalize_path(path), name).await?;

    println!("Registered {} ({})", doc.doc_name, doc.doc_id);
    if process {
        let chunks = app.documents.process(&doc.doc_id).await?;
        println!("  indexed {} chunks", chunks);
    }
    Ok(())
}

/// Register every supported file under `dir`. Already-registered paths
/// are skipped.
pub async fn run_import(config: &Config, dir: &Path, process: bool) -> Result<()> {
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    let app = App::open(config).await?;

    let mut added = 0usize;
    let mut skipped = 0usize;
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_importable(entry.path()) {
            continue;
        }

        match app.documents.upload(&normalize_path(entry.path()), None).await {
            Ok(doc) => {
                added += 1;
                println!("  + {} ({})", doc.doc_name, doc.doc_id);
            }
            Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::Empty) => {
                skipped += 1;
                println!("  - {}: {}", entry.path().display(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("import {}", dir.display());
    println!("  registered: {}", added);
    println!("  skipped: {}", skipped);

    if process && added > 0 {
        let report = app.documents.process_pending(added as i64).await?;
        println!("  processed: {} ({} chunks)", report.processed, report.chunks);
    }
    Ok(())
}

fn is_importable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMPORT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub async fn run_list(config: &Config, page: i64, per_page: i64) -> Result<()> {
    let app = App::open(config).await?;
    let page = app.documents.list(page, per_page).await?;

    if page.data.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:<34} {:<28} {:>8} {:>8}   {}",
        "ID", "NAME", "RAG", "GRAPH", "CREATED"
    );
    println!("{}", "-".repeat(96));
    for doc in &page.data {
        println!(
            "{:<34} {:<28} {:>8} {:>8}   {}",
            doc.doc_id,
            truncate(&doc.doc_name, 28),
            doc.sync_rag_state.to_string(),
            doc.sync_entity_state.to_string(),
            doc.ctime.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    println!(
        "page {} ({} per page), {} documents total",
        page.page, page.per_page, page.total
    );
    Ok(())
}

pub async fn run_get(config: &Config, doc_id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let doc = app.documents.get(doc_id).await?;
    print_document(&doc);
    Ok(())
}

fn print_document(doc: &Document) {
    println!("--- document ---");
    println!("id: {}", doc.doc_id);
    println!("name: {}", doc.doc_name);
    println!("path: {}", doc.file_path);
    println!("type: {}", doc.file_type);
    println!("hash: {}", doc.doc_hash);
    println!("rag_state: {}", doc.sync_rag_state);
    println!("entity_state: {}", doc.sync_entity_state);
    println!("created: {}", doc.ctime.to_rfc3339());
}

pub async fn run_delete(config: &Config, doc_id: &str) -> Result<()> {
    let app = App::open(config).await?;
    app.documents.delete(doc_id).await?;
    println!("Deleted {}", doc_id);
    Ok(())
}

pub async fn run_process(config: &Config, doc_id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let chunks = app.documents.process(doc_id).await?;
    println!("Processed {}: {} chunks", doc_id, chunks);
    Ok(())
}

/// Process up to `limit` documents whose vector index is still pending.
pub async fn run_sync(config: &Config, limit: i64) -> Result<()> {
    let app = App::open(config).await?;
    let report = app.documents.process_pending(limit).await?;

    println!("sync");
    println!("  processed: {}", report.processed);
    println!("  chunks: {}", report.chunks);
    println!("  failed: {}", report.failed.len());
    for failure in &report.failed {
        println!("    {}: {}", failure.doc_id, failure.error);
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
