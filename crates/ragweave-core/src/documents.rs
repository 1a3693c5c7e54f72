//! Document lifecycle: upload, list, delete, and vector-index sync.
//!
//! The registry row is the source of truth for whether a document's
//! chunks are current. [`DocumentService::process`] is the only place
//! that flips `sync_rag_state` to `Synced`; a failure or a dropped future
//! leaves it `Pending`, and [`DocumentService::process_pending`] picks it
//! up again on the next reconciliation pass.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::loader::extension_of;
use crate::models::{Document, SyncState};
use crate::processor::DocumentProcessor;
use crate::store::{ChunkStore, DocumentStore, EntityStore};

pub const MAX_PER_PAGE: i64 = 100;

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessFailure {
    pub doc_id: String,
    pub error: String,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub chunks: usize,
    pub failed: Vec<ProcessFailure>,
}

/// Document ids are derived from the path, so one path maps to one id.
pub fn document_id_for(file_path: &str) -> String {
    sha256_hex(file_path.as_bytes())
}

pub fn content_hash(bytes: &[u8]) -> String {
    sha256_hex(bytes)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub struct DocumentService {
    documents: Arc<dyn DocumentStore>,
    chunks: Arc<dyn ChunkStore>,
    entities: Arc<dyn EntityStore>,
    processor: Arc<DocumentProcessor>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        chunks: Arc<dyn ChunkStore>,
        entities: Arc<dyn EntityStore>,
        processor: Arc<DocumentProcessor>,
    ) -> Self {
        Self {
            documents,
            chunks,
            entities,
            processor,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register the file at `path`.
    ///
    /// The path is checked against the registry before the file is read,
    /// so a duplicate upload never touches the disk beyond the existence
    /// check. `name` defaults to the file's basename.
    pub async fn upload(&self, path: &Path, name: Option<&str>) -> Result<Document> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(Error::NotFound(format!("file {}", path.display()))),
        }

        let file_path = path.to_string_lossy().to_string();
        if self.documents.get_by_path(&file_path).await?.is_some() {
            return Err(Error::Conflict(format!(
                "document already exists with path: {file_path}"
            )));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Upstream(format!("read {}: {e}", path.display())))?;

        let doc_name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file_path.clone()),
        };

        let doc = Document {
            doc_id: document_id_for(&file_path),
            doc_name,
            doc_hash: content_hash(&bytes),
            file_type: extension_of(path),
            file_path,
            sync_rag_state: SyncState::Pending,
            sync_entity_state: SyncState::Pending,
            ctime: Utc::now(),
        };
        self.documents.create(&doc).await?;
        info!(doc_id = %doc.doc_id, path = %doc.file_path, "document registered");
        Ok(doc)
    }

    pub async fn get(&self, doc_id: &str) -> Result<Document> {
        self.documents
            .get_by_id(doc_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {doc_id}")))
    }

    /// `page` starts at 1; `per_page` must be within `1..=100`.
    pub async fn list(&self, page: i64, per_page: i64) -> Result<Page<Document>> {
        if page < 1 {
            return Err(Error::InvalidInput("page must be at least 1".into()));
        }
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(Error::InvalidInput(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        let (data, total) = self.documents.list((page - 1) * per_page, per_page).await?;
        Ok(Page {
            data,
            total,
            page,
            per_page,
        })
    }

    /// Remove chunks, then entities, then the registry row.
    pub async fn delete(&self, doc_id: &str) -> Result<()> {
        let lock = self.lock_for(doc_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.delete_locked(doc_id).await
        };
        self.release_lock(doc_id, lock).await;
        result
    }

    async fn delete_locked(&self, doc_id: &str) -> Result<()> {
        self.get(doc_id).await?;
        let chunks = self
            .chunks
            .delete_by_doc_id(doc_id)
            .await
            .map_err(|e| e.context("delete chunks"))?;
        let entities = self
            .entities
            .delete_by_doc_id(doc_id)
            .await
            .map_err(|e| e.context("delete entities"))?;
        self.documents.delete(doc_id).await?;
        info!(doc_id, chunks, entities, "document deleted");
        Ok(())
    }

    /// Rebuild the document's chunks and mark the vector index synced.
    ///
    /// Runs are serialised per document. Existing chunks are cleared
    /// first so a retry starts from scratch.
    pub async fn process(&self, doc_id: &str) -> Result<usize> {
        let lock = self.lock_for(doc_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.process_locked(doc_id).await
        };
        self.release_lock(doc_id, lock).await;
        result
    }

    async fn process_locked(&self, doc_id: &str) -> Result<usize> {
        let doc = self.get(doc_id).await?;
        if doc.sync_rag_state != SyncState::Pending {
            self.documents
                .update_sync_state(doc_id, Some(SyncState::Pending), None)
                .await?;
        }
        self.chunks
            .delete_by_doc_id(doc_id)
            .await
            .map_err(|e| e.context("clear chunks"))?;

        let written = match self.processor.process(doc_id, Path::new(&doc.file_path)).await {
            Ok(n) => n,
            Err(e) => {
                warn!(doc_id, error = %e, "processing failed; document stays pending");
                return Err(e);
            }
        };

        self.documents
            .update_sync_state(doc_id, Some(SyncState::Synced), None)
            .await?;
        Ok(written)
    }

    /// Process up to `limit` documents still pending, oldest first.
    ///
    /// Individual failures are collected rather than aborting the pass.
    pub async fn process_pending(&self, limit: i64) -> Result<ProcessReport> {
        let pending = self
            .documents
            .list_by_rag_state(SyncState::Pending, limit)
            .await?;
        let mut report = ProcessReport::default();
        for doc in pending {
            match self.process(&doc.doc_id).await {
                Ok(n) => {
                    report.processed += 1;
                    report.chunks += n;
                }
                Err(e) => report.failed.push(ProcessFailure {
                    doc_id: doc.doc_id,
                    error: e.to_string(),
                }),
            }
        }
        info!(
            processed = report.processed,
            failed = report.failed.len(),
            "reconciliation pass finished"
        );
        Ok(report)
    }

    async fn lock_for(&self, doc_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the caller's handle and forget the entry once nobody else holds it.
    async fn release_lock(&self, doc_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(doc_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(doc_id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}
