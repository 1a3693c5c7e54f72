//! Projects registry documents and their entities into the graph.
//!
//! Sync is idempotent: nodes are created or fully replaced and `CONTAINS`
//! relationships are merged, so a document left `Pending` after a failed
//! run can simply be synced again. Entity nodes the document no longer
//! has are detach-deleted.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::document::{document_node, entity_node, DocumentGraph};
use crate::error::{Error, Result};
use crate::models::{Document, Metadata, SyncState};
use crate::store::{DocumentStore, EntityStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub entities: usize,
    pub relationships: usize,
}

pub struct GraphSync {
    documents: Arc<dyn DocumentStore>,
    entities: Arc<dyn EntityStore>,
    graph: DocumentGraph,
}

impl GraphSync {
    pub fn new(documents: Arc<dyn DocumentStore>, entities: Arc<dyn EntityStore>, graph: DocumentGraph) -> Self {
        Self {
            documents,
            entities,
            graph,
        }
    }

    pub fn graph(&self) -> &DocumentGraph {
        &self.graph
    }

    /// Project one document and mark its entity flag `Synced`.
    pub async fn sync_document(&self, doc_id: &str) -> Result<SyncSummary> {
        let doc = self
            .documents
            .get_by_id(doc_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {doc_id}")))?;

        if doc.sync_entity_state != SyncState::Pending {
            self.documents
                .update_sync_state(doc_id, None, Some(SyncState::Pending))
                .await?;
        }

        let summary = match self.project(&doc).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(doc_id, error = %e, "graph sync failed; document stays pending");
                return Err(e.context("graph sync"));
            }
        };

        self.documents
            .update_sync_state(doc_id, None, Some(SyncState::Synced))
            .await?;
        info!(doc_id, entities = summary.entities, "document projected into graph");
        Ok(summary)
    }

    async fn project(&self, doc: &Document) -> Result<SyncSummary> {
        self.graph.upsert(document_node(doc)).await?;

        let entities = self.entities.get_by_doc_id(&doc.doc_id).await?;
        let mut summary = SyncSummary::default();
        for entity in &entities {
            let node = self.graph.upsert(entity_node(entity)).await?;
            self.graph
                .link_entity(&doc.doc_id, &node.id, Metadata::new())
                .await?;
            summary.entities += 1;
            summary.relationships += 1;
        }

        let current: HashSet<String> = entities.iter().map(|e| e.id.to_string()).collect();
        let pruned = self.graph.prune_entities(&doc.doc_id, &current).await?;
        if pruned > 0 {
            debug!(doc_id = %doc.doc_id, pruned, "removed stale entity nodes");
        }
        Ok(summary)
    }
}
