//! In-memory store implementing every relational store trait.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Similarity search is brute-force cosine similarity over the parsed
//! vector literals. Intended for tests and embedding in other tools.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::embedding::{cosine_similarity, parse_vector_literal};
use crate::error::{Error, Result};
use crate::models::{
    ChatChunk, ChatRole, Document, DocumentChunk, Entity, NewChatChunk, NewChunk, NewEntity,
    ScoredChatChunk, ScoredChunk, SyncState,
};

use super::{rank_by_similarity, ChatStore, ChunkStore, DocumentStore, EntityStore};

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Upstream("in-memory store lock poisoned".into())
}

/// In-memory relational store.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<DocumentChunk>>,
    entities: RwLock<Vec<Entity>>,
    chat: RwLock<Vec<ChatChunk>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            entities: RwLock::new(Vec::new()),
            chat: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn page<T: Clone>(items: &[T], offset: i64, limit: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

// ============ Chunks ============

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn batch_create(&self, chunks: &[NewChunk]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for batch in chunks.chunks(super::BATCH_SIZE) {
            for c in batch {
                if stored
                    .iter()
                    .any(|s| s.doc_id == c.doc_id && s.chunk_index == c.chunk_index)
                {
                    return Err(Error::Conflict(format!(
                        "chunk {} of document {} already exists",
                        c.chunk_index, c.doc_id
                    )));
                }
                stored.push(DocumentChunk {
                    id: self.allocate_id(),
                    doc_id: c.doc_id.clone(),
                    chunk_index: c.chunk_index,
                    content: c.content.clone(),
                    embedding: c.embedding.clone(),
                    metadata: c.metadata.clone(),
                    ctime: Utc::now(),
                });
            }
        }
        Ok(())
    }

    async fn get_by_doc_id(&self, doc_id: &str) -> Result<Vec<DocumentChunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut out: Vec<DocumentChunk> = stored.iter().filter(|c| c.doc_id == doc_id).cloned().collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn count_by_doc_id(&self, doc_id: &str) -> Result<i64> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(stored.iter().filter(|c| c.doc_id == doc_id).count() as i64)
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|c| c.doc_id != doc_id);
        Ok((before - stored.len()) as u64)
    }

    async fn search_similar(
        &self,
        vector_literal: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChunk>> {
        let query = parse_vector_literal(vector_literal)?;
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut scored = Vec::with_capacity(stored.len());
        for c in stored.iter() {
            let v = parse_vector_literal(&c.embedding)?;
            scored.push((c.clone(), cosine_similarity(&query, &v) as f64));
        }
        Ok(rank_by_similarity(scored, top_k, threshold)
            .into_iter()
            .map(|(chunk, similarity)| ScoredChunk { chunk, similarity })
            .collect())
    }
}

// ============ Documents ============

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        if docs.contains_key(&doc.doc_id) || docs.values().any(|d| d.file_path == doc.file_path) {
            return Err(Error::Conflict(format!(
                "document already exists with path: {}",
                doc.file_path
            )));
        }
        docs.insert(doc.doc_id.clone(), doc.clone());
        Ok(())
    }

    async fn get_by_id(&self, doc_id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().map_err(poisoned)?.get(doc_id).cloned())
    }

    async fn get_by_path(&self, file_path: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.values().find(|d| d.file_path == file_path).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Document>, i64)> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut all: Vec<Document> = docs.values().cloned().collect();
        all.sort_by(|a, b| b.ctime.cmp(&a.ctime).then_with(|| a.doc_id.cmp(&b.doc_id)));
        let total = all.len() as i64;
        Ok((page(&all, offset, limit), total))
    }

    async fn list_by_rag_state(&self, state: SyncState, limit: i64) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut matching: Vec<Document> = docs
            .values()
            .filter(|d| d.sync_rag_state == state)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.ctime.cmp(&b.ctime).then_with(|| a.doc_id.cmp(&b.doc_id)));
        Ok(page(&matching, 0, limit))
    }

    async fn update(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        match docs.get_mut(&doc.doc_id) {
            Some(existing) => {
                *existing = doc.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("document {}", doc.doc_id))),
        }
    }

    async fn delete(&self, doc_id: &str) -> Result<bool> {
        Ok(self.docs.write().map_err(poisoned)?.remove(doc_id).is_some())
    }

    async fn update_sync_state(
        &self,
        doc_id: &str,
        rag: Option<SyncState>,
        entity: Option<SyncState>,
    ) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let doc = docs
            .get_mut(doc_id)
            .ok_or_else(|| Error::NotFound(format!("document {doc_id}")))?;
        if let Some(state) = rag {
            doc.sync_rag_state = state;
        }
        if let Some(state) = entity {
            doc.sync_entity_state = state;
        }
        Ok(())
    }
}

// ============ Entities ============

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create(&self, entity: &NewEntity) -> Result<Entity> {
        let stored = Entity {
            id: self.allocate_id(),
            doc_id: entity.doc_id.clone(),
            entity_type: entity.entity_type.clone(),
            entity_name: entity.entity_name.clone(),
            entity_value: entity.entity_value.clone(),
            metadata: entity.metadata.clone(),
            ctime: Utc::now(),
        };
        self.entities.write().map_err(poisoned)?.push(stored.clone());
        Ok(stored)
    }

    async fn batch_create(&self, entities: &[NewEntity]) -> Result<()> {
        for e in entities {
            EntityStore::create(self, e).await?;
        }
        Ok(())
    }

    async fn get_by_doc_id(&self, doc_id: &str) -> Result<Vec<Entity>> {
        let stored = self.entities.read().map_err(poisoned)?;
        Ok(stored.iter().filter(|e| e.doc_id == doc_id).cloned().collect())
    }

    async fn get_by_type(&self, entity_type: &str, offset: i64, limit: i64) -> Result<Vec<Entity>> {
        let stored = self.entities.read().map_err(poisoned)?;
        let matching: Vec<Entity> = stored
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect();
        Ok(page(&matching, offset, limit))
    }

    async fn search_by_name(&self, fragment: &str) -> Result<Vec<Entity>> {
        let needle = fragment.to_lowercase();
        let stored = self.entities.read().map_err(poisoned)?;
        Ok(stored
            .iter()
            .filter(|e| e.entity_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64> {
        let mut stored = self.entities.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|e| e.doc_id != doc_id);
        Ok((before - stored.len()) as u64)
    }
}

// ============ Chat ============

#[async_trait]
impl ChatStore for InMemoryStore {
    async fn create(&self, chunk: &NewChatChunk) -> Result<ChatChunk> {
        let stored = ChatChunk {
            id: self.allocate_id(),
            role: chunk.role,
            chunk_index: chunk.chunk_index,
            content: chunk.content.clone(),
            embedding: chunk.embedding.clone(),
            metadata: chunk.metadata.clone(),
            ctime: Utc::now(),
        };
        self.chat.write().map_err(poisoned)?.push(stored.clone());
        Ok(stored)
    }

    async fn batch_create(&self, chunks: &[NewChatChunk]) -> Result<()> {
        for c in chunks {
            ChatStore::create(self, c).await?;
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ChatChunk>> {
        let stored = self.chat.read().map_err(poisoned)?;
        Ok(stored.iter().find(|c| c.id == id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ChatChunk>> {
        let stored = self.chat.read().map_err(poisoned)?;
        let mut all = stored.clone();
        all.sort_by_key(|c| (c.chunk_index, c.id));
        Ok(page(&all, offset, limit))
    }

    async fn get_by_role(&self, role: ChatRole, limit: i64, offset: i64) -> Result<Vec<ChatChunk>> {
        let stored = self.chat.read().map_err(poisoned)?;
        let mut matching: Vec<ChatChunk> = stored.iter().filter(|c| c.role == role).cloned().collect();
        matching.sort_by_key(|c| (c.chunk_index, c.id));
        Ok(page(&matching, offset, limit))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut stored = self.chat.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|c| c.id != id);
        Ok(stored.len() < before)
    }

    async fn next_chunk_index(&self) -> Result<i64> {
        let stored = self.chat.read().map_err(poisoned)?;
        Ok(stored.iter().map(|c| c.chunk_index + 1).max().unwrap_or(0))
    }

    async fn search_similar(
        &self,
        vector_literal: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChatChunk>> {
        let query = parse_vector_literal(vector_literal)?;
        let stored = self.chat.read().map_err(poisoned)?;
        let mut scored = Vec::new();
        for c in stored.iter() {
            if let Some(literal) = &c.embedding {
                let v = parse_vector_literal(literal)?;
                scored.push((c.clone(), cosine_similarity(&query, &v) as f64));
            }
        }
        Ok(rank_by_similarity(scored, top_k, threshold)
            .into_iter()
            .map(|(chunk, similarity)| ScoredChatChunk { chunk, similarity })
            .collect())
    }
}
