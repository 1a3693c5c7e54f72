//! Conversation log.
//!
//! Messages get consecutive `chunk_index` values in creation order.
//! When an embedder is configured each message is embedded on write so
//! the log can be searched by meaning.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::embedding::{to_vector_literal, Embedder};
use crate::error::{Error, Result};
use crate::models::{ChatChunk, ChatRole, Metadata, NewChatChunk, ScoredChatChunk};
use crate::store::ChatStore;

pub const DEFAULT_LIMIT: i64 = 20;

pub struct ChatService {
    store: Arc<dyn ChatStore>,
    embedder: Option<Arc<dyn Embedder>>,
    threshold: f64,
    write_lock: Mutex<()>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            store,
            embedder,
            threshold: 0.0,
            write_lock: Mutex::new(()),
        }
    }

    /// Minimum similarity for [`ChatService::search_similar`] hits.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub async fn create_message(
        &self,
        role: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<ChatChunk> {
        let role: ChatRole = role.parse()?;
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("content is required".into()));
        }

        let embedding = match &self.embedder {
            Some(embedder) => {
                let vector = embedder
                    .embed_one(content)
                    .await
                    .map_err(|e| e.context("embed message"))?;
                Some(to_vector_literal(&vector))
            }
            None => None,
        };

        let _guard = self.write_lock.lock().await;
        let chunk_index = self.store.next_chunk_index().await?;
        let chunk = self
            .store
            .create(&NewChatChunk {
                role,
                chunk_index,
                content: content.to_string(),
                embedding,
                metadata: metadata.unwrap_or_default(),
            })
            .await?;
        debug!(id = chunk.id, chunk_index, role = %role, "chat message stored");
        Ok(chunk)
    }

    pub async fn get_message(&self, id: i64) -> Result<ChatChunk> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat message {id}")))
    }

    pub async fn list_messages(&self, limit: i64, offset: i64) -> Result<Vec<ChatChunk>> {
        let (limit, offset) = normalize(limit, offset);
        self.store.list(limit, offset).await
    }

    pub async fn messages_by_role(&self, role: &str, limit: i64, offset: i64) -> Result<Vec<ChatChunk>> {
        let role: ChatRole = role.parse()?;
        let (limit, offset) = normalize(limit, offset);
        self.store.get_by_role(role, limit, offset).await
    }

    pub async fn delete_message(&self, id: i64) -> Result<()> {
        if self.store.delete(id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("chat message {id}")))
        }
    }

    /// Messages closest in meaning to `query`. Needs an embedder.
    pub async fn search_similar(&self, query: &str, top_k: i64) -> Result<Vec<ScoredChatChunk>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| Error::Unsupported("chat search needs an embedding provider".into()))?;
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query is empty".into()));
        }
        let top_k = if top_k <= 0 { DEFAULT_LIMIT } else { top_k };
        let vector = embedder
            .embed_one(query)
            .await
            .map_err(|e| e.context("embed query"))?;
        self.store
            .search_similar(&to_vector_literal(&vector), top_k as usize, self.threshold)
            .await
    }
}

fn normalize(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 { DEFAULT_LIMIT } else { limit };
    (limit, offset.max(0))
}
