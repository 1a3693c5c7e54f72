//! Storage abstraction for ragweave's relational side.
//!
//! Four traits cover the four relational tables. Every component receives
//! its store handles through its constructor; nothing reaches for a
//! global connection.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ChunkStore`] | Chunk persistence and cosine-similarity search |
//! | [`DocumentStore`] | Document registry and sync-state flags |
//! | [`EntityStore`] | Extracted entities per document |
//! | [`ChatStore`] | Conversation log with optional embeddings |
//!
//! Similarity search receives the query vector in its literal form (see
//! [`crate::embedding::to_vector_literal`]). Results keep only rows with
//! `similarity > threshold`, sorted by descending similarity and
//! truncated to `top_k`.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ChatChunk, ChatRole, Document, DocumentChunk, Entity, NewChatChunk, NewChunk, NewEntity,
    ScoredChatChunk, ScoredChunk, SyncState,
};

/// Rows written per round-trip by the batch-create operations.
pub const BATCH_SIZE: usize = 100;

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert chunks in order, [`BATCH_SIZE`] rows per round-trip.
    async fn batch_create(&self, chunks: &[NewChunk]) -> Result<()>;

    /// All chunks of a document ordered by `chunk_index`.
    async fn get_by_doc_id(&self, doc_id: &str) -> Result<Vec<DocumentChunk>>;

    async fn count_by_doc_id(&self, doc_id: &str) -> Result<i64>;

    /// Returns the number of chunks removed.
    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64>;

    async fn search_similar(
        &self,
        vector_literal: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChunk>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a document. Fails with `Conflict` if the id or path is taken.
    async fn create(&self, doc: &Document) -> Result<()>;

    async fn get_by_id(&self, doc_id: &str) -> Result<Option<Document>>;

    async fn get_by_path(&self, file_path: &str) -> Result<Option<Document>>;

    /// One page ordered by `ctime` descending, plus the total row count.
    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Document>, i64)>;

    /// Documents whose vector-index flag equals `state`, oldest first.
    async fn list_by_rag_state(&self, state: SyncState, limit: i64) -> Result<Vec<Document>>;

    /// Full replace. Fails with `NotFound` if the document is missing.
    async fn update(&self, doc: &Document) -> Result<()>;

    /// Returns `false` if nothing was deleted.
    async fn delete(&self, doc_id: &str) -> Result<bool>;

    /// Set either or both sync flags. Fails with `NotFound` if missing.
    async fn update_sync_state(
        &self,
        doc_id: &str,
        rag: Option<SyncState>,
        entity: Option<SyncState>,
    ) -> Result<()>;
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create(&self, entity: &NewEntity) -> Result<Entity>;

    async fn batch_create(&self, entities: &[NewEntity]) -> Result<()>;

    async fn get_by_doc_id(&self, doc_id: &str) -> Result<Vec<Entity>>;

    async fn get_by_type(&self, entity_type: &str, offset: i64, limit: i64) -> Result<Vec<Entity>>;

    /// Case-insensitive substring match on `entity_name`.
    async fn search_by_name(&self, fragment: &str) -> Result<Vec<Entity>>;

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create(&self, chunk: &NewChatChunk) -> Result<ChatChunk>;

    async fn batch_create(&self, chunks: &[NewChatChunk]) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ChatChunk>>;

    /// Ordered by `chunk_index` ascending.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ChatChunk>>;

    /// Ordered by `chunk_index` ascending.
    async fn get_by_role(&self, role: ChatRole, limit: i64, offset: i64)
        -> Result<Vec<ChatChunk>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// One past the highest stored `chunk_index`, or 0 for an empty log.
    async fn next_chunk_index(&self) -> Result<i64>;

    /// Only messages that carry an embedding take part.
    async fn search_similar(
        &self,
        vector_literal: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChatChunk>>;
}

/// Keep rows above `threshold`, best first, at most `top_k`.
///
/// Shared by the stores that score in process.
pub fn rank_by_similarity<T>(mut scored: Vec<(T, f64)>, top_k: usize, threshold: f64) -> Vec<(T, f64)> {
    scored.retain(|(_, sim)| *sim > threshold);
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}
