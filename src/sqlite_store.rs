//! SQLite-backed relational stores.
//!
//! [`SqliteStore`] implements all four store traits from
//! [`ragweave_core::store`] over one [`SqlitePool`]. Embeddings are kept as
//! vector literals in a `TEXT` column and scored in process with
//! [`cosine_similarity`], then ranked by [`rank_by_similarity`].
//!
//! Rows are read through small `sqlx::FromRow` structs holding the raw
//! column types, converted into the core models afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use ragweave_core::embedding::{cosine_similarity, parse_vector_literal};
use ragweave_core::models::{
    ChatChunk, ChatRole, Document, DocumentChunk, Entity, Metadata, NewChatChunk, NewChunk,
    NewEntity, ScoredChatChunk, ScoredChunk, SyncState,
};
use ragweave_core::store::{
    rank_by_similarity, ChatStore, ChunkStore, DocumentStore, EntityStore, BATCH_SIZE,
};
use ragweave_core::{Error, Result};

/// SQLite implementation of the relational store traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a driver error onto the core taxonomy.
pub(crate) fn db_err(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            Error::NotFound(db.message().to_string())
        }
        _ => Error::upstream(format!("sqlite: {err}")),
    }
}

pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

pub(crate) fn parse_metadata(json: &str) -> Result<Metadata> {
    if json.is_empty() {
        return Ok(Metadata::new());
    }
    Ok(serde_json::from_str(json)?)
}

// ============ Row types ============

#[derive(sqlx::FromRow)]
struct DocumentRow {
    doc_id: String,
    doc_name: String,
    doc_hash: String,
    file_path: String,
    file_type: String,
    sync_rag_state: i64,
    sync_entity_state: i64,
    ctime: i64,
}

impl TryFrom<DocumentRow> for Document {
    type Error = Error;

    fn try_from(row: DocumentRow) -> Result<Self> {
        Ok(Document {
            doc_id: row.doc_id,
            doc_name: row.doc_name,
            doc_hash: row.doc_hash,
            file_path: row.file_path,
            file_type: row.file_type,
            sync_rag_state: SyncState::try_from(row.sync_rag_state)?,
            sync_entity_state: SyncState::try_from(row.sync_entity_state)?,
            ctime: from_micros(row.ctime),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: i64,
    doc_id: String,
    chunk_index: i64,
    content: String,
    embedding: String,
    metadata: String,
    ctime: i64,
}

impl TryFrom<ChunkRow> for DocumentChunk {
    type Error = Error;

    fn try_from(row: ChunkRow) -> Result<Self> {
        Ok(DocumentChunk {
            id: row.id,
            doc_id: row.doc_id,
            chunk_index: row.chunk_index,
            content: row.content,
            embedding: row.embedding,
            metadata: parse_metadata(&row.metadata)?,
            ctime: from_micros(row.ctime),
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntityRow {
    id: i64,
    doc_id: String,
    entity_type: String,
    entity_name: String,
    entity_value: String,
    metadata: String,
    ctime: i64,
}

impl TryFrom<EntityRow> for Entity {
    type Error = Error;

    fn try_from(row: EntityRow) -> Result<Self> {
        Ok(Entity {
            id: row.id,
            doc_id: row.doc_id,
            entity_type: row.entity_type,
            entity_name: row.entity_name,
            entity_value: row.entity_value,
            metadata: parse_metadata(&row.metadata)?,
            ctime: from_micros(row.ctime),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: i64,
    role: String,
    chunk_index: i64,
    content: String,
    embedding: Option<String>,
    metadata: String,
    ctime: i64,
}

impl TryFrom<ChatRow> for ChatChunk {
    type Error = Error;

    fn try_from(row: ChatRow) -> Result<Self> {
        Ok(ChatChunk {
            id: row.id,
            role: row.role.parse::<ChatRole>()?,
            chunk_index: row.chunk_index,
            content: row.content,
            embedding: row.embedding,
            metadata: parse_metadata(&row.metadata)?,
            ctime: from_micros(row.ctime),
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

const DOCUMENT_COLUMNS: &str = "doc_id, doc_name, doc_hash, file_path, file_type, \
                                sync_rag_state, sync_entity_state, ctime";
const CHUNK_COLUMNS: &str = "id, doc_id, chunk_index, content, embedding, metadata, ctime";
const ENTITY_COLUMNS: &str =
    "id, doc_id, entity_type, entity_name, entity_value, metadata, ctime";
const CHAT_COLUMNS: &str = "id, role, chunk_index, content, embedding, metadata, ctime";

// ============ Chunks ============

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn batch_create(&self, chunks: &[NewChunk]) -> Result<()> {
        let now = to_micros(Utc::now());
        for batch in chunks.chunks(BATCH_SIZE) {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            for chunk in batch {
                let metadata = serde_json::to_string(&chunk.metadata)?;
                sqlx::query(
                    r#"
                    INSERT INTO document_chunks (doc_id, chunk_index, content, embedding, metadata, ctime)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.doc_id)
                .bind(chunk.chunk_index)
                .bind(&chunk.content)
                .bind(&chunk.embedding)
                .bind(metadata)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            tx.commit().await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_by_doc_id(&self, doc_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {CHUNK_COLUMNS} FROM document_chunks WHERE doc_id = ? ORDER BY chunk_index"
        ))
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        convert(rows)
    }

    async fn count_by_doc_id(&self, doc_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn search_similar(
        &self,
        vector_literal: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChunk>> {
        let query = parse_vector_literal(vector_literal)?;
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!("SELECT {CHUNK_COLUMNS} FROM document_chunks"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk = DocumentChunk::try_from(row)?;
            let vector = parse_vector_literal(&chunk.embedding)?;
            let similarity = cosine_similarity(&query, &vector) as f64;
            scored.push((chunk, similarity));
        }

        Ok(rank_by_similarity(scored, top_k, threshold)
            .into_iter()
            .map(|(chunk, similarity)| ScoredChunk { chunk, similarity })
            .collect())
    }
}

// ============ Documents ============

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (doc_id, doc_name, doc_hash, file_path, file_type,
                                   sync_rag_state, sync_entity_state, ctime)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.doc_id)
        .bind(&doc.doc_name)
        .bind(&doc.doc_hash)
        .bind(&doc.file_path)
        .bind(&doc.file_type)
        .bind(i64::from(doc.sync_rag_state))
        .bind(i64::from(doc.sync_entity_state))
        .bind(to_micros(doc.ctime))
        .execute(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            Error::Conflict(_) => Error::Conflict(format!(
                "document already exists with path: {}",
                doc.file_path
            )),
            other => other,
        })?;
        Ok(())
    }

    async fn get_by_id(&self, doc_id: &str) -> Result<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE doc_id = ?"))
                .bind(doc_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Document::try_from).transpose()
    }

    async fn get_by_path(&self, file_path: &str) -> Result<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE file_path = ?"))
                .bind(file_path)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Document::try_from).transpose()
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Document>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY ctime DESC, doc_id LIMIT ? OFFSET ?"
        ))
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok((convert(rows)?, total))
    }

    async fn list_by_rag_state(&self, state: SyncState, limit: i64) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE sync_rag_state = ? \
             ORDER BY ctime, doc_id LIMIT ?"
        ))
        .bind(i64::from(state))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        convert(rows)
    }

    async fn update(&self, doc: &Document) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET doc_name = ?, doc_hash = ?, file_path = ?, file_type = ?,
                sync_rag_state = ?, sync_entity_state = ?, ctime = ?
            WHERE doc_id = ?
            "#,
        )
        .bind(&doc.doc_name)
        .bind(&doc.doc_hash)
        .bind(&doc.file_path)
        .bind(&doc.file_type)
        .bind(i64::from(doc.sync_rag_state))
        .bind(i64::from(doc.sync_entity_state))
        .bind(to_micros(doc.ctime))
        .bind(&doc.doc_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("document {}", doc.doc_id)));
        }
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_sync_state(
        &self,
        doc_id: &str,
        rag: Option<SyncState>,
        entity: Option<SyncState>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET sync_rag_state = COALESCE(?, sync_rag_state),
                sync_entity_state = COALESCE(?, sync_entity_state)
            WHERE doc_id = ?
            "#,
        )
        .bind(rag.map(i64::from))
        .bind(entity.map(i64::from))
        .bind(doc_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("document {doc_id}")));
        }
        Ok(())
    }
}

// ============ Entities ============

#[async_trait]
impl EntityStore for SqliteStore {
    async fn create(&self, entity: &NewEntity) -> Result<Entity> {
        let ctime = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO entities (doc_id, entity_type, entity_name, entity_value, metadata, ctime)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&entity.doc_id)
        .bind(&entity.entity_type)
        .bind(&entity.entity_name)
        .bind(&entity.entity_value)
        .bind(serde_json::to_string(&entity.metadata)?)
        .bind(to_micros(ctime))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Entity {
            id,
            doc_id: entity.doc_id.clone(),
            entity_type: entity.entity_type.clone(),
            entity_name: entity.entity_name.clone(),
            entity_value: entity.entity_value.clone(),
            metadata: entity.metadata.clone(),
            ctime: from_micros(to_micros(ctime)),
        })
    }

    async fn batch_create(&self, entities: &[NewEntity]) -> Result<()> {
        let now = to_micros(Utc::now());
        for batch in entities.chunks(BATCH_SIZE) {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            for entity in batch {
                sqlx::query(
                    r#"
                    INSERT INTO entities (doc_id, entity_type, entity_name, entity_value, metadata, ctime)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&entity.doc_id)
                .bind(&entity.entity_type)
                .bind(&entity.entity_name)
                .bind(&entity.entity_value)
                .bind(serde_json::to_string(&entity.metadata)?)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            tx.commit().await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_by_doc_id(&self, doc_id: &str) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> =
            sqlx::query_as(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE doc_id = ? ORDER BY id"))
                .bind(doc_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        convert(rows)
    }

    async fn get_by_type(&self, entity_type: &str, offset: i64, limit: i64) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_type = ? ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(entity_type)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        convert(rows)
    }

    async fn search_by_name(&self, fragment: &str) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE instr(lower(entity_name), lower(?)) > 0 ORDER BY id"
        ))
        .bind(fragment)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        convert(rows)
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM entities WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

// ============ Chat ============

#[async_trait]
impl ChatStore for SqliteStore {
    async fn create(&self, chunk: &NewChatChunk) -> Result<ChatChunk> {
        let ctime = to_micros(Utc::now());
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO chat_chunk (role, chunk_index, content, embedding, metadata, ctime)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(chunk.role.as_str())
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(chunk.embedding.as_deref())
        .bind(serde_json::to_string(&chunk.metadata)?)
        .bind(ctime)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(ChatChunk {
            id,
            role: chunk.role,
            chunk_index: chunk.chunk_index,
            content: chunk.content.clone(),
            embedding: chunk.embedding.clone(),
            metadata: chunk.metadata.clone(),
            ctime: from_micros(ctime),
        })
    }

    async fn batch_create(&self, chunks: &[NewChatChunk]) -> Result<()> {
        let now = to_micros(Utc::now());
        for batch in chunks.chunks(BATCH_SIZE) {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            for chunk in batch {
                sqlx::query(
                    r#"
                    INSERT INTO chat_chunk (role, chunk_index, content, embedding, metadata, ctime)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(chunk.role.as_str())
                .bind(chunk.chunk_index)
                .bind(&chunk.content)
                .bind(chunk.embedding.as_deref())
                .bind(serde_json::to_string(&chunk.metadata)?)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            tx.commit().await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ChatChunk>> {
        let row: Option<ChatRow> =
            sqlx::query_as(&format!("SELECT {CHAT_COLUMNS} FROM chat_chunk WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(ChatChunk::try_from).transpose()
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ChatChunk>> {
        let rows: Vec<ChatRow> = sqlx::query_as(&format!(
            "SELECT {CHAT_COLUMNS} FROM chat_chunk ORDER BY chunk_index, id LIMIT ? OFFSET ?"
        ))
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        convert(rows)
    }

    async fn get_by_role(&self, role: ChatRole, limit: i64, offset: i64) -> Result<Vec<ChatChunk>> {
        let rows: Vec<ChatRow> = sqlx::query_as(&format!(
            "SELECT {CHAT_COLUMNS} FROM chat_chunk WHERE role = ? \
             ORDER BY chunk_index, id LIMIT ? OFFSET ?"
        ))
        .bind(role.as_str())
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        convert(rows)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_chunk WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn next_chunk_index(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM chat_chunk")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn search_similar(
        &self,
        vector_literal: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChatChunk>> {
        let query = parse_vector_literal(vector_literal)?;
        let rows: Vec<ChatRow> = sqlx::query_as(&format!(
            "SELECT {CHAT_COLUMNS} FROM chat_chunk WHERE embedding IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk = ChatChunk::try_from(row)?;
            if let Some(literal) = &chunk.embedding {
                let vector = parse_vector_literal(literal)?;
                let similarity = cosine_similarity(&query, &vector) as f64;
                scored.push((chunk, similarity));
            }
        }

        Ok(rank_by_similarity(scored, top_k, threshold)
            .into_iter()
            .map(|(chunk, similarity)| ScoredChatChunk { chunk, similarity })
            .collect())
    }
}
