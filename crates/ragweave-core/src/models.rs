//! Core data models.
//!
//! | Type | Table | Owner |
//! |------|-------|-------|
//! | [`Document`] | `documents` | document registry |
//! | [`DocumentChunk`] | `document_chunks` | cascade-deleted with its document |
//! | [`Entity`] | `entities` | cascade-deleted with its document |
//! | [`ChatChunk`] | `chat_chunk` | independent conversation log |
//!
//! [`TextDocument`] is the in-flight form produced by loaders and the
//! splitter; it is never persisted directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Opaque key-value bag attached to documents, chunks and entities.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Progress of an out-of-band projection for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
    Failed,
}

impl From<SyncState> for i64 {
    fn from(state: SyncState) -> i64 {
        match state {
            SyncState::Pending => 0,
            SyncState::Synced => 1,
            SyncState::Failed => 2,
        }
    }
}

impl TryFrom<i64> for SyncState {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(SyncState::Pending),
            1 => Ok(SyncState::Synced),
            2 => Ok(SyncState::Failed),
            other => Err(Error::InvalidInput(format!("unknown sync state {other}"))),
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        })
    }
}

/// A registered source document.
///
/// `doc_id` is derived from `file_path`, so a path can be registered at
/// most once until the document is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub doc_name: String,
    pub doc_hash: String,
    pub file_path: String,
    pub file_type: String,
    pub sync_rag_state: SyncState,
    pub sync_entity_state: SyncState,
    pub ctime: DateTime<Utc>,
}

/// A persisted chunk. `embedding` holds the vector literal form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: i64,
    pub doc_id: String,
    pub chunk_index: i64,
    pub content: String,
    #[serde(skip_serializing)]
    pub embedding: String,
    pub metadata: Metadata,
    pub ctime: DateTime<Utc>,
}

/// A chunk about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub doc_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: String,
    pub metadata: Metadata,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub similarity: f64,
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            "" => Err(Error::InvalidInput("role is required".into())),
            other => Err(Error::InvalidInput(format!(
                "invalid role '{other}': must be user, assistant, or system"
            ))),
        }
    }
}

/// One message of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: i64,
    pub role: ChatRole,
    pub chunk_index: i64,
    pub content: String,
    #[serde(skip_serializing)]
    pub embedding: Option<String>,
    pub metadata: Metadata,
    pub ctime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChatChunk {
    pub role: ChatRole,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Option<String>,
    pub metadata: Metadata,
}

/// A chat message returned by similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChatChunk {
    pub chunk: ChatChunk,
    pub similarity: f64,
}

/// A fact extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub doc_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub entity_value: String,
    pub metadata: Metadata,
    pub ctime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub doc_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub entity_value: String,
    pub metadata: Metadata,
}

/// Text plus metadata, as produced by a loader or the splitter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextDocument {
    pub content: String,
    pub metadata: Metadata,
}

impl TextDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Read an integer metadata field.
    pub fn metadata_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(|v| v.as_i64())
    }
}
