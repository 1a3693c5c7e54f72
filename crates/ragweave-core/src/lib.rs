//! # ragweave core
//!
//! Storage-agnostic logic for ragweave: data models, the error taxonomy,
//! document loaders, the text splitter, embedder and chat-model contracts,
//! store traits with in-memory implementations, the ingestion and query
//! pipelines, and the knowledge-graph model.
//!
//! This crate has no sqlx, HTTP client, or CLI dependencies. Concrete
//! SQLite stores and provider clients live in the `ragweave` app crate.
//!
//! # Pipelines
//!
//! ```text
//! ingestion:  Loader ──▶ TextSplitter ──▶ Embedder::embed_many ──▶ ChunkStore::batch_create
//!                                (DocumentProcessor)
//!
//! query:      Embedder::embed_one ──▶ ChunkStore::search_similar ──▶ ChatModel::generate
//!                (VectorRetriever)                  (RagChain)
//! ```
//!
//! The document registry ([`store::DocumentStore`]) tracks two independent
//! sync flags per document: one for the vector index and one for the
//! knowledge-graph projection ([`graph::GraphStore`]). The two stores are
//! eventually consistent; a document whose flag is still `Pending` can be
//! reprocessed from scratch at any time.

pub mod chat;
pub mod chat_model;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod loader;
pub mod models;
pub mod processor;
pub mod rag;
pub mod retriever;
pub mod splitter;
pub mod store;

pub use error::{Error, ErrorKind, Result};
