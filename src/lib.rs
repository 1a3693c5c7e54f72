//! # ragweave
//!
//! A local-first retrieval-augmented generation service with a document
//! registry and a knowledge graph.
//!
//! Documents are registered by path, split into overlapping chunks,
//! embedded and stored in SQLite. Questions are answered by retrieving the
//! most similar chunks and handing them to a chat model. Each document can
//! also be projected, with its extracted entities, into a property graph
//! stored in the same database.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Registry   │──▶│   Pipeline   │──▶│    SQLite    │
//! │ documents   │   │ Split+Embed  │   │ chunks+graph │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                   ┌──────────┐        ┌──────────┐
//!                   │   CLI    │        │   HTTP   │
//!                   │ (weave)  │        │  (axum)  │
//!                   └──────────┘        └──────────┘
//! ```
//!
//! Storage-agnostic logic (models, splitter, pipelines, graph schemas)
//! lives in `ragweave-core`; this crate supplies SQLite stores, provider
//! clients, configuration and the two front ends.
//!
//! ## Quick Start
//!
//! ```bash
//! weave init                       # create database
//! weave doc import ./notes         # register files
//! weave sync                       # chunk, embed, index
//! weave query "what changed in v2?"
//! weave serve                      # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | Document, chunk, entity and chat stores |
//! | [`sqlite_graph`] | Property-graph store |
//! | [`embedding`] | Embedding provider clients |
//! | [`llm`] | Chat-completion provider clients |
//! | [`app`] | Service wiring shared by CLI and server |
//! | [`server`] | JSON HTTP API |
//! | [`stats`] | Database statistics |

pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod llm;
pub mod migrate;
pub mod server;
pub mod sqlite_graph;
pub mod sqlite_store;
pub mod stats;
