//! Service wiring.
//!
//! [`App::open`] connects to SQLite, applies the schema, builds the
//! provider clients from config and hands every core service its store
//! handles. The CLI and the HTTP server share this one constructor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use ragweave_core::chat::ChatService;
use ragweave_core::chat_model::ChatModel;
use ragweave_core::documents::DocumentService;
use ragweave_core::embedding::Embedder;
use ragweave_core::graph::{CodeGraph, DocumentGraph, GraphStore, GraphSync, KnowledgeGraph, NovelGraph};
use ragweave_core::loader::LoaderFactory;
use ragweave_core::processor::DocumentProcessor;
use ragweave_core::rag::RagChain;
use ragweave_core::retriever::VectorRetriever;
use ragweave_core::splitter::TextSplitter;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::create_chat_model;
use crate::migrate;
use crate::sqlite_graph::SqliteGraphStore;
use crate::sqlite_store::SqliteStore;

pub struct App {
    pub config: Config,
    pub pool: SqlitePool,
    pub store: Arc<SqliteStore>,
    pub graph_store: Arc<SqliteGraphStore>,
    pub documents: DocumentService,
    pub chat: ChatService,
    pub rag: RagChain,
    pub graph_sync: GraphSync,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let model = create_chat_model(&config.llm)?;
        Self::with_providers(config, embedder, model).await
    }

    /// Wire the services around explicit provider clients.
    pub async fn with_providers(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let graph_store = Arc::new(SqliteGraphStore::new(pool.clone()));

        let splitter = TextSplitter::new(config.splitter.chunk_size, config.splitter.chunk_overlap);
        let processor = Arc::new(DocumentProcessor::new(
            LoaderFactory::new(),
            splitter,
            embedder.clone(),
            store.clone(),
        ));
        let documents = DocumentService::new(store.clone(), store.clone(), store.clone(), processor);

        let chat_embedder = config.embedding.is_enabled().then(|| embedder.clone());
        let chat = ChatService::new(store.clone(), chat_embedder);

        let retriever = VectorRetriever::new(
            embedder,
            store.clone(),
            config.retrieval.top_k,
            config.retrieval.similarity_threshold,
        );
        let rag = RagChain::new(retriever, model, store.clone());

        let graph_sync = GraphSync::new(
            store.clone(),
            store.clone(),
            DocumentGraph::new(graph_store.clone()),
        );

        Ok(Self {
            config: config.clone(),
            pool,
            store,
            graph_store,
            documents,
            chat,
            rag,
            graph_sync,
        })
    }

    fn graph_handle(&self) -> Arc<dyn GraphStore> {
        self.graph_store.clone()
    }

    pub fn knowledge_graph(&self) -> KnowledgeGraph {
        KnowledgeGraph::new(self.graph_handle())
    }

    pub fn novel_graph(&self) -> NovelGraph {
        NovelGraph::new(self.graph_handle())
    }

    pub fn code_graph(&self) -> CodeGraph {
        CodeGraph::new(self.graph_handle())
    }

    pub fn document_graph(&self) -> &DocumentGraph {
        self.graph_sync.graph()
    }
}

/// Absolute form of `path` when it exists, so one file always maps to
/// one document id; otherwise the path unchanged.
pub fn normalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
