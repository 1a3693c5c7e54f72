//! Ingestion pipeline: load, split, embed, persist.
//!
//! [`DocumentProcessor::process`] is a pure pipeline. Every step is a
//! hard failure point and nothing is retried here. The caller owns the
//! document's `sync_rag_state` and flips it only after success.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::embedding::{to_vector_literal, Embedder};
use crate::error::{Error, Result};
use crate::loader::LoaderFactory;
use crate::models::{Metadata, NewChunk};
use crate::splitter::TextSplitter;
use crate::store::ChunkStore;

pub struct DocumentProcessor {
    loaders: LoaderFactory,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    chunks: Arc<dyn ChunkStore>,
}

impl DocumentProcessor {
    pub fn new(
        loaders: LoaderFactory,
        splitter: TextSplitter,
        embedder: Arc<dyn Embedder>,
        chunks: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            loaders,
            splitter,
            embedder,
            chunks,
        }
    }

    /// Ingest the file at `path` as the chunks of `doc_id`.
    ///
    /// Returns the number of chunks written.
    ///
    /// # Errors
    ///
    /// - Loader selection or loading errors (`Unsupported`, `NotFound`, `Empty`).
    /// - `Empty` when nothing was loaded or the splitter produced no chunks.
    /// - `Upstream` when embedding fails or returns the wrong number of
    ///   vectors; no chunk is written in that case.
    /// - Store errors from the batch insert.
    pub async fn process(&self, doc_id: &str, path: &Path) -> Result<usize> {
        let loader = self.loaders.select(path).map_err(|e| e.context("select loader"))?;
        let docs = loader.load(path).await.map_err(|e| e.context("load document"))?;
        if docs.is_empty() {
            return Err(Error::Empty(format!("no documents loaded from {}", path.display())));
        }

        let pieces = self.splitter.split_all(&docs);
        if pieces.is_empty() {
            return Err(Error::Empty(format!("no chunks generated from {}", path.display())));
        }
        debug!(doc_id, chunks = pieces.len(), "split document");

        let texts: Vec<String> = pieces.iter().map(|p| p.content.clone()).collect();
        let vectors = self
            .embedder
            .embed_many(&texts)
            .await
            .map_err(|e| e.context("generate embeddings"))?;
        if vectors.len() != pieces.len() {
            return Err(Error::Upstream(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                pieces.len()
            )));
        }

        let records: Vec<NewChunk> = pieces
            .into_iter()
            .zip(vectors.iter())
            .map(|(piece, vector)| NewChunk {
                doc_id: doc_id.to_string(),
                chunk_index: piece.metadata_i64("chunk_index").unwrap_or(0),
                content: piece.content,
                embedding: to_vector_literal(vector),
                metadata: Metadata::new(),
            })
            .collect();

        self.chunks
            .batch_create(&records)
            .await
            .map_err(|e| e.context("store chunks"))?;

        info!(doc_id, chunks = records.len(), model = self.embedder.model_name(), "document ingested");
        Ok(records.len())
    }
}
