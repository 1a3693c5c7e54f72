//! Query-side retrieval: embed the query, search the chunk store.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::embedding::{to_vector_literal, Embedder};
use crate::error::{Error, Result};
use crate::models::Metadata;
use crate::store::ChunkStore;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// A retrieved chunk with attribution metadata
/// (`doc_id`, `chunk_index`, `chunk_id`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub similarity: f64,
    pub metadata: Metadata,
}

impl RetrievedDocument {
    pub fn doc_id(&self) -> &str {
        self.metadata
            .get("doc_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    chunks: Arc<dyn ChunkStore>,
    top_k: usize,
    threshold: f64,
}

impl VectorRetriever {
    /// Non-positive `top_k` or `threshold` fall back to 5 and 0.7.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chunks: Arc<dyn ChunkStore>,
        top_k: i64,
        threshold: f64,
    ) -> Self {
        Self {
            embedder,
            chunks,
            top_k: if top_k <= 0 { DEFAULT_TOP_K } else { top_k as usize },
            threshold: if threshold <= 0.0 { DEFAULT_THRESHOLD } else { threshold },
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Retrieve with the configured `top_k`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        self.retrieve_top(query, None).await
    }

    /// Retrieve, overriding `top_k` for this call when given a positive value.
    ///
    /// Results have `similarity > threshold` and are ordered best first.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty or blank query (no embedding call is
    /// made); embedding and store failures otherwise.
    pub async fn retrieve_top(&self, query: &str, top_k: Option<i64>) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query is empty".into()));
        }
        let top_k = match top_k {
            Some(k) if k > 0 => k as usize,
            _ => self.top_k,
        };

        let vector = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|e| e.context("embed query"))?;
        let literal = to_vector_literal(&vector);

        let hits = self
            .chunks
            .search_similar(&literal, top_k, self.threshold)
            .await
            .map_err(|e| e.context("search similar chunks"))?;
        debug!(hits = hits.len(), top_k, threshold = self.threshold, "retrieved chunks");

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut metadata = Metadata::new();
                metadata.insert("doc_id".into(), hit.chunk.doc_id.clone().into());
                metadata.insert("chunk_index".into(), hit.chunk.chunk_index.into());
                metadata.insert("chunk_id".into(), hit.chunk.id.into());
                RetrievedDocument {
                    content: hit.chunk.content,
                    similarity: hit.similarity,
                    metadata,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::NewChunk;
    use crate::processor::tests::LetterEmbedder;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    /// Embedder with a fixed text → vector table.
    struct TableEmbedder(HashMap<String, Vec<f32>>);

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            self.0
                .get(text)
                .cloned()
                .ok_or_else(|| Error::Upstream(format!("no vector for {text}")))
        }
    }

    async fn seeded(vectors: &[[f32; 2]]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let chunks: Vec<NewChunk> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| NewChunk {
                doc_id: "doc".into(),
                chunk_index: i as i64,
                content: format!("chunk-{i}"),
                embedding: to_vector_literal(v),
                metadata: Metadata::new(),
            })
            .collect();
        ChunkStore::batch_create(store.as_ref(), &chunks).await.unwrap();
        store
    }

    fn table(query: &str, v: [f32; 2]) -> Arc<TableEmbedder> {
        Arc::new(TableEmbedder(HashMap::from([(query.to_string(), v.to_vec())])))
    }

    #[test]
    fn test_defaults_for_non_positive_settings() {
        let r = VectorRetriever::new(
            Arc::new(LetterEmbedder::new()),
            Arc::new(InMemoryStore::new()),
            0,
            -1.0,
        );
        assert_eq!(r.top_k(), 5);
        assert_eq!(r.threshold(), 0.7);
    }

    #[tokio::test]
    async fn test_empty_query_fails_before_embedding() {
        let embedder = Arc::new(LetterEmbedder::new());
        let r = VectorRetriever::new(embedder.clone(), Arc::new(InMemoryStore::new()), 5, 0.7);
        let err = r.retrieve("  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_top_three_of_five_above_threshold() {
        let store = seeded(&[[1.0, 0.05], [1.0, 0.3], [1.0, 0.0], [1.0, 0.2], [1.0, 0.1]]).await;
        let r = VectorRetriever::new(table("q", [1.0, 0.0]), store, 3, 0.5);

        let docs = r.retrieve("q").await.unwrap();
        let order: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(order, vec!["chunk-2", "chunk-0", "chunk-4"]);
        assert!(docs.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(docs[0].doc_id(), "doc");
        assert_eq!(docs[0].metadata["chunk_index"], 2);
        assert!(docs[0].metadata.contains_key("chunk_id"));
    }

    #[tokio::test]
    async fn test_never_returns_at_or_below_threshold() {
        let store = seeded(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]).await;
        let r = VectorRetriever::new(table("q", [1.0, 0.0]), store, 10, 0.75);
        let docs = r.retrieve("q").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs.iter().all(|d| d.similarity > 0.75));
    }

    #[tokio::test]
    async fn test_per_call_top_k_override() {
        let store = seeded(&[[1.0, 0.0], [1.0, 0.1], [1.0, 0.2]]).await;
        let r = VectorRetriever::new(table("q", [1.0, 0.0]), store, 1, 0.5);
        assert_eq!(r.retrieve("q").await.unwrap().len(), 1);
        assert_eq!(r.retrieve_top("q", Some(3)).await.unwrap().len(), 3);
        assert_eq!(r.retrieve_top("q", Some(0)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let store = seeded(&[[0.0, 1.0]]).await;
        let r = VectorRetriever::new(table("q", [1.0, 0.0]), store, 5, 0.7);
        assert!(r.retrieve("q").await.unwrap().is_empty());
    }
}
