//! Answer synthesis (RAG chain).
//!
//! ```text
//! query ──▶ VectorRetriever ──▶ numbered context ──▶ prompt ──▶ ChatModel ──▶ Answer
//!                 │                                                  ▲
//!                 └── zero hits ──▶ NO_CONTEXT_ANSWER ───────────────┘
//! ```
//!
//! Zero retrieved chunks is a designed outcome, not an error: the chain
//! answers with [`NO_CONTEXT_ANSWER`] and an empty source list without
//! calling the model.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chat_model::{ChatMessage, ChatModel};
use crate::error::{Error, Result};
use crate::retriever::{RetrievedDocument, VectorRetriever};
use crate::store::DocumentStore;

pub const NO_CONTEXT_ANSWER: &str =
    "Sorry, I couldn't find any relevant documents to answer your question.";

pub const SYSTEM_INSTRUCTION: &str = "You are a knowledge base assistant. Answer the user's \
question using only the provided context. If the context does not contain the information \
needed, say so clearly.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub doc_id: String,
    /// Empty when the registry lookup misses or fails.
    pub doc_name: String,
    pub content: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceInfo>,
    pub usage: TokenUsage,
}

pub struct RagChain {
    retriever: VectorRetriever,
    model: Arc<dyn ChatModel>,
    documents: Arc<dyn DocumentStore>,
}

impl RagChain {
    pub fn new(
        retriever: VectorRetriever,
        model: Arc<dyn ChatModel>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            retriever,
            model,
            documents,
        }
    }

    pub async fn answer(&self, query: &str) -> Result<Answer> {
        self.answer_top(query, None).await
    }

    /// Answer `query`, optionally overriding the retriever's `top_k`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty query, before any store or model call.
    /// Retrieval and generation failures propagate with their stage name.
    pub async fn answer_top(&self, query: &str, top_k: Option<i64>) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query is empty".into()));
        }

        let docs = self
            .retriever
            .retrieve_top(query, top_k)
            .await
            .map_err(|e| e.context("retrieval"))?;

        if docs.is_empty() {
            info!("no relevant chunks; answering without the model");
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                usage: TokenUsage::default(),
            });
        }

        let context = build_context(&docs);
        let messages = vec![
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(build_prompt(query, &context)),
        ];

        let generation = self
            .model
            .generate(&messages)
            .await
            .map_err(|e| e.context("generate answer"))?;

        let usage = TokenUsage {
            prompt_tokens: generation.usage.prompt_tokens.unwrap_or(0),
            completion_tokens: generation.usage.completion_tokens.unwrap_or(0),
            total_tokens: generation.usage.total_tokens.unwrap_or(0),
        };

        let sources = self.attribute(docs).await;
        info!(
            sources = sources.len(),
            total_tokens = usage.total_tokens,
            model = self.model.model_name(),
            "answer generated"
        );

        Ok(Answer {
            answer: generation.content,
            sources,
            usage,
        })
    }

    /// Attach document names. Lookup failures degrade to an empty name.
    async fn attribute(&self, docs: Vec<RetrievedDocument>) -> Vec<SourceInfo> {
        let mut names: HashMap<String, String> = HashMap::new();
        let mut sources = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc_id = doc.doc_id().to_string();
            if !doc_id.is_empty() && !names.contains_key(&doc_id) {
                let name = match self.documents.get_by_id(&doc_id).await {
                    Ok(Some(d)) => d.doc_name,
                    Ok(None) => String::new(),
                    Err(e) => {
                        warn!(doc_id = %doc_id, error = %e, "document name lookup failed");
                        String::new()
                    }
                };
                names.insert(doc_id.clone(), name);
            }
            sources.push(SourceInfo {
                doc_name: names.get(&doc_id).cloned().unwrap_or_default(),
                doc_id,
                content: doc.content,
                similarity: doc.similarity,
            });
        }
        sources
    }
}

/// Numbered context block, one entry per retrieved chunk in rank order.
pub fn build_context(docs: &[RetrievedDocument]) -> String {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        out.push_str(&format!("[Document {}]\n", i + 1));
        out.push_str(&doc.content);
        out.push_str("\n\n");
    }
    out
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Answer the question based on the context below. Make sure the answer is accurate \
and complete, and quote the context where possible.\n\n\
Context:\n{context}\n\
Question: {query}\n\n\
Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_model::{Generation, UsageMetadata};
    use crate::embedding::{to_vector_literal, Embedder};
    use crate::error::ErrorKind;
    use crate::models::{Document, Metadata, NewChunk, SyncState};
    use crate::processor::tests::{letter_vector, LetterEmbedder};
    use crate::store::memory::InMemoryStore;
    use crate::store::ChunkStore;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: String,
        usage: UsageMetadata,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(reply: &str, usage: UsageMetadata) -> Self {
            Self {
                reply: reply.into(),
                usage,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(Generation {
                content: self.reply.clone(),
                usage: self.usage,
            })
        }
    }

    /// Registry whose lookups always fail.
    struct BrokenRegistry;

    #[async_trait]
    impl DocumentStore for BrokenRegistry {
        async fn create(&self, _: &Document) -> Result<()> {
            Err(Error::Upstream("down".into()))
        }
        async fn get_by_id(&self, _: &str) -> Result<Option<Document>> {
            Err(Error::Upstream("down".into()))
        }
        async fn get_by_path(&self, _: &str) -> Result<Option<Document>> {
            Err(Error::Upstream("down".into()))
        }
        async fn list(&self, _: i64, _: i64) -> Result<(Vec<Document>, i64)> {
            Err(Error::Upstream("down".into()))
        }
        async fn list_by_rag_state(&self, _: SyncState, _: i64) -> Result<Vec<Document>> {
            Err(Error::Upstream("down".into()))
        }
        async fn update(&self, _: &Document) -> Result<()> {
            Err(Error::Upstream("down".into()))
        }
        async fn delete(&self, _: &str) -> Result<bool> {
            Err(Error::Upstream("down".into()))
        }
        async fn update_sync_state(&self, _: &str, _: Option<SyncState>, _: Option<SyncState>) -> Result<()> {
            Err(Error::Upstream("down".into()))
        }
    }

    async fn store_with(texts: &[&str]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let chunks: Vec<NewChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| NewChunk {
                doc_id: "doc-a".into(),
                chunk_index: i as i64,
                content: t.to_string(),
                embedding: to_vector_literal(&letter_vector(t)),
                metadata: Metadata::new(),
            })
            .collect();
        ChunkStore::batch_create(store.as_ref(), &chunks).await.unwrap();
        DocumentStore::create(
            store.as_ref(),
            &Document {
                doc_id: "doc-a".into(),
                doc_name: "handbook.md".into(),
                doc_hash: "x".into(),
                file_path: "/docs/handbook.md".into(),
                file_type: ".md".into(),
                sync_rag_state: SyncState::Synced,
                sync_entity_state: SyncState::Pending,
                ctime: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();
        store
    }

    fn chain(
        embedder: Arc<dyn Embedder>,
        store: Arc<InMemoryStore>,
        registry: Arc<dyn DocumentStore>,
        model: Arc<ScriptedModel>,
    ) -> RagChain {
        RagChain::new(VectorRetriever::new(embedder, store, 5, 0.9), model, registry)
    }

    #[tokio::test]
    async fn test_empty_query_makes_no_calls() {
        let embedder = Arc::new(LetterEmbedder::new());
        let model = Arc::new(ScriptedModel::new("x", UsageMetadata::default()));
        let store = Arc::new(InMemoryStore::new());
        let c = chain(embedder.clone(), store.clone(), store, model.clone());

        let err = c.answer("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_hits_short_circuits() {
        let model = Arc::new(ScriptedModel::new("x", UsageMetadata::default()));
        let store = Arc::new(InMemoryStore::new());
        let c = chain(Arc::new(LetterEmbedder::new()), store.clone(), store, model.clone());

        let answer = c.answer("anything at all").await.unwrap();
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.usage, TokenUsage::default());
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_with_context_usage_and_names() {
        let text = "Rust ownership rules are strict";
        let store = store_with(&[text]).await;
        let model = Arc::new(ScriptedModel::new(
            "Ownership is strict.",
            UsageMetadata {
                prompt_tokens: Some(120),
                completion_tokens: None,
                total_tokens: Some(130),
            },
        ));
        let c = chain(Arc::new(LetterEmbedder::new()), store.clone(), store, model.clone());

        let answer = c.answer(text).await.unwrap();
        assert_eq!(answer.answer, "Ownership is strict.");
        assert_eq!(
            answer.usage,
            TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 0,
                total_tokens: 130
            }
        );
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].doc_id, "doc-a");
        assert_eq!(answer.sources[0].doc_name, "handbook.md");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].content, SYSTEM_INSTRUCTION);
        assert!(seen[0][1].content.contains(&format!("[Document 1]\n{text}\n\n")));
        assert!(seen[0][1].content.contains(&format!("Question: {text}")));
    }

    #[tokio::test]
    async fn test_registry_failure_degrades_to_empty_name() {
        let text = "graph traversal depth bound";
        let store = store_with(&[text]).await;
        let model = Arc::new(ScriptedModel::new("ok", UsageMetadata::default()));
        let c = chain(Arc::new(LetterEmbedder::new()), store, Arc::new(BrokenRegistry), model);

        let answer = c.answer(text).await.unwrap();
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].doc_name, "");
    }

    #[test]
    fn test_context_numbering() {
        let docs: Vec<RetrievedDocument> = ["first", "second"]
            .iter()
            .map(|c| RetrievedDocument {
                content: c.to_string(),
                similarity: 0.9,
                metadata: Metadata::new(),
            })
            .collect();
        assert_eq!(
            build_context(&docs),
            "[Document 1]\nfirst\n\n[Document 2]\nsecond\n\n"
        );
    }
}
