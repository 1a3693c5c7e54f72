//! End-to-end flows through [`App`] backed by SQLite, with deterministic
//! in-process providers standing in for the embedding and chat APIs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ragweave::app::{normalize_path, App};
use ragweave::config::Config;
use ragweave_core::chat_model::{ChatMessage, ChatModel, Generation, UsageMetadata};
use ragweave_core::embedding::Embedder;
use ragweave_core::models::{Metadata, NewEntity, SyncState};
use ragweave_core::rag::NO_CONTEXT_ANSWER;
use ragweave_core::store::{ChunkStore, EntityStore};
use ragweave_core::{ErrorKind, Result};
use tempfile::TempDir;

const KEYWORDS: [&str; 3] = ["rust", "python", "docker"];

/// Counts keyword occurrences, plus a small constant component so no
/// vector is all zeros.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keywords"
    }

    fn dims(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS.iter().map(|k| lower.matches(k).count() as f32).collect();
        v.push(0.01);
        Ok(v)
    }
}

/// Replies with a fixed answer and counts calls.
struct EchoModel {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages.last().map(|m| m.content.len() as u32).unwrap_or(0);
        Ok(Generation {
            content: "Rust uses cargo.".into(),
            usage: UsageMetadata {
                prompt_tokens: Some(prompt),
                completion_tokens: Some(4),
                total_tokens: Some(prompt + 4),
            },
        })
    }
}

struct Fixture {
    _tmp: TempDir,
    files: PathBuf,
    model: Arc<EchoModel>,
    app: App,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let files = tmp.path().join("files");
    std::fs::create_dir_all(&files).unwrap();
    std::fs::write(
        files.join("alpha.md"),
        "# Alpha\n\nRust programming with cargo.\n\nRust crates and rust tooling.",
    )
    .unwrap();
    std::fs::write(
        files.join("beta.txt"),
        "Python notebooks.\n\nPython and machine learning.",
    )
    .unwrap();

    let config: Config = toml::from_str(&format!(
        r#"[db]
path = "{}/data/weave.sqlite"

[splitter]
chunk_size = 40
chunk_overlap = 5

[retrieval]
top_k = 4
similarity_threshold = 0.5

[embedding]
provider = "ollama"
model = "keywords"
dims = 4
"#,
        tmp.path().display()
    ))
    .unwrap();

    let model = Arc::new(EchoModel {
        calls: AtomicUsize::new(0),
    });
    let app = App::with_providers(&config, Arc::new(KeywordEmbedder), model.clone())
        .await
        .unwrap();

    Fixture {
        _tmp: tmp,
        files,
        model,
        app,
    }
}

fn file(fx: &Fixture, name: &str) -> PathBuf {
    normalize_path(&fx.files.join(name))
}

async fn upload(fx: &Fixture, name: &str) -> String {
    fx.app.documents.upload(&file(fx, name), None).await.unwrap().doc_id
}

#[tokio::test]
async fn test_process_pending_indexes_every_document() {
    let fx = fixture().await;
    let alpha = upload(&fx, "alpha.md").await;
    let beta = upload(&fx, "beta.txt").await;

    let report = fx.app.documents.process_pending(10).await.unwrap();
    assert_eq!(report.processed, 2);
    assert!(report.failed.is_empty());
    assert!(report.chunks >= 2);

    for id in [&alpha, &beta] {
        let doc = fx.app.documents.get(id).await.unwrap();
        assert_eq!(doc.sync_rag_state, SyncState::Synced);
        assert_eq!(doc.sync_entity_state, SyncState::Pending);
    }

    let chunks = ChunkStore::get_by_doc_id(fx.app.store.as_ref(), &alpha).await.unwrap();
    let indexes: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, (0..chunks.len() as i64).collect::<Vec<_>>());
    assert!(chunks.iter().all(|c| c.embedding.starts_with('[')));

    // nothing left to do
    let again = fx.app.documents.process_pending(10).await.unwrap();
    assert_eq!(again.processed, 0);
}

#[tokio::test]
async fn test_reprocess_replaces_chunks() {
    let fx = fixture().await;
    let alpha = upload(&fx, "alpha.md").await;

    let first = fx.app.documents.process(&alpha).await.unwrap();
    let second = fx.app.documents.process(&alpha).await.unwrap();
    assert_eq!(first, second);

    let count = ChunkStore::count_by_doc_id(fx.app.store.as_ref(), &alpha).await.unwrap();
    assert_eq!(count, second as i64);
}

#[tokio::test]
async fn test_answer_cites_matching_document() {
    let fx = fixture().await;
    upload(&fx, "alpha.md").await;
    upload(&fx, "beta.txt").await;
    fx.app.documents.process_pending(10).await.unwrap();

    let answer = fx.app.rag.answer_top("tell me about rust", None).await.unwrap();
    assert_eq!(answer.answer, "Rust uses cargo.");
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.iter().all(|s| s.doc_name == "alpha.md"));
    assert!(answer.sources[0].similarity > 0.9);
    assert_eq!(answer.usage.completion_tokens, 4);
    assert_eq!(fx.model.calls.load(Ordering::SeqCst), 1);

    let limited = fx.app.rag.answer_top("rust", Some(1)).await.unwrap();
    assert_eq!(limited.sources.len(), 1);
}

#[tokio::test]
async fn test_answer_without_hits_skips_model() {
    let fx = fixture().await;
    upload(&fx, "alpha.md").await;
    fx.app.documents.process_pending(10).await.unwrap();

    let answer = fx.app.rag.answer_top("kubernetes", None).await.unwrap();
    assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.usage.total_tokens, 0);
    assert_eq!(fx.model.calls.load(Ordering::SeqCst), 0);

    let err = fx.app.rag.answer_top("   ", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_delete_cascades_to_chunks_and_entities() {
    let fx = fixture().await;
    let alpha = upload(&fx, "alpha.md").await;
    fx.app.documents.process(&alpha).await.unwrap();
    EntityStore::create(fx.app.store.as_ref(), &entity(&alpha, "language", "Rust"))
        .await
        .unwrap();

    fx.app.documents.delete(&alpha).await.unwrap();
    assert_eq!(fx.app.documents.get(&alpha).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(ChunkStore::count_by_doc_id(fx.app.store.as_ref(), &alpha).await.unwrap(), 0);
    assert!(EntityStore::get_by_doc_id(fx.app.store.as_ref(), &alpha).await.unwrap().is_empty());
    assert_eq!(fx.app.documents.delete(&alpha).await.unwrap_err().kind(), ErrorKind::NotFound);

    // the path can be registered again
    assert_eq!(upload(&fx, "alpha.md").await, alpha);
}

#[tokio::test]
async fn test_list_pages_newest_first() {
    let fx = fixture().await;
    let alpha = upload(&fx, "alpha.md").await;
    let beta = upload(&fx, "beta.txt").await;

    let first = fx.app.documents.list(1, 1).await.unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.data.len(), 1);
    assert_eq!(first.data[0].doc_id, beta);

    let second = fx.app.documents.list(2, 1).await.unwrap();
    assert_eq!(second.data[0].doc_id, alpha);
    assert!(fx.app.documents.list(3, 1).await.unwrap().data.is_empty());
}

fn entity(doc_id: &str, entity_type: &str, name: &str) -> NewEntity {
    NewEntity {
        doc_id: doc_id.to_string(),
        entity_type: entity_type.to_string(),
        entity_name: name.to_string(),
        entity_value: name.to_lowercase(),
        metadata: Metadata::new(),
    }
}

#[tokio::test]
async fn test_graph_sync_projects_entities() {
    let fx = fixture().await;
    let alpha = upload(&fx, "alpha.md").await;
    let store = fx.app.store.as_ref();
    EntityStore::create(store, &entity(&alpha, "language", "Rust")).await.unwrap();
    EntityStore::create(store, &entity(&alpha, "tool", "Cargo")).await.unwrap();

    let summary = fx.app.graph_sync.sync_document(&alpha).await.unwrap();
    assert_eq!(summary.entities, 2);
    assert_eq!(
        fx.app.documents.get(&alpha).await.unwrap().sync_entity_state,
        SyncState::Synced
    );

    let mut names: Vec<String> = fx
        .app
        .document_graph()
        .entities_of(&alpha)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.attrs.entity_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Cargo", "Rust"]);

    // syncing again does not duplicate links
    fx.app.graph_sync.sync_document(&alpha).await.unwrap();
    assert_eq!(fx.app.document_graph().entities_of(&alpha).await.unwrap().len(), 2);

    let err = fx.app.graph_sync.sync_document("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_chat_log_and_similarity_search() {
    let fx = fixture().await;
    let chat = &fx.app.chat;

    let first = chat.create_message("user", "How do I use rust with docker?", None).await.unwrap();
    let second = chat.create_message("assistant", "Install python first.", None).await.unwrap();
    chat.create_message("system", "Be brief.", None).await.unwrap();
    assert_eq!(first.chunk_index, 0);
    assert_eq!(second.chunk_index, 1);
    assert!(first.embedding.is_some());

    let page = chat.list_messages(2, 1).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, second.id);
    assert_eq!(page[1].content, "Be brief.");

    let users = chat.messages_by_role("user", 10, 0).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(chat.messages_by_role("robot", 10, 0).await.unwrap_err().kind(), ErrorKind::InvalidInput);

    let hits = chat.search_similar("rust", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.id, first.id);

    chat.delete_message(second.id).await.unwrap();
    assert_eq!(chat.get_message(second.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        chat.create_message("user", "  ", None).await.unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
}

#[tokio::test]
async fn test_upload_errors() {
    let fx = fixture().await;
    let missing = fx.app.documents.upload(Path::new("/no/such/file.txt"), None).await;
    assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotFound);

    upload(&fx, "beta.txt").await;
    let dup = fx.app.documents.upload(&file(&fx, "beta.txt"), None).await;
    assert_eq!(dup.unwrap_err().kind(), ErrorKind::Conflict);
}

// ============ HTTP ============

async fn spawn_server(app: App) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = ragweave::server::router(Arc::new(app));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_http_document_flow() {
    let fx = fixture().await;
    let alpha_path = file(&fx, "alpha.md");
    let base = spawn_server(fx.app).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let resp = client
        .post(format!("{base}/api/v1/documents"))
        .json(&serde_json::json!({ "file_path": alpha_path.to_string_lossy() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let doc: serde_json::Value = resp.json().await.unwrap();
    let doc_id = doc["doc_id"].as_str().unwrap().to_string();
    assert_eq!(doc["sync_rag_state"], 0);

    let resp = client
        .post(format!("{base}/api/v1/documents"))
        .json(&serde_json::json!({ "file_path": alpha_path.to_string_lossy() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "conflict");

    let processed: serde_json::Value = client
        .post(format!("{base}/api/v1/documents/{doc_id}/process"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(processed["chunks"].as_u64().unwrap() > 0);

    let answer: serde_json::Value = client
        .post(format!("{base}/api/v1/query"))
        .json(&serde_json::json!({ "query": "rust", "top_k": 2 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["answer"], "Rust uses cargo.");
    assert_eq!(answer["sources"][0]["doc_name"], "alpha.md");

    let page: serde_json::Value = client
        .get(format!("{base}/api/v1/documents?page=1&per_page=5"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);

    let resp = client
        .delete(format!("{base}/api/v1/documents/{doc_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{base}/api/v1/documents/{doc_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_http_chat_validation() {
    let fx = fixture().await;
    let base = spawn_server(fx.app).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/chat/messages"))
        .json(&serde_json::json!({ "role": "robot", "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/api/v1/chat/messages"))
        .json(&serde_json::json!({ "role": "user", "content": "rust question", "metadata": { "session": "s1" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(created["metadata"]["session"], "s1");

    let listed: serde_json::Value = client
        .get(format!("{base}/api/v1/chat/messages?role=user"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let hits: serde_json::Value = client
        .post(format!("{base}/api/v1/chat/search"))
        .json(&serde_json::json!({ "query": "rust" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits[0]["content"], "rust question");
    assert!(hits[0]["similarity"].as_f64().unwrap() > 0.9);
}
