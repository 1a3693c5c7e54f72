//! JSON HTTP API.
//!
//! Exposes the document registry, ingestion, question answering, the chat
//! log and graph sync over HTTP. Every service call goes through the same
//! [`App`] the CLI uses.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/api/v1/documents` | Register a file `{file_path, doc_name?}` |
//! | `GET`    | `/api/v1/documents` | Page of documents `?page&per_page` |
//! | `GET`    | `/api/v1/documents/{id}` | One document |
//! | `DELETE` | `/api/v1/documents/{id}` | Delete a document with its chunks and entities |
//! | `POST`   | `/api/v1/documents/{id}/process` | Chunk, embed and index one document |
//! | `POST`   | `/api/v1/query` | Answer `{query, top_k?}` with sources |
//! | `POST`   | `/api/v1/chat/messages` | Append `{role, content, metadata?}` |
//! | `GET`    | `/api/v1/chat/messages` | List `?limit&offset&role` |
//! | `GET`    | `/api/v1/chat/messages/{id}` | One message |
//! | `DELETE` | `/api/v1/chat/messages/{id}` | Delete one message |
//! | `POST`   | `/api/v1/chat/search` | Similar messages `{query, top_k?}` |
//! | `POST`   | `/api/v1/graph/documents/{id}/sync` | Project a document into the graph |
//! | `GET`    | `/api/v1/graph/documents/{id}/entities` | Entities linked to a document node |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: document 42" } }
//! ```
//!
//! | Error kind | Status | Code |
//! |------------|--------|------|
//! | `NotFound` | 404 | `not_found` |
//! | `InvalidInput`, `Empty` | 400 | `bad_request` |
//! | `Conflict` | 409 | `conflict` |
//! | `Upstream` | 502 | `upstream_error` |
//! | `Unsupported` | 501 | `unsupported` |

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use ragweave_core::chat::DEFAULT_LIMIT;
use ragweave_core::documents::Page;
use ragweave_core::graph::node::EntityNode;
use ragweave_core::graph::sync::SyncSummary;
use ragweave_core::graph::Typed;
use ragweave_core::models::{ChatChunk, Document, Metadata};
use ragweave_core::rag::Answer;
use ragweave_core::{Error, ErrorKind};

use crate::app::{normalize_path, App};
use crate::config::Config;

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(App::open(config).await?);
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "HTTP server listening");
    println!("ragweave listening on http://{}", bind_addr);

    axum::serve(listener, router(app)).await?;
    Ok(())
}

pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/documents", post(handle_upload).get(handle_list_documents))
        .route("/documents/{id}", get(handle_get_document).delete(handle_delete_document))
        .route("/documents/{id}/process", post(handle_process_document))
        .route("/query", post(handle_query))
        .route("/chat/messages", post(handle_create_message).get(handle_list_messages))
        .route("/chat/messages/{id}", get(handle_get_message).delete(handle_delete_message))
        .route("/chat/search", post(handle_chat_search))
        .route("/graph/documents/{id}/sync", post(handle_graph_sync))
        .route("/graph/documents/{id}/entities", get(handle_graph_entities));

    Router::new()
        .route("/health", get(handle_health))
        .nest("/api/v1", api)
        .layer(cors)
        .with_state(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::InvalidInput | ErrorKind::Empty => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
            ErrorKind::Upstream => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ErrorKind::Unsupported => (StatusCode::NOT_IMPLEMENTED, "unsupported"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

#[derive(Deserialize)]
struct UploadRequest {
    file_path: String,
    #[serde(default)]
    doc_name: Option<String>,
}

async fn handle_upload(
    State(app): State<Arc<App>>,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let path = normalize_path(std::path::Path::new(&req.file_path));
    let doc = app.documents.upload(&path, req.doc_name.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

#[derive(Deserialize)]
struct PageParams {
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn handle_list_documents(
    State(app): State<Arc<App>>,
    Query(params): Query<PageParams>,
) -> ApiResult<Page<Document>> {
    let page = app
        .documents
        .list(params.page.unwrap_or(1), params.per_page.unwrap_or(20))
        .await?;
    Ok(Json(page))
}

async fn handle_get_document(State(app): State<Arc<App>>, Path(id): Path<String>) -> ApiResult<Document> {
    Ok(Json(app.documents.get(&id).await?))
}

async fn handle_delete_document(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    app.documents.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct ProcessResponse {
    doc_id: String,
    chunks: usize,
}

async fn handle_process_document(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<ProcessResponse> {
    let chunks = app.documents.process(&id).await?;
    Ok(Json(ProcessResponse { doc_id: id, chunks }))
}

// ============ Query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    top_k: Option<i64>,
}

async fn handle_query(State(app): State<Arc<App>>, Json(req): Json<QueryRequest>) -> ApiResult<Answer> {
    Ok(Json(app.rag.answer_top(&req.query, req.top_k).await?))
}

// ============ Chat ============

#[derive(Deserialize)]
struct CreateMessageRequest {
    role: String,
    content: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

async fn handle_create_message(
    State(app): State<Arc<App>>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<ChatChunk>), AppError> {
    let message = app
        .chat
        .create_message(&req.role, &req.content, req.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Deserialize)]
struct ListMessagesParams {
    limit: Option<i64>,
    offset: Option<i64>,
    role: Option<String>,
}

async fn handle_list_messages(
    State(app): State<Arc<App>>,
    Query(params): Query<ListMessagesParams>,
) -> ApiResult<Vec<ChatChunk>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let messages = match params.role.as_deref() {
        Some(role) => app.chat.messages_by_role(role, limit, offset).await?,
        None => app.chat.list_messages(limit, offset).await?,
    };
    Ok(Json(messages))
}

async fn handle_get_message(State(app): State<Arc<App>>, Path(id): Path<i64>) -> ApiResult<ChatChunk> {
    Ok(Json(app.chat.get_message(id).await?))
}

async fn handle_delete_message(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    app.chat.delete_message(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ChatSearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<i64>,
}

#[derive(Serialize)]
struct ScoredMessage {
    #[serde(flatten)]
    message: ChatChunk,
    similarity: f64,
}

async fn handle_chat_search(
    State(app): State<Arc<App>>,
    Json(req): Json<ChatSearchRequest>,
) -> ApiResult<Vec<ScoredMessage>> {
    let hits = app
        .chat
        .search_similar(&req.query, req.top_k.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(
        hits.into_iter()
            .map(|hit| ScoredMessage {
                message: hit.chunk,
                similarity: hit.similarity,
            })
            .collect(),
    ))
}

// ============ Graph ============

async fn handle_graph_sync(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<SyncSummary> {
    Ok(Json(app.graph_sync.sync_document(&id).await?))
}

#[derive(Serialize)]
struct EntityResponse {
    id: String,
    #[serde(flatten)]
    attrs: EntityNode,
}

async fn handle_graph_entities(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<EntityResponse>> {
    let entities: Vec<Typed<EntityNode>> = app.document_graph().entities_of(&id).await?;
    Ok(Json(
        entities
            .into_iter()
            .map(|e| EntityResponse {
                id: e.id,
                attrs: e.attrs,
            })
            .collect(),
    ))
}
