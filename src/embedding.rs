//! Embedding provider clients.
//!
//! Concrete [`Embedder`] implementations for the providers named in
//! `[embedding].provider`:
//! - **[`DisabledEmbedder`]**: fails every call with `Unsupported`.
//! - **[`OpenAIEmbedder`]**: `POST {url}/v1/embeddings`, batched.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed`, batched.
//!
//! # Retry Strategy
//!
//! Both network providers retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error): retry
//! - HTTP 4xx other than 429: fail immediately
//! - Network errors: retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Exhausted retries surface as `Upstream`. The ingestion pipeline itself
//! never retries; a failed document stays `Pending`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use ragweave_core::embedding::Embedder;
use ragweave_core::{Error, Result};

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

// ============ Disabled ============

/// Placeholder used when `provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed_one(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Unsupported(
            "embeddings are disabled; set [embedding].provider".into(),
        ))
    }

    async fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Unsupported(
            "embeddings are disabled; set [embedding].provider".into(),
        ))
    }
}

// ============ Shared HTTP plumbing ============

/// POST `body` to `url`, retrying 429, 5xx and network errors.
pub(crate) async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    provider: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(provider, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| Error::Upstream(format!("{provider} response: {e}")));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::Upstream(format!("{provider} API error {status}: {body_text}"));
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(Error::Upstream(format!(
                    "{provider} connection error ({url}): {e}"
                )));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Upstream(format!("{provider} request failed after retries"))))
}

pub(crate) fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn to_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|items| items.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

fn require_texts(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(Error::InvalidInput("no texts to embed".into()));
    }
    Ok(())
}

fn single(mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    match vectors.len() {
        1 => Ok(vectors.remove(0)),
        n => Err(Error::Upstream(format!("expected 1 embedding, got {n}"))),
    }
}

// ============ OpenAI ============

/// Embeddings via the OpenAI API.
///
/// Requires `OPENAI_API_KEY` in the environment at construction time.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_URL).trim_end_matches('/');

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{base}/v1/embeddings"),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Upstream("invalid OpenAI response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map_or(position, |i| i as usize);
        let vector = item
            .get("embedding")
            .and_then(to_vector)
            .ok_or_else(|| Error::Upstream("invalid OpenAI response: missing embedding".into()))?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_many(&[text.to_string()]).await?)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        require_texts(texts)?;
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

// ============ Ollama ============

/// Embeddings via a local Ollama instance.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_URL).trim_end_matches('/');

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{base}/api/embed"),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::Upstream("invalid Ollama response: missing embeddings array".into()))?;

    embeddings
        .iter()
        .map(|e| {
            to_vector(e)
                .ok_or_else(|| Error::Upstream("invalid Ollama response: embedding is not an array".into()))
        })
        .collect()
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_many(&[text.to_string()]).await?)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        require_texts(texts)?;
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_with_retry(&self.client, &self.url, None, &body, self.max_retries, "Ollama").await?;
        parse_ollama_response(&json)
    }
}

/// Build the embedder named by `config.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
