//! Chat-completion clients used for answer synthesis.
//!
//! - **[`OpenAIChatModel`]**: OpenAI-compatible `POST {base_url}/v1/chat/completions`.
//! - **[`OllamaChatModel`]**: `POST {base_url}/api/chat` with `stream: false`.
//! - **[`DisabledChatModel`]**: fails with `Unsupported`.
//!
//! Requests go through the same retry/backoff loop as the embedding
//! clients. Token usage is passed through when the provider reports it.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ragweave_core::chat_model::{ChatMessage, ChatModel, Generation, UsageMetadata};
use ragweave_core::{Error, Result};

use crate::config::LlmConfig;
use crate::embedding::{http_client, post_with_retry};

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        })
        .collect()
}

// ============ Disabled ============

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _messages: &[ChatMessage]) -> Result<Generation> {
        Err(Error::Unsupported(
            "answer generation is disabled; set [llm].provider".into(),
        ))
    }
}

// ============ OpenAI-compatible ============

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

pub struct OpenAIChatModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAIChatModel {
    /// Requires `OPENAI_API_KEY` in the environment.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.base_url.as_deref().unwrap_or(OPENAI_URL).trim_end_matches('/');

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{base}/v1/chat/completions"),
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

fn parse_openai_chat(json: serde_json::Value) -> Result<Generation> {
    let body: OpenAiChatResponse = serde_json::from_value(json)
        .map_err(|e| Error::Upstream(format!("invalid OpenAI chat response: {e}")))?;
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Upstream("OpenAI chat response has no choices".into()))?;
    let usage = body
        .usage
        .map(|u| UsageMetadata {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();
    Ok(Generation { content, usage })
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let req = OpenAiChatRequest {
            model: &self.model,
            messages: wire_messages(messages),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let body = serde_json::to_value(&req)?;
        let json = post_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_chat(json)
    }
}

// ============ Ollama ============

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

pub struct OllamaChatModel {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let base = config.base_url.as_deref().unwrap_or(OLLAMA_URL).trim_end_matches('/');

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{base}/api/chat"),
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

fn parse_ollama_chat(json: serde_json::Value) -> Result<Generation> {
    let body: OllamaChatResponse = serde_json::from_value(json)
        .map_err(|e| Error::Upstream(format!("invalid Ollama chat response: {e}")))?;
    let total = match (body.prompt_eval_count, body.eval_count) {
        (Some(p), Some(c)) => Some(p + c),
        _ => None,
    };
    Ok(Generation {
        content: body.message.content,
        usage: UsageMetadata {
            prompt_tokens: body.prompt_eval_count,
            completion_tokens: body.eval_count,
            total_tokens: total,
        },
    })
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let req = OllamaChatRequest {
            model: &self.model,
            messages: wire_messages(messages),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };
        let body = serde_json::to_value(&req)?;
        let json = post_with_retry(&self.client, &self.url, None, &body, self.max_retries, "Ollama").await?;
        parse_ollama_chat(json)
    }
}

/// Build the chat model named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
