//! OpenAI chat-completions client and embeddings backend.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use titlewise_core::Embed;

use crate::llm::{LanguageModel, LlmError, ResponseSchema};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Client settings, shared by the chat client and the embedder.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            timeout: Duration::from_secs(120),
        }
    }
}

fn build_client(config: &OpenAiConfig) -> Result<(reqwest::Client, String), LlmError> {
    let client = reqwest::Client::builder().timeout(config.timeout).build()?;
    Ok((client, config.base_url.trim_end_matches('/').to_string()))
}

// ── Chat ──

pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let (client, base_url) = build_client(&config)?;
        Ok(Self {
            client,
            config: OpenAiConfig { base_url, ..config },
        })
    }
}

fn system_prompt(schema: ResponseSchema) -> String {
    format!(
        "You are a meticulous property title reviewer. Always output a single valid {} JSON object.",
        schema.name()
    )
}

fn choice_text(response: ChatResponse) -> Result<String, LlmError> {
    let choice = response.choices.into_iter().next().ok_or(LlmError::Empty)?;
    debug!(finish_reason = ?choice.finish_reason, "model responded");
    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmError::Empty),
    }
}

fn send_error(e: reqwest::Error, timeout: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(timeout.as_millis() as u64)
    } else {
        LlmError::Http(e)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn generate(&self, prompt: &str, schema: ResponseSchema) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let system = system_prompt(schema);
        let request = ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        info!(model = %self.config.model, schema = schema.name(), prompt_chars = prompt.len(), "calling model");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, self.config.timeout))?;
        let response: ChatResponse = check_status(resp).await?.json().await?;
        choice_text(response)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// ── Embeddings ──

/// `/v1/embeddings` backend. The vector length is fixed by the model name.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    config: OpenAiConfig,
    dim: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Output length of the known OpenAI embedding models.
pub fn embedding_dim(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

impl OpenAiEmbedder {
    /// `config.model` names the embedding model.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let (client, base_url) = build_client(&config)?;
        let dim = embedding_dim(&config.model);
        Ok(Self {
            client,
            config: OpenAiConfig { base_url, ..config },
            dim,
        })
    }
}

fn first_embedding(response: EmbeddingResponse, dim: usize) -> anyhow::Result<Vec<f32>> {
    let vector = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .context("embeddings response has no data")?;
    anyhow::ensure!(
        vector.len() == dim,
        "embedding has {} dimensions, expected {dim}",
        vector.len()
    );
    Ok(vector)
}

#[async_trait]
impl Embed for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.config.base_url);
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: [text],
        };
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, self.config.timeout))?;
        let response: EmbeddingResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(LlmError::Http)?;
        first_embedding(response, self.dim)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
