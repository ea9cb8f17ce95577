//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::{LanguageModel, LlmError, ResponseSchema};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Client settings. Credentials are passed in by the caller; nothing is read
/// from the environment here.
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ClaudeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct ClaudeClient {
    client: reqwest::Client,
    config: ClaudeConfig,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ClaudeClient {
    pub fn new(config: ClaudeConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            config: ClaudeConfig { base_url, ..config },
        })
    }
}

fn system_prompt(schema: ResponseSchema) -> String {
    format!(
        "You are a meticulous property title reviewer. Respond with a single {} JSON object and nothing else.",
        schema.name()
    )
}

/// Concatenate the text blocks of a response.
fn response_text(response: MessagesResponse) -> Result<String, LlmError> {
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(text)
}

#[async_trait]
impl LanguageModel for ClaudeClient {
    async fn generate(&self, prompt: &str, schema: ResponseSchema) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system_prompt(schema),
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        info!(model = %self.config.model, schema = schema.name(), prompt_chars = prompt.len(), "calling model");
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout.as_millis() as u64)
                } else {
                    LlmError::Http(e)
                }
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: MessagesResponse = resp.json().await?;
        debug!(stop_reason = ?response.stop_reason, "model responded");
        response_text(response)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content": [{"type": "text", "text": "{\"a\":"}, {"type": "tool_use", "id": "x"}, {"type": "text", "text": "1}"}], "stop_reason": "end_turn"}"#,
        )
        .unwrap();
        assert_eq!(response_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn blank_response_is_error() {
        let response: MessagesResponse =
            serde_json::from_str(r#"{"content": [{"type": "text", "text": "  "}]}"#).unwrap();
        assert!(matches!(response_text(response), Err(LlmError::Empty)));
    }

    #[test]
    fn request_serializes_single_user_message() {
        let request = MessagesRequest {
            model: DEFAULT_MODEL,
            max_tokens: 10,
            temperature: 0.1,
            system: system_prompt(ResponseSchema::FinalReview),
            messages: [Message {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json["system"].as_str().unwrap().contains("REVIEW_OBJECT"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ClaudeClient::new(ClaudeConfig {
            base_url: "http://localhost:8080/".into(),
            ..ClaudeConfig::new("test-key")
        })
        .unwrap();
        assert_eq!(client.config.base_url, "http://localhost:8080");
        assert_eq!(client.model_name(), DEFAULT_MODEL);
    }
}
