//! Hosted chat-completion API client.
//!
//! [`ChatClient`] is the seam the conversation manager talks to; the
//! production implementation is [`AnthropicClient`] (Messages API).
//! Every failure is classified as [`ChatError::Transient`] or
//! [`ChatError::Fatal`] so the retry policy can decide what to do.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::ChatError;
use crate::models::ConversationTurn;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One completion request: system prompt plus alternating turns, the last
/// of which is the user's rendered prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<ConversationTurn>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `request` and return the assistant's text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError>;
}

pub struct AnthropicClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

/// Whether an HTTP status from the chat API is worth retrying.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 529) || (500..600).contains(&status)
}

/// First text block of a Messages API response.
pub fn parse_response(json: &serde_json::Value) -> Result<String, ChatError> {
    json.get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        })
        .and_then(|b| b.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| ChatError::Fatal("response has no text content block".to_string()))
}

#[async_trait]
impl ChatClient for AnthropicClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transient(format!("connection error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %body, "chat API error response");
            let message = format!("chat API error {}: {}", status, body);
            return Err(if is_transient_status(status.as_u16()) {
                ChatError::Transient(message)
            } else {
                ChatError::Fatal(message)
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::Fatal(format!("malformed response: {}", e)))?;
        parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        for s in [408, 429, 500, 502, 503, 529] {
            assert!(is_transient_status(s), "{} should be transient", s);
        }
        for s in [400, 401, 403, 404, 422] {
            assert!(!is_transient_status(s), "{} should be fatal", s);
        }
    }

    #[test]
    fn parses_first_text_block() {
        let json = serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Use `cargo add`."}
            ]
        });
        assert_eq!(parse_response(&json).unwrap(), "Use `cargo add`.");
    }

    #[test]
    fn missing_text_is_fatal() {
        let err = parse_response(&serde_json::json!({"content": []})).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn request_serializes_messages_api_shape() {
        let req = ChatRequest {
            model: "claude-3-5-sonnet-latest".into(),
            max_tokens: 512,
            temperature: 0.5,
            system: "sys".into(),
            messages: vec![ConversationTurn::user("q")],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["system"], "sys");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "q");
    }
}
