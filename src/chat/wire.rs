//! Wire shapes for the chat completion gateway.
//!
//! The gateway speaks the widely-copied chat completions dialect: one
//! JSON request, answered either with a single body or with a stream of
//! `data:` chunks ending in a `[DONE]` marker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub n: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// Session identity of the requesting client, for attribution.
    pub user: String,
}

impl CompletionRequest {
    /// Streamed request with usage reporting, the client's default shape.
    pub fn streaming(model: &str, content: String, session: Uuid) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![Message::user(content)],
            max_tokens: 1000,
            temperature: 1.0,
            n: 1,
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
            user: session.to_string(),
        }
    }

    /// Single-body request.
    pub fn blocking(model: &str, content: String, session: Uuid) -> Self {
        Self {
            stream: false,
            stream_options: None,
            ..Self::streaming(model, content, session)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// One streamed chunk. Content chunks carry a delta; the final chunk may
/// carry only the usage record.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token accounting reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(rename = "prompt_tokens")]
    pub input_tokens: u64,
    #[serde(rename = "completion_tokens")]
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Non-streamed completion body.
#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: Message,
}

/// Error body the gateway attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct GatewayErrorBody {
    pub error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GatewayErrorDetail {
    pub message: String,
}
