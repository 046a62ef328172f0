//! Chat completion gateway client.
//!
//! `ChatClient` drives streamed chat completions against an
//! OpenAI-compatible gateway, with per-session identity, optional
//! document context, and learning-style tailoring. Unrecoverable gateway
//! failures render to transcript text through
//! [`ChatError::transcript_message`](crate::error::ChatError).

pub mod wire;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::ChatError;
use crate::job::RetryPolicy;
use crate::session::SessionState;

use wire::{CompletionRequest, CompletionResponse, GatewayErrorBody, StreamChunk, TokenUsage};

/// Session key holding the server-side conversation id.
const CONVERSATION_KEY: &str = "chat_id";
/// Session key holding attached document text.
const DOCUMENT_KEY: &str = "document_text";
/// Marker closing a completion stream.
const STREAM_DONE: &str = "[DONE]";

/// A finished chat exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Client for the chat completion gateway.
///
/// Each instance carries its own session id and session state; two
/// clients in one process never share attribution or conversation
/// context.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    request_timeout: Duration,
    retry: RetryPolicy,
    session_id: Uuid,
    session: SessionState,
}

impl ChatClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url,
            api_key: config.api_key,
            model: config.model,
            request_timeout: config.request_timeout,
            retry: RetryPolicy::new(config.retry_attempts),
            session_id: Uuid::new_v4(),
            session: SessionState::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// State shared by the tasks of this client's session.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    // ── Session context ─────────────────────────────────────────────────

    /// Attach document text; later messages carry it as extra context.
    pub async fn attach_document(&self, text: impl Into<String>) {
        self.session
            .set(DOCUMENT_KEY, Value::String(text.into()))
            .await;
    }

    pub async fn clear_document(&self) {
        self.session.remove(DOCUMENT_KEY).await;
    }

    pub async fn document(&self) -> Option<String> {
        self.session
            .get(DOCUMENT_KEY)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub async fn set_conversation(&self, id: impl Into<String>) {
        self.session
            .set(CONVERSATION_KEY, Value::String(id.into()))
            .await;
    }

    pub async fn conversation(&self) -> Option<String> {
        self.session
            .get(CONVERSATION_KEY)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub async fn clear_conversation(&self) {
        self.session.remove(CONVERSATION_KEY).await;
    }

    // ── Sending ─────────────────────────────────────────────────────────

    /// Send a message with the configured model, streaming the reply.
    pub async fn send(&self, message: &str) -> Result<ChatReply, ChatError> {
        self.send_with_model(message, &self.model).await
    }

    /// Send a message with an explicit model, streaming the reply.
    pub async fn send_with_model(&self, message: &str, model: &str) -> Result<ChatReply, ChatError> {
        self.log_conversation().await;
        let content = self.augmented(message).await;
        let request = CompletionRequest::streaming(model, content, self.session_id);
        let response = self.retry.run(|_| self.post_completion(&request)).await?;
        self.collect_stream(response).await
    }

    /// Send a message tailored to a learning style.
    pub async fn send_with_learning_style(
        &self,
        message: &str,
        style: Option<&str>,
    ) -> Result<ChatReply, ChatError> {
        let message = match style {
            Some(style) => with_learning_style(message, style),
            None => message.to_string(),
        };
        self.send(&message).await
    }

    /// Send a message without streaming, parsing the single reply body.
    pub async fn complete(&self, message: &str) -> Result<ChatReply, ChatError> {
        self.log_conversation().await;
        let content = self.augmented(message).await;
        let request = CompletionRequest::blocking(&self.model, content, self.session_id);
        let response = self.retry.run(|_| self.post_completion(&request)).await?;
        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Decode("response contained no choices".to_string()))?;
        Ok(ChatReply {
            content: strip_reply(&choice.message.content),
            usage: body.usage,
        })
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    async fn log_conversation(&self) {
        match self.conversation().await {
            Some(id) => debug!(chat_id = %id, "found chat id in context"),
            None => debug!("did not find chat id in context"),
        }
    }

    async fn augmented(&self, message: &str) -> String {
        match self.document().await {
            Some(doc) => {
                debug!(document_chars = doc.len(), "attaching document context");
                format!("{message}\nThis document may help you: <document>{doc}</document>")
            }
            None => message.to_string(),
        }
    }

    async fn post_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<reqwest::Response, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = gateway_error_message(&body).unwrap_or(body);
        if status == 429 {
            Err(ChatError::RateLimited { message })
        } else {
            Err(ChatError::Gateway { status, message })
        }
    }

    async fn collect_stream(&self, response: reqwest::Response) -> Result<ChatReply, ChatError> {
        let mut stream = response.bytes_stream().eventsource();
        let mut content = String::new();
        let mut usage = None;

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| ChatError::Stream(e.to_string()))?;
            if event.data == STREAM_DONE {
                break;
            }
            match serde_json::from_str::<StreamChunk>(&event.data) {
                Ok(chunk) => {
                    if let Some(choice) = chunk.choices.first() {
                        if let Some(text) = &choice.delta.content {
                            content.push_str(text);
                        }
                    }
                    if let Some(u) = chunk.usage {
                        usage = Some(u);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "unparseable stream chunk");
                    content.push_str("Error while processing the response!");
                }
            }
        }

        Ok(ChatReply {
            content: strip_reply(&content),
            usage,
        })
    }
}

/// Strip leading whitespace and trailing newlines from a reply.
pub fn strip_reply(text: &str) -> String {
    text.trim_start().trim_end_matches('\n').to_string()
}

fn with_learning_style(message: &str, style: &str) -> String {
    format!(
        "{message}This user prefers their answers to match the following learning style \
         {style}. Your answer should explicitly be tailored to this style of learning."
    )
}

fn gateway_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GatewayErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
}
