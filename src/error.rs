//! Error types for lakechat.

use std::time::Duration;

use crate::job::{JobEvent, JobStatus};

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Polling error: {0}")]
    Poll(#[from] PollError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while submitting a job. The request never became a
/// tracked remote job.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Submission request failed: {0}")]
    Network(String),

    #[error("Submission rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed submission response: {0}")]
    Decode(String),
}

/// A single status or result request failed mid-poll. Surfaced as a
/// `PollOutcome::TransportFailed` value, never retried by the poller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Status request failed: {0}")]
    Request(String),

    #[error("Unexpected status {status} from job service: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed job service response: {0}")]
    Decode(String),
}

/// Error view of a finished poll, produced by `PollOutcome::into_result`.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Polling timed out after {waited:?} ({rounds} rounds)")]
    Timeout { waited: Duration, rounds: u32 },

    #[error("Polling aborted: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote job ended as {status} with {} partial events", events.len())]
    JobFailed {
        status: JobStatus,
        events: Vec<JobEvent>,
    },
}

/// Chat gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Gateway rate limited the request: {message}")]
    RateLimited { message: String },

    #[error("Gateway returned status {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("Chat request failed: {0}")]
    Request(String),

    #[error("Chat stream error: {0}")]
    Stream(String),

    #[error("Malformed gateway response: {0}")]
    Decode(String),
}

impl ChatError {
    /// Human-readable line appended to a conversation transcript when a
    /// chat exchange cannot be recovered.
    pub fn transcript_message(&self) -> String {
        match self {
            ChatError::RateLimited { message } => message.clone(),
            ChatError::Gateway { status, message } => {
                format!("API error occurred: {status} - {message}")
            }
            ChatError::Request(reason) | ChatError::Stream(reason) | ChatError::Decode(reason) => {
                format!("An unexpected error occurred: {reason}")
            }
        }
    }
}

/// Analytical query service errors.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid identifier in query: {0:?}")]
    InvalidIdentifier(String),

    #[error("Query submission failed: {0}")]
    Submit(#[from] SubmitError),

    #[error("Query did not complete: {0}")]
    Poll(#[from] PollError),

    #[error("Malformed result set: {0}")]
    Malformed(String),
}

/// Document text extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Extraction request failed: {0}")]
    Request(String),

    #[error("Extraction service error: {message}")]
    Service { message: String },

    #[error("Malformed extraction response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
