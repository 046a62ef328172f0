//! Document text extraction client.
//!
//! Uploads raw document bytes to the extraction service and returns the
//! recovered plain text, ready to hand to
//! [`ChatClient::attach_document`](crate::chat::ChatClient::attach_document).
//! Converting formats is the service's business; this client only moves
//! bytes and text.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::config::ExtractorConfig;
use crate::error::ExtractError;

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ExtractErrorBody {
    error: ExtractErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ExtractErrorDetail {
    message: String,
}

/// Client for the document text extraction service.
pub struct DocumentExtractor {
    http: reqwest::Client,
    config: ExtractorConfig,
}

impl DocumentExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Upload document bytes and return the extracted text.
    pub async fn extract_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, ExtractError> {
        let url = format!("{}/extract", self.config.base_url);
        debug!(file_name, size = bytes.len(), "uploading document");
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Service {
                message: service_message(body),
            });
        }
        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Decode(e.to_string()))?;
        Ok(body.text)
    }

    /// Read a file from disk and extract its text.
    pub async fn extract_file(&self, path: impl AsRef<Path>) -> Result<String, ExtractError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document");
        self.extract_bytes(bytes, file_name).await
    }
}

/// Prefer the structured error message; fall back to the raw body.
fn service_message(body: String) -> String {
    serde_json::from_str::<ExtractErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body)
}
