//! Catalog discovery run client.
//!
//! Discovery runs crawl a data source and register the assets they find.
//! The client can fire a run and walk away, or poll it and stream each
//! discovered asset as it first appears. The service closes every run by
//! appending a summary event that duplicates the final accounting, so
//! the transport finalizes the last event: the summary never reaches the
//! asset callback, it arrives as the poll result instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::error::{Error, SubmitError, TransportError};
use crate::job::{JobEvent, JobPoller, JobSnapshot, JobTransport};

/// What a caller hands to the discovery service.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    /// Catalog source to crawl.
    pub source: String,
}

/// Identifies a started run in later status and result calls.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// Final accounting for a finished discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunSummary {
    pub source: String,
    pub assets_discovered: u64,
}

#[derive(Debug, Deserialize)]
struct StartRunResponse {
    run_id: String,
}

/// Client for the catalog discovery service.
#[derive(Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    config: DiscoveryConfig,
}

impl DiscoveryClient {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Start a run and return immediately. The run keeps going whether or
    /// not anyone polls the handle; dropping it is the only way to stop
    /// watching.
    pub async fn trigger(&self, source: impl Into<String>) -> Result<RunHandle, SubmitError> {
        let request = RunRequest {
            source: source.into(),
        };
        let handle = self.submit(request).await?;
        info!(run_id = %handle.run_id, "discovery run started");
        Ok(handle)
    }

    /// Start a run and poll it to completion, handing each discovered
    /// asset to `on_event` as it first appears.
    pub async fn await_run<F>(
        &self,
        source: impl Into<String>,
        on_event: F,
    ) -> Result<RunSummary, Error>
    where
        F: FnMut(JobEvent),
    {
        let poller = JobPoller::with_config(Arc::new(self.clone()), self.config.poll.clone());
        let request = RunRequest {
            source: source.into(),
        };
        let outcome = poller.run(request, on_event).await?;
        Ok(outcome.into_result()?.output)
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, TransportError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobTransport for DiscoveryClient {
    type Request = RunRequest;
    type Handle = RunHandle;
    type Output = RunSummary;

    async fn submit(&self, request: RunRequest) -> Result<RunHandle, SubmitError> {
        let url = format!("{}/runs", self.config.base_url);
        debug!(source = %request.source, "starting discovery run");
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SubmitError::Rejected { status, message });
        }
        let body: StartRunResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::Decode(e.to_string()))?;
        Ok(RunHandle {
            run_id: body.run_id,
            submitted_at: Utc::now(),
        })
    }

    async fn status(&self, handle: &RunHandle) -> Result<JobSnapshot, TransportError> {
        let url = format!("{}/runs/{}", self.config.base_url, handle.run_id);
        self.get_json(&url).await
    }

    async fn result(&self, handle: &RunHandle) -> Result<RunSummary, TransportError> {
        let url = format!("{}/runs/{}/result", self.config.base_url, handle.run_id);
        self.get_json(&url).await
    }

    fn finalizes_last_event(&self) -> bool {
        true
    }
}
