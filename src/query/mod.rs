//! Analytical query service client.
//!
//! The service runs SQL against the lake asynchronously: a submission
//! answers with an execution id, status is polled until terminal, and
//! the materialized result set is fetched separately. `QueryClient`
//! implements [`JobTransport`] so the shared poller drives the wait.

pub mod profile;

pub use profile::ProfileQueries;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::QueryServiceConfig;
use crate::error::{QueryError, SubmitError, TransportError};
use crate::job::{JobEvent, JobPoller, JobSnapshot, JobTransport};

/// What a caller hands to the query service.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub sql: String,
    pub database: String,
    pub output_location: String,
}

/// Identifies a submitted query in later status and result calls.
#[derive(Debug, Clone)]
pub struct QueryHandle {
    pub execution_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// A tabular query result. The service sends the column header as the
/// first row; parsing splits it off so `rows` holds data only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    fn from_wire(wire: WireResults) -> Self {
        let mut rows = wire.rows.into_iter().map(|r| r.data);
        let columns = rows.next().unwrap_or_default();
        Self {
            columns,
            rows: rows.collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    query_execution_id: String,
}

#[derive(Debug, Deserialize)]
struct WireResults {
    #[serde(default)]
    rows: Vec<WireRow>,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    #[serde(default)]
    data: Vec<String>,
}

/// Client for the analytical query service.
#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    config: QueryServiceConfig,
}

impl QueryClient {
    pub fn new(config: QueryServiceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueryServiceConfig {
        &self.config
    }

    /// Request for a SQL statement, with this service's database and
    /// output location filled in.
    pub fn request(&self, sql: impl Into<String>) -> QueryRequest {
        QueryRequest {
            sql: sql.into(),
            database: self.config.database.clone(),
            output_location: self.config.output_location.clone(),
        }
    }

    /// Submit a statement and poll it to completion, discarding progress
    /// events.
    pub async fn execute(&self, sql: impl Into<String>) -> Result<ResultSet, QueryError> {
        self.execute_with(sql, |_| {}).await
    }

    /// Submit a statement and poll it to completion, handing each
    /// progress event to `on_event` as it is first observed.
    pub async fn execute_with<F>(
        &self,
        sql: impl Into<String>,
        on_event: F,
    ) -> Result<ResultSet, QueryError>
    where
        F: FnMut(JobEvent),
    {
        let poller = JobPoller::with_config(Arc::new(self.clone()), self.config.poll.clone());
        let outcome = poller.run(self.request(sql), on_event).await?;
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
impl JobTransport for QueryClient {
    type Request = QueryRequest;
    type Handle = QueryHandle;
    type Output = ResultSet;

    async fn submit(&self, request: QueryRequest) -> Result<QueryHandle, SubmitError> {
        let url = format!("{}/queries", self.config.base_url);
        debug!(database = %request.database, "submitting query");
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
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::Decode(e.to_string()))?;
        debug!(execution_id = %body.query_execution_id, "query accepted");
        Ok(QueryHandle {
            execution_id: body.query_execution_id,
            submitted_at: Utc::now(),
        })
    }

    async fn status(&self, handle: &QueryHandle) -> Result<JobSnapshot, TransportError> {
        let url = format!("{}/queries/{}", self.config.base_url, handle.execution_id);
        self.get_json(&url).await
    }

    async fn result(&self, handle: &QueryHandle) -> Result<ResultSet, TransportError> {
        let url = format!(
            "{}/queries/{}/results",
            self.config.base_url, handle.execution_id
        );
        let wire: WireResults = self.get_json(&url).await?;
        Ok(ResultSet::from_wire(wire))
    }
}
