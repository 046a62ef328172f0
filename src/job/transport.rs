//! Transport seam between the poller and a concrete job service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{SubmitError, TransportError};

use super::{JobEvent, JobStatus};

/// One observation of a remote job: its current state plus every event
/// produced so far. Successive snapshots of a well-behaved service only
/// ever extend the event sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub events: Vec<JobEvent>,
}

impl JobSnapshot {
    pub fn new(status: JobStatus, events: Vec<JobEvent>) -> Self {
        Self { status, events }
    }
}

/// A service that runs jobs remotely.
///
/// Implementations wrap one concrete backend (analytical queries, catalog
/// discovery runs) and translate its wire shapes into [`JobSnapshot`]s.
/// The poller drives the three calls; it never interprets backend detail.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// What a caller hands in to start a job.
    type Request: Send;
    /// Token identifying a submitted job in later calls.
    type Handle: Send + Sync;
    /// Final result produced by a successful job.
    type Output: Send;

    /// Start a job. Returns as soon as the backend has accepted it.
    async fn submit(&self, request: Self::Request) -> Result<Self::Handle, SubmitError>;

    /// Observe the job's current status and accumulated events.
    async fn status(&self, handle: &Self::Handle) -> Result<JobSnapshot, TransportError>;

    /// Fetch the final output. Only meaningful once `status` has reported
    /// `Succeeded`.
    async fn result(&self, handle: &Self::Handle) -> Result<Self::Output, TransportError>;

    /// Whether this backend folds the last event of the sequence into the
    /// final output. When true, the poller withholds the current last
    /// event each round and surfaces it on completion as
    /// `JobResult::final_event` rather than through the event callback.
    fn finalizes_last_event(&self) -> bool {
        false
    }
}
