//! Fixed-interval polling loop for remote jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::{PollError, SubmitError, TransportError};

use super::{JobEvent, JobStatus, JobTransport};

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Fixed spacing between status checks. The cadence never changes
    /// while a poll is in flight.
    pub interval: Duration,
    /// Total wait budget. Once this much time has passed the poll is
    /// abandoned regardless of job progress.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(180),
        }
    }
}

/// Successful completion of a polled job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult<T> {
    /// The job's final output.
    pub output: T,
    /// The event the backend folded into the final output, for transports
    /// that finalize the last event. Never also handed to the event
    /// callback.
    pub final_event: Option<JobEvent>,
}

/// Every way a poll can end.
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The job succeeded and its output was fetched.
    Complete(JobResult<T>),
    /// The job ended as FAILED or CANCELLED. A normal outcome, carrying
    /// every event observed before the end.
    Failed {
        status: JobStatus,
        events: Vec<JobEvent>,
    },
    /// The wait budget ran out before the job reached a terminal state.
    TimedOut { waited: Duration, rounds: u32 },
    /// A status or result request failed. The poll stops at the first
    /// such failure; nothing is retried.
    TransportFailed(TransportError),
}

impl<T> PollOutcome<T> {
    /// Error-typed view of the outcome for `?`-style callers.
    pub fn into_result(self) -> Result<JobResult<T>, PollError> {
        match self {
            PollOutcome::Complete(result) => Ok(result),
            PollOutcome::Failed { status, events } => Err(PollError::JobFailed { status, events }),
            PollOutcome::TimedOut { waited, rounds } => Err(PollError::Timeout { waited, rounds }),
            PollOutcome::TransportFailed(e) => Err(PollError::Transport(e)),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PollOutcome::Complete(_))
    }
}

/// Drives a submitted job to an outcome by checking its status at a fixed
/// interval.
///
/// One `poll` call keeps exactly one piece of state across rounds: how
/// many events it has already handed to the callback. That count is what
/// makes delivery exactly-once and in-order no matter how the remote side
/// batches its progress into status responses.
pub struct JobPoller<T: JobTransport> {
    transport: Arc<T>,
    config: PollConfig,
}

impl<T: JobTransport> JobPoller<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_config(transport, PollConfig::default())
    }

    pub fn with_config(transport: Arc<T>, config: PollConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Start a job without waiting for it.
    pub async fn submit(&self, request: T::Request) -> Result<T::Handle, SubmitError> {
        self.transport.submit(request).await
    }

    /// Submit a job and poll it to an outcome.
    pub async fn run<F>(
        &self,
        request: T::Request,
        on_event: F,
    ) -> Result<PollOutcome<T::Output>, SubmitError>
    where
        F: FnMut(JobEvent),
    {
        let handle = self.transport.submit(request).await?;
        Ok(self.poll(&handle, on_event).await)
    }

    /// Poll a submitted job until it ends, times out, or the transport
    /// fails. `on_event` receives every newly observed event exactly
    /// once, in production order.
    pub async fn poll<F>(&self, handle: &T::Handle, mut on_event: F) -> PollOutcome<T::Output>
    where
        F: FnMut(JobEvent),
    {
        let started = Instant::now();
        let hold_back = self.transport.finalizes_last_event();
        let mut delivered = 0usize;
        let mut rounds = 0u32;

        loop {
            let waited = started.elapsed();
            if waited >= self.config.timeout {
                warn!(
                    rounds,
                    waited_ms = waited.as_millis() as u64,
                    "poll budget exhausted"
                );
                return PollOutcome::TimedOut { waited, rounds };
            }

            rounds += 1;
            let snapshot = match self.transport.status(handle).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(round = rounds, error = %e, "status check failed, aborting poll");
                    return PollOutcome::TransportFailed(e);
                }
            };
            debug!(
                round = rounds,
                status = %snapshot.status,
                events = snapshot.events.len(),
                "job status"
            );

            match snapshot.status {
                JobStatus::Running => {
                    delivered = deliver_new(&snapshot.events, delivered, hold_back, &mut on_event);
                    sleep(self.config.interval).await;
                }
                JobStatus::Succeeded => {
                    let final_event = if hold_back {
                        snapshot.events.last().cloned()
                    } else {
                        None
                    };
                    deliver_new(&snapshot.events, delivered, hold_back, &mut on_event);
                    let output = match self.transport.result(handle).await {
                        Ok(output) => output,
                        Err(e) => {
                            warn!(round = rounds, error = %e, "result fetch failed");
                            return PollOutcome::TransportFailed(e);
                        }
                    };
                    return PollOutcome::Complete(JobResult {
                        output,
                        final_event,
                    });
                }
                status @ (JobStatus::Failed | JobStatus::Cancelled) => {
                    debug!(%status, events = snapshot.events.len(), "job ended without a result");
                    return PollOutcome::Failed {
                        status,
                        events: snapshot.events,
                    };
                }
            }
        }
    }
}

/// Hand the not-yet-delivered portion of `events` to the callback and
/// return the new delivered count. A snapshot that shrinks below the
/// count delivers nothing rather than repeating. With `hold_back`, the
/// current last event stays undelivered until a later round displaces it.
fn deliver_new<F>(events: &[JobEvent], delivered: usize, hold_back: bool, on_event: &mut F) -> usize
where
    F: FnMut(JobEvent),
{
    let deliverable = if hold_back {
        events.len().saturating_sub(1)
    } else {
        events.len()
    };
    if deliverable <= delivered {
        return delivered;
    }
    for event in &events[delivered..deliverable] {
        on_event(event.clone());
    }
    deliverable
}
