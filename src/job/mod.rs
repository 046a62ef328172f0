//! Remote job tracking.
//!
//! Services in this system answer a submission with a handle, then expose
//! status plus an append-only event sequence until the job ends. This
//! module holds the pieces shared by every such client:
//!
//! - `status`: the job lifecycle states
//! - `event`: incremental output fragments
//! - `transport`: the seam a concrete backend implements
//! - `poller`: the fixed-interval polling loop
//! - `retry`: bounded retry for submissions

pub mod event;
pub mod poller;
pub mod retry;
pub mod status;
pub mod transport;

pub use event::JobEvent;
pub use poller::{JobPoller, JobResult, PollConfig, PollOutcome};
pub use retry::{Retryable, RetryPolicy};
pub use status::JobStatus;
pub use transport::{JobSnapshot, JobTransport};
