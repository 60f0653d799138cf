//! Client for the Copernicus Climate Data Store retrieve API.
//!
//! A retrieval goes through three stages:
//!
//! 1. [`TaskSubmitter`] posts one request per time window and returns a
//!    [`RemoteTask`] pointing at the job's status endpoint.
//! 2. [`PollScheduler`] polls all tasks concurrently, bounded by a
//!    semaphore, with exponential backoff between polls.
//! 3. Successful jobs are downloaded to `<download_dir>/<identifier>.nc`.
//!
//! [`DataSource`] hides whether artifacts come from the archive
//! ([`CdsSource`]) or from a local directory ([`LocalFileSource`]).

pub mod backoff;
pub mod client;
pub mod download;
pub mod error;
pub mod request;
pub mod scheduler;
pub mod source;
pub mod submit;
pub mod task;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backoff::BackoffPolicy;
pub use client::{ArchiveClient, CdsClient, CdsClientConfig, JobStatus, SubmittedJob, AUTH_HEADER};
pub use error::{SubmitError, TransportError};
pub use request::RetrieveRequest;
pub use scheduler::{PollScheduler, SchedulerConfig};
pub use source::{CdsSource, DataSource, LocalFileSource};
pub use submit::TaskSubmitter;
pub use task::{RemoteTask, TaskOutcome};
