//! Collaborator contract for the grid middleware.
//!
//! The actual authentication protocol, scheduler, and file-transfer wire
//! protocol live in an external middleware library. This module captures the
//! surface the coordinator consumes: logging in to a named backend, staging
//! files through an authenticated session, and driving an opaque remote job
//! handle. Implementations are expected to be provided by middleware
//! bindings; tests use the scripted fake in [`crate::test_support`].

use std::future::Future;
use std::pin::Pin;

mod error;
mod types;

pub use error::{
    JobPropertiesError, LoginError, StatusError, SubmissionError, TransferError,
};
pub use types::{Credential, InputFile, JobDescriptor, JobDescriptorBuilder, JobStatus};

/// Future returned by collaborator operations.
pub type GridFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Entry point into the middleware: exchanges a credential and a backend
/// name for an authenticated session.
pub trait GridService: Send + Sync {
    /// Authenticated per-backend handle produced by a successful login.
    type Session: GridSession + Send + Sync + 'static;

    /// Logs in to `backend` using `credential`.
    ///
    /// Each call performs a fresh login; memoisation is the session cache's
    /// job, not the service's.
    fn login<'a>(
        &'a self,
        credential: &'a Credential,
        backend: &'a str,
    ) -> GridFuture<'a, Self::Session, LoginError>;
}

/// Authenticated handle to a single backend.
pub trait GridSession {
    /// Remote job handle created by [`GridSession::create_job`].
    type Job: JobControl + Send + Sync + 'static;

    /// Releases the session on the remote side.
    fn logout(&self) -> GridFuture<'_, (), StatusError>;

    /// Deletes the file at `uri`. Absence is success.
    fn delete_file<'a>(&'a self, uri: &'a str) -> GridFuture<'a, (), TransferError>;

    /// Copies `source` into the directory `dest_parent`. When `third_party`
    /// is set both endpoints are remote and the transfer happens without
    /// routing bytes through the local client.
    fn copy_file<'a>(
        &'a self,
        source: &'a str,
        dest_parent: &'a str,
        third_party: bool,
    ) -> GridFuture<'a, (), TransferError>;

    /// Returns the size in bytes of the file at `uri`.
    fn file_size<'a>(&'a self, uri: &'a str) -> GridFuture<'a, u64, TransferError>;

    /// Creates a job from `descriptor` under the authorisation scope `fqan`.
    ///
    /// The application and version declared by the descriptor are validated
    /// against the backend's package catalog before anything reaches the
    /// remote scheduler; an unknown application or version fails here, not
    /// at submission time.
    fn create_job<'a>(
        &'a self,
        descriptor: &'a JobDescriptor,
        fqan: &'a str,
    ) -> GridFuture<'a, Self::Job, JobPropertiesError>;
}

/// Capabilities of an opaque remote job handle.
pub trait JobControl {
    /// Submits the job to the remote scheduler. With `auto_queue` the
    /// backend picks a submission location itself.
    fn submit(&self, auto_queue: bool) -> GridFuture<'_, (), SubmissionError>;

    /// Fetches the current remote status. Never cached: every call reaches
    /// the remote system.
    fn status(&self) -> GridFuture<'_, JobStatus, StatusError>;

    /// Requests termination. With `wait` the call blocks until the remote
    /// side acknowledges the kill.
    fn kill(&self, wait: bool) -> GridFuture<'_, (), StatusError>;

    /// Returns the job's captured standard output.
    fn stdout(&self) -> GridFuture<'_, Vec<u8>, StatusError>;

    /// Returns the job's captured standard error.
    fn stderr(&self) -> GridFuture<'_, Vec<u8>, StatusError>;
}
