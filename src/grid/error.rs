//! Error types for the collaborator contract.

use thiserror::Error;

/// Raised when a login against a named backend fails.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("login to backend '{backend}' failed: {message}")]
pub struct LoginError {
    /// Backend the login was attempted against.
    pub backend: String,
    /// Message reported by the middleware.
    pub message: String,
}

/// Raised by remote file operations (delete, copy, size lookup).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransferError {
    /// Raised when a copy between two locations fails.
    #[error("transfer from {source} to {dest} failed: {message}")]
    Copy {
        /// Source reference passed to the transfer.
        r#source: String,
        /// Destination parent the transfer targeted.
        dest: String,
        /// Message reported by the middleware.
        message: String,
    },
    /// Raised when a size lookup targets a file that does not exist.
    #[error("remote file not found: {uri}")]
    NotFound {
        /// URI that could not be resolved.
        uri: String,
    },
    /// Raised for any other remote file-operation failure.
    #[error("remote file operation on {uri} failed: {message}")]
    Io {
        /// URI the operation targeted.
        uri: String,
        /// Message reported by the middleware.
        message: String,
    },
}

/// Raised when a job descriptor cannot be turned into a remote job.
///
/// Validation happens client-side against the backend's package catalog, so
/// an invalid application or version never reaches the remote scheduler.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JobPropertiesError {
    /// Raised when a required descriptor field is empty.
    #[error("missing or empty descriptor field: {0}")]
    MissingField(String),
    /// Raised when the declared application is not in the package catalog.
    #[error("application '{application}' is not available on this backend")]
    UnknownApplication {
        /// Application name declared by the descriptor.
        application: String,
    },
    /// Raised when the declared version is not provided for the application.
    #[error("version '{version}' of application '{application}' is not available")]
    UnknownVersion {
        /// Application name declared by the descriptor.
        application: String,
        /// Version declared by the descriptor.
        version: String,
    },
}

/// Raised when the remote scheduler rejects a submission.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("submission of job '{job}' rejected: {message}")]
pub struct SubmissionError {
    /// Name of the rejected job.
    pub job: String,
    /// Message reported by the scheduler.
    pub message: String,
}

/// Raised when a poll, kill, or output fetch cannot reach the remote
/// execution agent.
///
/// These failures are transient by contract: the lifecycle driver retries
/// them inside its polling loop rather than surfacing a terminal failure.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StatusError {
    /// Raised while the execution agent is unreachable, for example during a
    /// job-manager restart.
    #[error("execution agent unreachable: {message}")]
    Unreachable {
        /// Message reported by the middleware.
        message: String,
    },
}
