//! Backend session and job lifecycle coordinator for grid job-submission
//! test suites.
//!
//! The crate fronts an external grid middleware (authentication, scheduler,
//! and file transfer are opaque collaborators behind the [`grid`] traits)
//! and owns the coordination logic around it: lazy credential-bound session
//! establishment across named backends, size-verified input staging, and
//! the submit → poll → terminal-state/kill discipline over remote job
//! handles.

pub mod config;
pub mod context;
pub mod credential;
pub mod fixtures;
pub mod grid;
pub mod job;
pub mod sessions;
pub mod staging;
pub mod test_support;

pub use config::{ConfigError, HarnessConfig};
pub use context::{Harness, HarnessError};
pub use credential::{CredentialError, CredentialProvider};
pub use fixtures::{FixtureError, FixtureStore};
pub use grid::{
    Credential, GridFuture, GridService, GridSession, InputFile, JobControl, JobDescriptor,
    JobDescriptorBuilder, JobPropertiesError, JobStatus, LoginError, StatusError, SubmissionError,
    TransferError,
};
pub use job::{DriverError, JobDriver, PollPolicy};
pub use sessions::{SessionCache, SessionError};
pub use staging::{StagedFile, StagingError, stage};
