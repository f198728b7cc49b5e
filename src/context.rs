//! Suite-wide context object.
//!
//! One [`Harness`] is constructed at suite start and passed by reference
//! into every scenario; it owns the configuration, the credential provider,
//! and the session cache. There is no ambient global state — the original
//! lazy singletons are replaced by this explicit object.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigError, HarnessConfig};
use crate::credential::{CredentialError, CredentialProvider};
use crate::grid::{
    GridService, GridSession, JobDescriptor, JobDescriptorBuilder, JobPropertiesError,
};
use crate::job::JobDriver;
use crate::sessions::{SessionCache, SessionError};
use crate::staging::{self, StagedFile, StagingError};

/// Errors raised while constructing the harness.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum HarnessError {
    /// Raised when the configuration is invalid. Fatal: nothing remote is
    /// attempted.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when the credential provider cannot be set up.
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Explicit context shared by every scenario in a suite run.
pub struct Harness<S: GridService> {
    config: HarnessConfig,
    sessions: SessionCache<S>,
}

impl<S: GridService> Harness<S> {
    /// Validates `config` and wires the credential provider and session
    /// cache over `service`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when validation fails and
    /// [`HarnessError::Credential`] when the fixture store cannot be rooted.
    pub fn new(config: HarnessConfig, service: S) -> Result<Self, HarnessError> {
        config.validate()?;
        let credentials = CredentialProvider::new(config.credential_source.clone())?;
        let sessions = SessionCache::new(service, credentials, config.backend_set());
        Ok(Self { config, sessions })
    }

    /// Returns the suite configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the session cache.
    #[must_use]
    pub const fn sessions(&self) -> &SessionCache<S> {
        &self.sessions
    }

    /// Returns the session for `backend`, logging in on first access.
    ///
    /// # Errors
    ///
    /// See [`SessionCache::session`].
    pub async fn session(&self, backend: &str) -> Result<Arc<S::Session>, SessionError> {
        self.sessions.session(backend).await
    }

    /// Returns sessions for every configured backend in name order.
    ///
    /// # Errors
    ///
    /// See [`SessionCache::all_sessions`].
    pub async fn all_sessions(&self) -> Result<BTreeMap<String, Arc<S::Session>>, SessionError> {
        self.sessions.all_sessions().await
    }

    /// Mints a job name unique to this call, derived from the configured
    /// base name. Scenarios each get their own remote job and cannot
    /// corrupt one another's state.
    #[must_use]
    pub fn unique_jobname(&self) -> String {
        format!("{}-{}", self.config.jobname, Uuid::new_v4().simple())
    }

    /// Starts a descriptor builder pre-seeded with a unique job name.
    #[must_use]
    pub fn descriptor(&self) -> JobDescriptorBuilder {
        JobDescriptor::builder().name(self.unique_jobname())
    }

    /// Stages `source` under the configured remote parent.
    ///
    /// # Errors
    ///
    /// See [`staging::stage`].
    pub async fn stage_input(
        &self,
        session: &S::Session,
        source: &str,
    ) -> Result<StagedFile, StagingError> {
        staging::stage(session, source, &self.config.remote_parent).await
    }

    /// Creates a job from `descriptor` under the configured fqan and wraps
    /// it in a driver.
    ///
    /// # Errors
    ///
    /// Returns [`JobPropertiesError`] when the descriptor is invalid for
    /// the backend.
    pub async fn job(
        &self,
        session: &S::Session,
        descriptor: &JobDescriptor,
    ) -> Result<JobDriver<<S::Session as GridSession>::Job>, JobPropertiesError> {
        JobDriver::create(session, descriptor, &self.config.fqan).await
    }

    /// Logs out every cached session. Called once at suite teardown.
    pub async fn teardown(&self) {
        self.sessions.logout_all().await;
    }
}
