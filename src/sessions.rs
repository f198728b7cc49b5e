//! Credential-bound session cache across named backends.
//!
//! Sessions are established lazily: the first request for a backend name
//! performs a login, later requests are served from cache. A failed login
//! is never cached, so a later request retries. Entries live for the whole
//! suite and are released only through [`SessionCache::logout_all`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::credential::CredentialError;
use crate::credential::CredentialProvider;
use crate::grid::{GridService, GridSession, LoginError};

/// Errors raised while resolving sessions.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when a backend name outside the configured set is requested.
    #[error("backend '{backend}' is not configured for this suite")]
    UnknownBackend {
        /// Requested backend name.
        backend: String,
    },
    /// Raised when the middleware rejects the login for one backend.
    #[error(transparent)]
    Login(#[from] LoginError),
    /// Raised when the shared credential cannot be resolved.
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

type Entry<S> = Arc<OnceCell<Arc<S>>>;

/// Maps backend names to memoised authenticated sessions.
///
/// Concurrent requests for the same name perform at most one login; requests
/// for different names log in independently. The entry map is guarded by a
/// plain mutex that is never held across an await — the per-name
/// [`OnceCell`] serialises the login itself.
pub struct SessionCache<S: GridService> {
    service: S,
    credentials: CredentialProvider,
    backends: BTreeSet<String>,
    entries: Mutex<BTreeMap<String, Entry<S::Session>>>,
}

impl<S: GridService> SessionCache<S> {
    /// Creates a cache over `service` restricted to `backends`.
    #[must_use]
    pub const fn new(
        service: S,
        credentials: CredentialProvider,
        backends: BTreeSet<String>,
    ) -> Self {
        Self {
            service,
            credentials,
            backends,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the configured backend names.
    #[must_use]
    pub const fn backends(&self) -> &BTreeSet<String> {
        &self.backends
    }

    /// Returns the session for `backend`, logging in on first access.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownBackend`] for names outside the
    /// configured set, [`SessionError::Credential`] when the shared
    /// credential cannot be loaded, and [`SessionError::Login`] when the
    /// middleware rejects the login. Login failures are not cached.
    pub async fn session(&self, backend: &str) -> Result<Arc<S::Session>, SessionError> {
        if !self.backends.contains(backend) {
            return Err(SessionError::UnknownBackend {
                backend: backend.to_owned(),
            });
        }

        let cell = self.entry(backend);
        cell.get_or_try_init(|| async {
            let credential = self.credentials.get().await?;
            debug!(backend, "logging in");
            let session = self.service.login(&credential, backend).await?;
            Ok::<_, SessionError>(Arc::new(session))
        })
        .await
        .cloned()
    }

    /// Returns sessions for every configured backend, logging in for any
    /// not yet cached. The map iterates in name order, so traversal is
    /// deterministic across runs.
    ///
    /// # Errors
    ///
    /// Propagates the first [`SessionError`] encountered; earlier successful
    /// logins stay cached.
    pub async fn all_sessions(&self) -> Result<BTreeMap<String, Arc<S::Session>>, SessionError> {
        let mut sessions = BTreeMap::new();
        for backend in &self.backends {
            let session = self.session(backend).await?;
            sessions.insert(backend.clone(), session);
        }
        Ok(sessions)
    }

    /// Logs out every cached session. Failures are logged and skipped so one
    /// unreachable backend cannot block teardown of the others.
    pub async fn logout_all(&self) {
        let cached: Vec<(String, Entry<S::Session>)> = {
            let entries = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries
                .iter()
                .map(|(name, cell)| (name.clone(), Arc::clone(cell)))
                .collect()
        };

        for (backend, cell) in cached {
            let Some(session) = cell.get() else {
                continue;
            };
            if let Err(err) = session.logout().await {
                warn!(backend, %err, "logout failed");
            } else {
                debug!(backend, "logged out");
            }
        }
    }

    fn entry(&self, backend: &str) -> Entry<S::Session> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .entry(backend.to_owned())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}
