//! Credential loading and caching.
//!
//! The credential source is a JSON file naming the principal, its secret,
//! and the fixture files the suite expects on disk. It is read and parsed
//! at most once per [`CredentialProvider`]; every backend login shares the
//! same [`Credential`] by reference.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::fixtures::{FixtureError, FixtureStore};
use crate::grid::Credential;

/// Errors raised while resolving the suite credential.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CredentialError {
    /// Raised when the credential source file does not exist.
    #[error("credential source not found: {path}")]
    MissingSource {
        /// Path the source was expected at.
        path: Utf8PathBuf,
    },
    /// Raised when the credential source cannot be read.
    #[error("failed to read credential source {path}: {message}")]
    Unreadable {
        /// Path of the source file.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the credential source is not valid JSON.
    #[error("failed to parse credential source {path}: {message}")]
    Unparseable {
        /// Path of the source file.
        path: Utf8PathBuf,
        /// Parser error string.
        message: String,
    },
    /// Raised when a fixture named by the source cannot be materialised.
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Resolves the shared suite credential, loading it at most once.
#[derive(Debug)]
pub struct CredentialProvider {
    source: Utf8PathBuf,
    fixtures: FixtureStore,
    cell: OnceCell<Arc<Credential>>,
}

impl CredentialProvider {
    /// Creates a provider reading from `source`, extracting fixtures into
    /// the default temp-directory store.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Fixture`] when the fixture store cannot be
    /// rooted (non-UTF-8 temp directory).
    pub fn new(source: impl Into<Utf8PathBuf>) -> Result<Self, CredentialError> {
        Ok(Self::with_fixture_store(source, FixtureStore::in_temp_dir()?))
    }

    /// Creates a provider with an explicit fixture store.
    #[must_use]
    pub fn with_fixture_store(source: impl Into<Utf8PathBuf>, fixtures: FixtureStore) -> Self {
        Self {
            source: source.into(),
            fixtures,
            cell: OnceCell::new(),
        }
    }

    /// Returns the path of the credential source file.
    #[must_use]
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// Resolves the credential, loading and parsing the source on first
    /// call and serving the cached value afterwards.
    ///
    /// A failed load is not cached; a later call retries from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when the source is missing, unreadable,
    /// or unparseable, or when a named fixture cannot be materialised.
    pub async fn get(&self) -> Result<Arc<Credential>, CredentialError> {
        self.cell
            .get_or_try_init(|| async { self.load() })
            .await
            .cloned()
    }

    fn load(&self) -> Result<Arc<Credential>, CredentialError> {
        let raw = std::fs::read_to_string(&self.source).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                CredentialError::MissingSource {
                    path: self.source.clone(),
                }
            } else {
                CredentialError::Unreadable {
                    path: self.source.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        let credential: Credential =
            serde_json::from_str(&raw).map_err(|err| CredentialError::Unparseable {
                path: self.source.clone(),
                message: err.to_string(),
            })?;

        let fixture_names: Vec<&str> =
            credential.fixtures.iter().map(String::as_str).collect();
        self.fixtures.materialise_all(fixture_names)?;

        debug!(principal = %credential.principal, source = %self.source, "credential loaded");
        Ok(Arc::new(credential))
    }
}
