//! Input staging with a post-transfer integrity check.
//!
//! Staging places an input artifact under a remote parent URI and verifies
//! byte-size parity between source and destination before declaring
//! success. A size mismatch is fatal for the scenario that requested the
//! staging: a retry could paper over a transient truncation, so corruption
//! is surfaced instead of masked.

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::grid::{GridSession, TransferError};

/// A successfully staged input file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedFile {
    /// Source reference the transfer started from (local path or URI).
    pub source: String,
    /// Remote URI of the staged copy.
    pub remote: String,
    /// Verified byte length of both copies.
    pub size: u64,
}

/// Errors raised while staging input files.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StagingError {
    /// Raised when the local source file cannot be inspected.
    #[error("failed to read local file {path}: {message}")]
    Local {
        /// Path of the local source.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a remote file operation fails.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// Raised when source and destination sizes differ after the copy.
    /// Never retried: the scenario that requested the staging is failed.
    #[error(
        "staged file size mismatch: {source} is {source_size} bytes but {remote} is {remote_size} bytes"
    )]
    SizeMismatch {
        /// Source reference of the transfer.
        r#source: String,
        /// Remote URI of the corrupt copy.
        remote: String,
        /// Byte length of the source.
        source_size: u64,
        /// Byte length reported for the remote copy.
        remote_size: u64,
    },
}

/// Joins a parent URI and a file name without doubling separators.
#[must_use]
pub fn remote_uri(parent: &str, file_name: &str) -> String {
    let trimmed = parent.trim_end_matches('/');
    format!("{trimmed}/{file_name}")
}

/// Returns `true` when `reference` addresses a remote location rather than
/// a local path.
#[must_use]
pub fn is_remote_reference(reference: &str) -> bool {
    reference.contains("://")
}

/// Stages `source` under `remote_parent` and verifies size parity.
///
/// Any pre-existing file at the destination is deleted first (absence is
/// not an error), so staging is idempotent. The copy runs as a third-party
/// transfer when the source itself is remote-addressable.
///
/// # Errors
///
/// Returns [`StagingError::Local`] when a local source cannot be read,
/// [`StagingError::Transfer`] when a remote operation fails, and
/// [`StagingError::SizeMismatch`] when the copied file does not match the
/// source length. A mismatch must not be retried.
pub async fn stage<S: GridSession>(
    session: &S,
    source: &str,
    remote_parent: &str,
) -> Result<StagedFile, StagingError> {
    let file_name = source_file_name(source);
    let destination = remote_uri(remote_parent, file_name);
    let third_party = is_remote_reference(source);

    session.delete_file(&destination).await?;
    debug!(source, destination, third_party, "copying input file");
    session.copy_file(source, remote_parent, third_party).await?;

    let source_size = if third_party {
        session.file_size(source).await?
    } else {
        local_size(source)?
    };
    let remote_size = session.file_size(&destination).await?;

    if source_size != remote_size {
        return Err(StagingError::SizeMismatch {
            source: source.to_owned(),
            remote: destination,
            source_size,
            remote_size,
        });
    }

    Ok(StagedFile {
        source: source.to_owned(),
        remote: destination,
        size: remote_size,
    })
}

fn source_file_name(source: &str) -> &str {
    source
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(source)
}

fn local_size(source: &str) -> Result<u64, StagingError> {
    let path = Utf8PathBuf::from(source);
    let metadata = std::fs::metadata(&path).map_err(|err| StagingError::Local {
        path: path.clone(),
        message: err.to_string(),
    })?;
    Ok(metadata.len())
}
