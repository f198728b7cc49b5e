//! Fixture extraction into a deterministic temp directory.
//!
//! Input files and helper scripts referenced by the suite are embedded in
//! the crate and written out on first use. Extraction is a cache fill, not
//! a refresh: a file that already exists is never rewritten, since fixture
//! content is immutable across runs.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Directory name created under the system temp directory.
pub const FIXTURE_DIR_NAME: &str = "caravel-fixtures";

const EMBEDDED: &[(&str, &str)] = &[
    ("inputFile.txt", include_str!("../fixtures/inputFile.txt")),
    ("inputFile2.txt", include_str!("../fixtures/inputFile2.txt")),
    ("pytest.py", include_str!("../fixtures/pytest.py")),
    ("kill_me.sh", include_str!("../fixtures/kill_me.sh")),
    (
        "kill_job_managers.sh",
        include_str!("../fixtures/kill_job_managers.sh"),
    ),
];

/// Errors raised while materialising fixture files.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FixtureError {
    /// Raised when the system temp directory is not valid UTF-8.
    #[error("temp directory is not valid UTF-8: {path}")]
    NonUtf8TempDir {
        /// Lossy rendering of the offending path.
        path: String,
    },
    /// Raised when a requested fixture is not embedded in the crate.
    #[error("unknown fixture: {name}")]
    Unknown {
        /// Requested fixture name.
        name: String,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Writes embedded fixtures into a fixed directory on demand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FixtureStore {
    root: Utf8PathBuf,
}

impl FixtureStore {
    /// Builds a store rooted at `caravel-fixtures` under the system temp
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::NonUtf8TempDir`] when the temp directory path
    /// is not valid UTF-8.
    pub fn in_temp_dir() -> Result<Self, FixtureError> {
        let tmp = Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| {
            FixtureError::NonUtf8TempDir {
                path: path.display().to_string(),
            }
        })?;
        Ok(Self {
            root: tmp.join(FIXTURE_DIR_NAME),
        })
    }

    /// Builds a store rooted at an explicit directory.
    #[must_use]
    pub const fn at(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Returns the directory fixtures are written into.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Ensures `name` exists on disk and returns its path.
    ///
    /// The target directory is created when absent. Concurrent callers may
    /// race on the existence check; the race is benign because every writer
    /// produces identical content.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Unknown`] when `name` is not embedded, or
    /// [`FixtureError::Io`] when the directory or file cannot be written.
    pub fn materialise(&self, name: &str) -> Result<Utf8PathBuf, FixtureError> {
        let (_, content) = EMBEDDED
            .iter()
            .find(|(fixture, _)| *fixture == name)
            .ok_or_else(|| FixtureError::Unknown {
                name: name.to_owned(),
            })?;

        Dir::create_ambient_dir_all(&self.root, ambient_authority())
            .map_err(|err| self.io_error(err))?;
        let dir =
            Dir::open_ambient_dir(&self.root, ambient_authority()).map_err(|err| self.io_error(err))?;

        let present = dir.try_exists(name).map_err(|err| self.io_error(err))?;
        if !present {
            dir.write(name, content).map_err(|err| self.io_error(err))?;
        }

        Ok(self.root.join(name))
    }

    /// Materialises every name in `names`, returning the resulting paths.
    ///
    /// # Errors
    ///
    /// Propagates the first [`FixtureError`] encountered.
    pub fn materialise_all<'a, I>(&self, names: I) -> Result<Vec<Utf8PathBuf>, FixtureError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|name| self.materialise(name)).collect()
    }

    fn io_error(&self, err: std::io::Error) -> FixtureError {
        FixtureError::Io {
            path: self.root.clone(),
            message: err.to_string(),
        }
    }
}
