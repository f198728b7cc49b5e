//! Data model shared across the collaborator contract.

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8PathBuf;
use serde::Deserialize;

use super::error::JobPropertiesError;

/// Proof of identity shared by every backend login.
///
/// Loaded at most once per suite and passed around by reference; the
/// middleware binds it to each session during login.
#[derive(Clone, Deserialize, Eq, PartialEq)]
pub struct Credential {
    /// Principal (user) the credential asserts.
    pub principal: String,
    /// Secret used to retrieve the proxy from the credential store.
    pub passphrase: String,
    /// Virtual-organisation role attribute asserted alongside the identity.
    pub fqan: Option<String>,
    /// Credential store host override, when not using the environment
    /// default.
    pub myproxy_server: Option<String>,
    /// Fixture files the credential source expects on disk, extracted on
    /// first load.
    #[serde(default)]
    pub fixtures: Vec<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("principal", &self.principal)
            .field("passphrase", &"<redacted>")
            .field("fqan", &self.fqan)
            .field("myproxy_server", &self.myproxy_server)
            .field("fixtures", &self.fixtures)
            .finish()
    }
}

/// Remote job status as reported by a poll.
///
/// Statuses are never cached beyond the poll that produced them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// Job exists client-side and on the service but has not been submitted.
    Created,
    /// Job handed to the remote scheduler, not yet running.
    Submitted,
    /// Job running on the backend.
    Active,
    /// Job finished successfully.
    Done,
    /// Job terminated by an explicit kill.
    Killed,
    /// Job failed on the remote side.
    Failed,
    /// The remote system could not report a status.
    Unknown,
}

impl JobStatus {
    /// Returns `true` for states from which no further transition occurs
    /// without resubmission.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Killed | Self::Failed)
    }

    /// Stable lower-case name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Active => "active",
            Self::Done => "done",
            Self::Killed => "killed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input file reference attached to a job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputFile {
    /// Local file uploaded alongside the submission.
    Upload(Utf8PathBuf),
    /// Already-remote file referenced by URI; the backend fetches it itself.
    Remote(String),
}

/// User-supplied job definition.
///
/// Built once via [`JobDescriptorBuilder`] and immutable afterwards; the
/// middleware snapshots it when the job is created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobDescriptor {
    /// Job name, unique per suite run.
    pub name: String,
    /// Command line executed on the backend.
    pub command_line: String,
    /// Application package the command belongs to (for example `generic`).
    pub application: String,
    /// Specific package version, when the default is not acceptable.
    pub version: Option<String>,
    /// Input files staged for the job.
    pub input_files: Vec<InputFile>,
    /// Environment variables set for the remote process.
    pub environment: BTreeMap<String, String>,
}

impl JobDescriptor {
    /// Starts a builder for a [`JobDescriptor`].
    #[must_use]
    pub fn builder() -> JobDescriptorBuilder {
        JobDescriptorBuilder::new()
    }

    /// Checks that the required fields are populated.
    ///
    /// # Errors
    ///
    /// Returns [`JobPropertiesError::MissingField`] when the name, command
    /// line, or application is empty.
    pub fn validate(&self) -> Result<(), JobPropertiesError> {
        if self.name.is_empty() {
            return Err(JobPropertiesError::MissingField("name".to_owned()));
        }
        if self.command_line.is_empty() {
            return Err(JobPropertiesError::MissingField("command_line".to_owned()));
        }
        if self.application.is_empty() {
            return Err(JobPropertiesError::MissingField("application".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`JobDescriptor`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobDescriptorBuilder {
    name: String,
    command_line: String,
    application: String,
    version: Option<String>,
    input_files: Vec<InputFile>,
    environment: BTreeMap<String, String>,
}

impl JobDescriptorBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the job name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the command line.
    #[must_use]
    pub fn command_line(mut self, value: impl Into<String>) -> Self {
        self.command_line = value.into();
        self
    }

    /// Sets the application package.
    #[must_use]
    pub fn application(mut self, value: impl Into<String>) -> Self {
        self.application = value.into();
        self
    }

    /// Sets the application version.
    #[must_use]
    pub fn version(mut self, value: impl Into<String>) -> Self {
        self.version = Some(value.into());
        self
    }

    /// Attaches a local file uploaded with the submission.
    #[must_use]
    pub fn upload(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.input_files.push(InputFile::Upload(path.into()));
        self
    }

    /// Attaches an already-remote input file by URI.
    #[must_use]
    pub fn remote_input(mut self, uri: impl Into<String>) -> Self {
        self.input_files.push(InputFile::Remote(uri.into()));
        self
    }

    /// Sets an environment variable for the remote process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Builds and validates the [`JobDescriptor`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`JobPropertiesError::MissingField`] when a required field is
    /// empty.
    pub fn build(self) -> Result<JobDescriptor, JobPropertiesError> {
        let descriptor = JobDescriptor {
            name: self.name.trim().to_owned(),
            command_line: self.command_line.trim().to_owned(),
            application: self.application.trim().to_owned(),
            version: self.version.map(|value| value.trim().to_owned()),
            input_files: self.input_files,
            environment: self.environment,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
