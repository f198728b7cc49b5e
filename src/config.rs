//! Suite configuration loading via `ortho-config`.
//!
//! [`HarnessConfig`] names the backends under test, the credential source,
//! and the staging defaults. Values merge defaults, configuration files,
//! and environment variables; configuration problems abort the run before
//! any backend is touched.

use std::collections::BTreeSet;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default authorisation scope asserted at job creation.
pub const DEFAULT_FQAN: &str = "/test/nesi";

/// Default remote staging parent for input files.
pub const DEFAULT_REMOTE_PARENT: &str = "gsiftp://globus.test.nesi.org.nz/home/test1";

/// Suite configuration derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CARAVEL",
    discovery(
        app_name = "caravel",
        env_var = "CARAVEL_CONFIG_PATH",
        config_file_name = "caravel.toml",
        dotfile_name = ".caravel.toml",
        project_file_name = "caravel.toml"
    )
)]
pub struct HarnessConfig {
    /// Backend names exercised by the suite. Fixed at configuration time;
    /// the session cache refuses names outside this set.
    #[ortho_config(default = vec!["local".to_owned(), "testbed".to_owned()])]
    pub backends: Vec<String>,
    /// Path to the credential source file. Required; there is no usable
    /// default because the credential is environment specific.
    pub credential_source: String,
    /// Virtual-organisation role asserted when creating jobs.
    #[ortho_config(default = DEFAULT_FQAN.to_owned())]
    pub fqan: String,
    /// Base job name; scenario job names derive from it.
    #[ortho_config(default = "testjob".to_owned())]
    pub jobname: String,
    /// Marker content echoed by the smoke-test job.
    #[ortho_config(default = "HELLO WORLD".to_owned())]
    pub content: String,
    /// Primary input fixture file name.
    #[ortho_config(default = "inputFile.txt".to_owned())]
    pub input_file_name: String,
    /// Secondary input fixture file name.
    #[ortho_config(default = "inputFile2.txt".to_owned())]
    pub input_file_name2: String,
    /// Remote parent URI input files are staged under.
    #[ortho_config(default = DEFAULT_REMOTE_PARENT.to_owned())]
    pub remote_parent: String,
    /// Credential store host override, forwarded to the credential source
    /// environment when set.
    pub myproxy_server: Option<String>,
    /// Submission location hint for scenarios that need a queue with a
    /// short wall-time limit.
    pub submission_location: Option<String>,
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing {field}: set CARAVEL_{env_suffix} or add {field} to caravel.toml", env_suffix = field.to_uppercase())]
    MissingField {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl HarnessConfig {
    /// Loads configuration using defaults, configuration files, and
    /// environment variables, without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("caravel")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// or the backend set is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(&self.credential_source, "credential_source")?;
        Self::require_field(&self.fqan, "fqan")?;
        Self::require_field(&self.jobname, "jobname")?;
        Self::require_field(&self.input_file_name, "input_file_name")?;
        Self::require_field(&self.remote_parent, "remote_parent")?;
        if self.backends.iter().all(|name| name.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                field: "backends".to_owned(),
            });
        }
        Ok(())
    }

    /// Returns the configured backend names as a deterministic sorted set.
    #[must_use]
    pub fn backend_set(&self) -> BTreeSet<String> {
        self.backends
            .iter()
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Returns the staged remote URI of the primary input file.
    #[must_use]
    pub fn remote_input_uri(&self) -> String {
        crate::staging::remote_uri(&self.remote_parent, &self.input_file_name)
    }

    fn require_field(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
