//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedGrid`] is an in-memory implementation of the collaborator
//! contract. It validates job descriptors against a configurable package
//! catalog, plays back scripted status sequences, records every remote
//! invocation, and can inject login failures, truncated transfers, and
//! unreachable-agent windows.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8Path;

use crate::grid::{
    Credential, GridFuture, GridService, GridSession, InputFile, JobControl, JobDescriptor,
    JobPropertiesError, JobStatus, LoginError, StatusError, SubmissionError, TransferError,
};

/// Scripted in-memory grid middleware.
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// assertions while the code under test drives sessions and jobs.
#[derive(Clone, Debug, Default)]
pub struct ScriptedGrid {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    catalog: BTreeMap<String, BTreeSet<String>>,
    login_failures: BTreeSet<String>,
    login_attempts: BTreeMap<String, u32>,
    logout_count: u32,
    submission_failures: BTreeSet<String>,
    files: BTreeMap<String, u64>,
    transfer_deficit: u64,
    failing_polls: u32,
    calls: Vec<String>,
    scripts: BTreeMap<String, VecDeque<JobStatus>>,
    jobs: BTreeMap<String, JobState>,
}

#[derive(Debug)]
struct JobState {
    submitted: bool,
    current: JobStatus,
    queue: VecDeque<JobStatus>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ScriptedGrid {
    /// Creates a grid with the default package catalog: `generic` and
    /// `UnixCommands`, each providing a `latest` version.
    #[must_use]
    pub fn new() -> Self {
        let grid = Self::default();
        grid.insert_application("generic", &["latest"]);
        grid.insert_application("UnixCommands", &["latest", "4.2"]);
        grid
    }

    /// Adds `application` with the given `versions` to the package catalog.
    pub fn insert_application(&self, application: &str, versions: &[&str]) {
        let mut inner = self.lock();
        inner.catalog.insert(
            application.to_owned(),
            versions.iter().map(|version| (*version).to_owned()).collect(),
        );
    }

    /// Makes logins to `backend` fail until cleared.
    pub fn fail_login(&self, backend: &str) {
        self.lock().login_failures.insert(backend.to_owned());
    }

    /// Clears an injected login failure.
    pub fn clear_login_failure(&self, backend: &str) {
        self.lock().login_failures.remove(backend);
    }

    /// Makes submission of `job` fail with a scheduler rejection.
    pub fn fail_submission(&self, job: &str) {
        self.lock().submission_failures.insert(job.to_owned());
    }

    /// Number of login attempts recorded for `backend`, including failures.
    #[must_use]
    pub fn login_attempts(&self, backend: &str) -> u32 {
        self.lock().login_attempts.get(backend).copied().unwrap_or(0)
    }

    /// Number of logouts recorded across all sessions.
    #[must_use]
    pub fn logout_count(&self) -> u32 {
        self.lock().logout_count
    }

    /// Seeds a remote file with the given size.
    pub fn set_remote_file(&self, uri: &str, size: u64) {
        self.lock().files.insert(uri.to_owned(), size);
    }

    /// Returns the size of a simulated remote file, when present.
    #[must_use]
    pub fn remote_file_size(&self, uri: &str) -> Option<u64> {
        self.lock().files.get(uri).copied()
    }

    /// Makes every subsequent copy record `bytes` fewer bytes than the
    /// source, simulating a truncated transfer.
    pub fn set_transfer_deficit(&self, bytes: u64) {
        self.lock().transfer_deficit = bytes;
    }

    /// Scripts the status sequence played back for `job` once submitted.
    /// A trailing non-terminal status repeats forever; a trailing terminal
    /// status sticks.
    pub fn script_statuses(&self, job: &str, statuses: &[JobStatus]) {
        self.lock()
            .scripts
            .insert(job.to_owned(), statuses.iter().copied().collect());
    }

    /// Makes the next `count` status or kill calls fail as unreachable,
    /// simulating a job-manager restart window.
    pub fn fail_next_polls(&self, count: u32) {
        self.lock().failing_polls = count;
    }

    /// Overrides the captured output of `job`.
    pub fn set_job_output(&self, job: &str, stdout: &str, stderr: &str) {
        let mut inner = self.lock();
        if let Some(state) = inner.jobs.get_mut(job) {
            state.stdout = stdout.as_bytes().to_vec();
            state.stderr = stderr.as_bytes().to_vec();
        }
    }

    /// Current status of `job` as the remote side sees it.
    #[must_use]
    pub fn job_status(&self, job: &str) -> Option<JobStatus> {
        self.lock().jobs.get(job).map(|state| state.current)
    }

    /// Snapshot of every remote invocation recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Total number of remote invocations recorded so far.
    #[must_use]
    pub fn remote_call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl GridService for ScriptedGrid {
    type Session = ScriptedSession;

    fn login<'a>(
        &'a self,
        _credential: &'a Credential,
        backend: &'a str,
    ) -> GridFuture<'a, Self::Session, LoginError> {
        Box::pin(async move {
            let mut inner = self.lock();
            *inner.login_attempts.entry(backend.to_owned()).or_insert(0) += 1;
            inner.calls.push(format!("login {backend}"));
            if inner.login_failures.contains(backend) {
                return Err(LoginError {
                    backend: backend.to_owned(),
                    message: String::from("scripted login failure"),
                });
            }
            Ok(ScriptedSession {
                backend: backend.to_owned(),
                inner: Arc::clone(&self.inner),
            })
        })
    }
}

/// Authenticated session handle produced by [`ScriptedGrid`].
#[derive(Debug)]
pub struct ScriptedSession {
    backend: String,
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedSession {
    /// Backend this session was logged in against.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn destination_uri(source: &str, dest_parent: &str) -> String {
    let file_name = source
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(source);
    format!("{}/{file_name}", dest_parent.trim_end_matches('/'))
}

fn validate_against_catalog(
    catalog: &BTreeMap<String, BTreeSet<String>>,
    descriptor: &JobDescriptor,
) -> Result<(), JobPropertiesError> {
    let Some(versions) = catalog.get(&descriptor.application) else {
        return Err(JobPropertiesError::UnknownApplication {
            application: descriptor.application.clone(),
        });
    };
    if let Some(version) = &descriptor.version {
        if !versions.contains(version) {
            return Err(JobPropertiesError::UnknownVersion {
                application: descriptor.application.clone(),
                version: version.clone(),
            });
        }
    }
    Ok(())
}

fn default_stdout(command_line: &str) -> Vec<u8> {
    command_line
        .strip_prefix("echo ")
        .map(|rest| format!("{rest}\n").into_bytes())
        .unwrap_or_default()
}

impl GridSession for ScriptedSession {
    type Job = ScriptedJob;

    fn logout(&self) -> GridFuture<'_, (), StatusError> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.logout_count += 1;
            let backend = &self.backend;
            inner.calls.push(format!("logout {backend}"));
            Ok(())
        })
    }

    fn delete_file<'a>(&'a self, uri: &'a str) -> GridFuture<'a, (), TransferError> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(format!("delete {uri}"));
            inner.files.remove(uri);
            Ok(())
        })
    }

    fn copy_file<'a>(
        &'a self,
        source: &'a str,
        dest_parent: &'a str,
        third_party: bool,
    ) -> GridFuture<'a, (), TransferError> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("copy {source} -> {dest_parent} third_party={third_party}"));

            let source_size = if source.contains("://") {
                inner
                    .files
                    .get(source)
                    .copied()
                    .ok_or_else(|| TransferError::NotFound {
                        uri: source.to_owned(),
                    })?
            } else {
                std::fs::metadata(Utf8Path::new(source).as_std_path())
                    .map_err(|err| TransferError::Copy {
                        source: source.to_owned(),
                        dest: dest_parent.to_owned(),
                        message: err.to_string(),
                    })?
                    .len()
            };

            let recorded = source_size.saturating_sub(inner.transfer_deficit);
            let destination = destination_uri(source, dest_parent);
            inner.files.insert(destination, recorded);
            Ok(())
        })
    }

    fn file_size<'a>(&'a self, uri: &'a str) -> GridFuture<'a, u64, TransferError> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(format!("file_size {uri}"));
            inner
                .files
                .get(uri)
                .copied()
                .ok_or_else(|| TransferError::NotFound {
                    uri: uri.to_owned(),
                })
        })
    }

    fn create_job<'a>(
        &'a self,
        descriptor: &'a JobDescriptor,
        fqan: &'a str,
    ) -> GridFuture<'a, Self::Job, JobPropertiesError> {
        Box::pin(async move {
            let mut inner = self.lock();
            // Catalog validation is client-side: a rejected descriptor
            // records no remote invocation.
            validate_against_catalog(&inner.catalog, descriptor)?;

            let name = descriptor.name.clone();
            inner.calls.push(format!("create_job {name} fqan={fqan}"));
            let queue = inner.scripts.remove(&name).unwrap_or_default();
            inner.jobs.insert(
                name.clone(),
                JobState {
                    submitted: false,
                    current: JobStatus::Created,
                    queue,
                    stdout: default_stdout(&descriptor.command_line),
                    stderr: Vec::new(),
                },
            );
            drop(inner);

            Ok(ScriptedJob {
                name,
                inner: Arc::clone(&self.inner),
            })
        })
    }
}

/// Remote job handle produced by [`ScriptedSession::create_job`].
#[derive(Debug)]
pub struct ScriptedJob {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedJob {
    /// Name of the job as registered with the grid.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn unreachable_window(inner: &mut Inner, name: &str, call: &str) -> Option<StatusError> {
        if inner.failing_polls > 0 {
            inner.failing_polls -= 1;
            inner.calls.push(format!("{call} {name} (unreachable)"));
            return Some(StatusError::Unreachable {
                message: String::from("job manager restarting"),
            });
        }
        None
    }
}

impl JobControl for ScriptedJob {
    fn submit(&self, auto_queue: bool) -> GridFuture<'_, (), SubmissionError> {
        Box::pin(async move {
            let mut inner = self.lock();
            let name = self.name.clone();
            inner.calls.push(format!("submit {name} auto_queue={auto_queue}"));
            if inner.submission_failures.contains(&name) {
                return Err(SubmissionError {
                    job: name,
                    message: String::from("scripted submission rejection"),
                });
            }
            if let Some(state) = inner.jobs.get_mut(&name) {
                state.submitted = true;
                state.current = JobStatus::Submitted;
                if state.queue.is_empty() {
                    state.queue = VecDeque::from([JobStatus::Active, JobStatus::Done]);
                }
            }
            Ok(())
        })
    }

    fn status(&self) -> GridFuture<'_, JobStatus, StatusError> {
        Box::pin(async move {
            let mut inner = self.lock();
            if let Some(err) = Self::unreachable_window(&mut inner, &self.name, "status") {
                return Err(err);
            }
            let name = self.name.clone();
            inner.calls.push(format!("status {name}"));
            let Some(state) = inner.jobs.get_mut(&name) else {
                return Ok(JobStatus::Unknown);
            };
            if !state.submitted {
                return Ok(JobStatus::Created);
            }
            if let Some(next) = state.queue.pop_front() {
                state.current = next;
                if state.queue.is_empty() && !next.is_terminal() {
                    // A trailing non-terminal status repeats forever.
                    state.queue.push_back(next);
                }
            }
            Ok(state.current)
        })
    }

    fn kill(&self, wait: bool) -> GridFuture<'_, (), StatusError> {
        Box::pin(async move {
            let mut inner = self.lock();
            if let Some(err) = Self::unreachable_window(&mut inner, &self.name, "kill") {
                return Err(err);
            }
            let name = self.name.clone();
            inner.calls.push(format!("kill {name} wait={wait}"));
            if let Some(state) = inner.jobs.get_mut(&name) {
                if !state.current.is_terminal() {
                    state.current = JobStatus::Killed;
                    state.queue.clear();
                }
            }
            Ok(())
        })
    }

    fn stdout(&self) -> GridFuture<'_, Vec<u8>, StatusError> {
        Box::pin(async move {
            let mut inner = self.lock();
            let name = self.name.clone();
            inner.calls.push(format!("stdout {name}"));
            Ok(inner
                .jobs
                .get(&name)
                .map(|state| state.stdout.clone())
                .unwrap_or_default())
        })
    }

    fn stderr(&self) -> GridFuture<'_, Vec<u8>, StatusError> {
        Box::pin(async move {
            let mut inner = self.lock();
            let name = self.name.clone();
            inner.calls.push(format!("stderr {name}"));
            Ok(inner
                .jobs
                .get(&name)
                .map(|state| state.stderr.clone())
                .unwrap_or_default())
        })
    }
}

/// Builds a descriptor for the given command under the `generic`
/// application, the shape most scenarios use.
///
/// # Panics
///
/// Panics when `name` or `command_line` is blank; callers pass literals.
#[must_use]
pub fn generic_descriptor(name: &str, command_line: &str) -> JobDescriptor {
    match JobDescriptor::builder()
        .name(name)
        .command_line(command_line)
        .application("generic")
        .build()
    {
        Ok(descriptor) => descriptor,
        Err(err) => panic!("generic descriptor should build: {err}"),
    }
}

/// Builds an upload input reference from a path, for assertions.
#[must_use]
pub fn upload(path: &str) -> InputFile {
    InputFile::Upload(path.into())
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: tokio::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets one environment variable while holding the global mutex.
    pub async fn set_var(key: &str, value: &str) -> Self {
        Self::set_vars(&[(key, value)]).await
    }

    /// Sets multiple environment variables while holding the global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = std::env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`,
            // preventing races.
            unsafe { std::env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => std::env::set_var(key, val),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
