//! Job lifecycle driver: create → submit → poll → terminal state or kill.
//!
//! The driver wraps an opaque remote job handle and owns the polling
//! discipline on top of it. Timeouts are expressed as a bounded number of
//! poll iterations, not wall-clock deadlines: the effective timeout of a
//! wait is `interval * max_checks` of the injected [`PollPolicy`].

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::grid::{
    GridSession, JobControl, JobDescriptor, JobPropertiesError, JobStatus, StatusError,
    SubmissionError,
};

/// Default pause between status samples.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Default iteration budget for waits.
pub const DEFAULT_MAX_CHECKS: u32 = 25;

/// Polling cadence and iteration budget injected into a [`JobDriver`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Pause between consecutive status samples.
    pub interval: Duration,
    /// Maximum number of samples before a wait gives up.
    pub max_checks: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_checks: DEFAULT_MAX_CHECKS,
        }
    }
}

impl PollPolicy {
    /// Creates a policy with an explicit interval and budget.
    #[must_use]
    pub const fn new(interval: Duration, max_checks: u32) -> Self {
        Self {
            interval,
            max_checks,
        }
    }

    /// Overrides the sample interval.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the iteration budget.
    #[must_use]
    pub const fn with_max_checks(mut self, max_checks: u32) -> Self {
        self.max_checks = max_checks;
        self
    }

    /// Returns the effective wall-clock bound of a wait under this policy.
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        self.interval * self.max_checks
    }
}

/// Errors raised while driving a job through its lifecycle.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DriverError {
    /// Raised when a handle that already submitted is submitted again.
    /// Handles only move forward; resubmission needs a new job.
    #[error("job '{job}' was already submitted")]
    AlreadySubmitted {
        /// Name of the job.
        job: String,
    },
    /// Raised when the remote scheduler rejects the submission.
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    /// Raised when the iteration budget is exhausted before a terminal
    /// state. The job is left in place for post-mortem, not force-killed.
    #[error("job '{job}' did not reach a terminal state within {checks} status checks")]
    Timeout {
        /// Name of the job.
        job: String,
        /// Number of status checks performed.
        checks: u32,
    },
    /// Raised when the kill request itself could not be delivered within
    /// the iteration budget.
    #[error("kill of job '{job}' could not be delivered within {checks} attempts")]
    KillTimeout {
        /// Name of the job.
        job: String,
        /// Number of delivery attempts made.
        checks: u32,
    },
}

/// Drives one remote job handle through its lifecycle.
///
/// The driver composes over any [`JobControl`] implementation; it holds the
/// last observed status purely as a local echo — every decision is made on
/// a fresh poll of the remote system.
#[derive(Debug)]
pub struct JobDriver<J: JobControl> {
    job: J,
    name: String,
    policy: PollPolicy,
    submitted: bool,
    last_status: JobStatus,
}

impl<J: JobControl> JobDriver<J> {
    /// Creates the remote job from `descriptor` and wraps its handle.
    ///
    /// Application and version validation happens client-side inside the
    /// collaborator; an unknown application or version fails here without
    /// reaching the remote scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`JobPropertiesError`] when the descriptor is invalid for
    /// the backend's package catalog.
    pub async fn create<S>(
        session: &S,
        descriptor: &JobDescriptor,
        fqan: &str,
    ) -> Result<Self, JobPropertiesError>
    where
        S: GridSession<Job = J>,
    {
        descriptor.validate()?;
        let job = session.create_job(descriptor, fqan).await?;
        Ok(Self::attach(job, descriptor.name.clone()))
    }

    /// Wraps an existing job handle.
    #[must_use]
    pub fn attach(job: J, name: String) -> Self {
        Self {
            job,
            name,
            policy: PollPolicy::default(),
            submitted: false,
            last_status: JobStatus::Created,
        }
    }

    /// Overrides the polling policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the polling policy in effect.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Returns the status seen by the most recent poll. Diagnostic only;
    /// always stale relative to the remote system.
    #[must_use]
    pub const fn last_status(&self) -> JobStatus {
        self.last_status
    }

    /// Submits the job to the remote scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AlreadySubmitted`] when called twice on the
    /// same handle, or [`DriverError::Submission`] on remote rejection.
    pub async fn submit(&mut self, auto_queue: bool) -> Result<(), DriverError> {
        if self.submitted {
            return Err(DriverError::AlreadySubmitted {
                job: self.name.clone(),
            });
        }
        self.job.submit(auto_queue).await?;
        self.submitted = true;
        self.last_status = JobStatus::Submitted;
        debug!(job = %self.name, "submitted");
        Ok(())
    }

    /// Fetches the current remote status.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the execution agent is unreachable.
    /// Transient failures are the caller's to retry; the budgeted waits
    /// below retry internally.
    pub async fn poll(&mut self) -> Result<JobStatus, StatusError> {
        let status = self.job.status().await?;
        self.last_status = status;
        Ok(status)
    }

    /// Sleeps one poll interval, samples the status once, and returns the
    /// observed state whether or not `target` was reached.
    ///
    /// This is a single-shot settle-then-sample, not a loop: callers that
    /// need guaranteed convergence call it repeatedly or use
    /// [`JobDriver::wait_for_finish`].
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the single sample fails.
    pub async fn wait_for_state(&mut self, target: JobStatus) -> Result<JobStatus, StatusError> {
        sleep(self.policy.interval).await;
        let observed = self.poll().await?;
        debug!(
            job = %self.name,
            %observed,
            %target,
            reached = observed == target,
            "settled and sampled"
        );
        Ok(observed)
    }

    /// Polls until a terminal state is observed or the iteration budget is
    /// exhausted, sleeping one interval between samples.
    ///
    /// A failed poll (agent unreachable, for example while its job manager
    /// restarts) is retried and charged against the budget like any other
    /// iteration. On budget exhaustion the job is left running for
    /// inspection.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] after exactly
    /// [`PollPolicy::max_checks`] status checks without a terminal state.
    pub async fn wait_for_finish(&mut self) -> Result<JobStatus, DriverError> {
        for check in 0..self.policy.max_checks {
            match self.job.status().await {
                Ok(status) => {
                    self.last_status = status;
                    if status.is_terminal() {
                        debug!(job = %self.name, %status, check, "job finished");
                        return Ok(status);
                    }
                    debug!(job = %self.name, %status, check, "job still running");
                }
                Err(err) => {
                    warn!(job = %self.name, %err, check, "status check failed, retrying");
                }
            }
            sleep(self.policy.interval).await;
        }

        Err(DriverError::Timeout {
            job: self.name.clone(),
            checks: self.policy.max_checks,
        })
    }

    /// Requests termination and returns the final observed status.
    ///
    /// Killing a job already seen in a terminal state is a no-op. Delivery
    /// of the kill is retried while the execution agent is unreachable.
    /// After delivery the driver polls to a terminal state and reports
    /// whatever the remote system committed to — a job that finished
    /// concurrently with the kill reports `Done`, not `Killed`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::KillTimeout`] when delivery keeps failing, or
    /// [`DriverError::Timeout`] when no terminal state is observed after
    /// delivery.
    pub async fn kill(&mut self, wait: bool) -> Result<JobStatus, DriverError> {
        if self.last_status.is_terminal() {
            return Ok(self.last_status);
        }

        for check in 0..self.policy.max_checks {
            match self.job.kill(wait).await {
                Ok(()) => {
                    debug!(job = %self.name, "kill delivered");
                    return self.wait_for_finish().await;
                }
                Err(err) => {
                    warn!(job = %self.name, %err, check, "kill failed, retrying");
                    sleep(self.policy.interval).await;
                }
            }
        }

        Err(DriverError::KillTimeout {
            job: self.name.clone(),
            checks: self.policy.max_checks,
        })
    }

    /// Returns the job's captured standard output as text.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the output cannot be fetched.
    pub async fn stdout_text(&self) -> Result<String, StatusError> {
        let bytes = self.job.stdout().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns the job's captured standard error as text.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the output cannot be fetched.
    pub async fn stderr_text(&self) -> Result<String, StatusError> {
        let bytes = self.job.stderr().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
