//! End-to-end coverage of the job lifecycle: create, submit, poll,
//! terminal state, and kill.

#[path = "common/suite.rs"]
mod suite;

use std::time::Duration;

use caravel::test_support::ScriptedGrid;
use caravel::{DriverError, JobPropertiesError, JobStatus, PollPolicy};
use suite::{suite_harness, write_input};
use tempfile::TempDir;

fn fast_policy(max_checks: u32) -> PollPolicy {
    PollPolicy::new(Duration::from_millis(2), max_checks)
}

#[tokio::test]
async fn echo_job_runs_to_done_and_captures_stdout() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("echo HELLO WORLD")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(10));
    driver.submit(true).await.expect("submit");
    let status = driver.wait_for_finish().await.expect("job should finish");

    assert_eq!(status, JobStatus::Done);
    assert_eq!(
        driver.stdout_text().await.expect("stdout").trim(),
        "HELLO WORLD"
    );
    assert!(driver.stderr_text().await.expect("stderr").is_empty());
}

#[tokio::test]
async fn unknown_application_fails_without_reaching_the_scheduler() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("echo hello")
        .application("NoSuchPackage")
        .build()
        .expect("descriptor");
    let calls_before = grid.remote_call_count();

    let err = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect_err("unknown application must be rejected");

    assert_eq!(
        err,
        JobPropertiesError::UnknownApplication {
            application: String::from("NoSuchPackage"),
        }
    );
    assert_eq!(
        grid.remote_call_count(),
        calls_before,
        "rejection happens before any scheduler traffic"
    );
}

#[tokio::test]
async fn unknown_version_of_a_known_application_is_rejected() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("whoami")
        .application("UnixCommands")
        .version("Invalid")
        .build()
        .expect("descriptor");

    let err = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect_err("unknown version must be rejected");

    assert_eq!(
        err,
        JobPropertiesError::UnknownVersion {
            application: String::from("UnixCommands"),
            version: String::from("Invalid"),
        }
    );
}

#[tokio::test]
async fn a_handle_cannot_be_submitted_twice() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("echo once")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(10));
    driver.submit(true).await.expect("first submit");
    let err = driver.submit(true).await.expect_err("second submit");

    assert_eq!(
        err,
        DriverError::AlreadySubmitted {
            job: driver.name().to_owned(),
        }
    );
}

#[tokio::test]
async fn scheduler_rejection_surfaces_as_a_submission_error() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("echo rejected")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job");
    grid.fail_submission(driver.name());

    let err = driver.submit(true).await.expect_err("scripted rejection");
    assert!(matches!(err, DriverError::Submission(_)), "unexpected: {err}");
}

#[tokio::test]
async fn wait_for_finish_stops_after_the_iteration_budget() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("sleep forever")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(3));
    grid.script_statuses(driver.name(), &[JobStatus::Active]);
    driver.submit(true).await.expect("submit");

    let err = driver.wait_for_finish().await.expect_err("must time out");

    assert_eq!(
        err,
        DriverError::Timeout {
            job: driver.name().to_owned(),
            checks: 3,
        }
    );
    let polls = grid
        .calls()
        .iter()
        .filter(|call| call.starts_with("status "))
        .count();
    assert_eq!(polls, 3, "the budget bounds the number of samples");
    // The job stays in place for post-mortem inspection.
    assert_eq!(grid.job_status(driver.name()), Some(JobStatus::Active));
}

#[tokio::test]
async fn wait_for_state_samples_once_and_reports_what_it_saw() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("echo sampled")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(10));
    grid.script_statuses(driver.name(), &[JobStatus::Active, JobStatus::Done]);
    driver.submit(true).await.expect("submit");

    // One settle-then-sample per call, even when the target is not reached.
    let first = driver.wait_for_state(JobStatus::Done).await.expect("sample");
    assert_eq!(first, JobStatus::Active);
    let second = driver.wait_for_state(JobStatus::Done).await.expect("sample");
    assert_eq!(second, JobStatus::Done);
}

#[tokio::test]
async fn kill_commits_the_job_to_a_terminal_state() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("sleep forever")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(10));
    grid.script_statuses(driver.name(), &[JobStatus::Active]);
    driver.submit(true).await.expect("submit");
    assert_eq!(driver.poll().await.expect("poll"), JobStatus::Active);

    let status = driver.kill(true).await.expect("kill");

    assert_eq!(status, JobStatus::Killed);
    // Later polls keep reporting the committed terminal state.
    assert_eq!(driver.poll().await.expect("poll"), JobStatus::Killed);
    assert_eq!(grid.job_status(driver.name()), Some(JobStatus::Killed));
}

#[tokio::test]
async fn killing_a_finished_job_is_a_no_op() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("echo done already")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(10));
    driver.submit(true).await.expect("submit");
    assert_eq!(
        driver.wait_for_finish().await.expect("finish"),
        JobStatus::Done
    );

    let status = driver.kill(true).await.expect("kill after finish");

    assert_eq!(status, JobStatus::Done);
    assert!(
        !grid.calls().iter().any(|call| call.starts_with("kill ")),
        "no kill is sent for a terminal job: {:?}",
        grid.calls()
    );
}

#[tokio::test]
async fn waits_ride_out_an_unreachable_job_manager() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("echo resilient")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(6));
    grid.script_statuses(driver.name(), &[JobStatus::Active, JobStatus::Done]);
    driver.submit(true).await.expect("submit");
    grid.fail_next_polls(2);

    let status = driver.wait_for_finish().await.expect("recovers after restart");

    assert_eq!(status, JobStatus::Done);
}

#[tokio::test]
async fn kill_delivery_is_retried_while_the_agent_restarts() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let descriptor = harness
        .descriptor()
        .command_line("sleep forever")
        .application("generic")
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(6));
    grid.script_statuses(driver.name(), &[JobStatus::Active]);
    driver.submit(true).await.expect("submit");
    assert_eq!(driver.poll().await.expect("poll"), JobStatus::Active);
    grid.fail_next_polls(2);

    let status = driver.kill(true).await.expect("kill should retry through");

    assert_eq!(status, JobStatus::Killed);
}

#[tokio::test]
async fn staged_input_feeds_a_cat_job() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let content = "markus was here\nthis test suite is great\n";
    let source = write_input(&tmp, "inputFile.txt", content);

    let staged = harness
        .stage_input(session.as_ref(), source.as_str())
        .await
        .expect("staging");
    let descriptor = harness
        .descriptor()
        .command_line("cat inputFile.txt")
        .application("generic")
        .remote_input(staged.remote.clone())
        .build()
        .expect("descriptor");

    let mut driver = harness
        .job(session.as_ref(), &descriptor)
        .await
        .expect("create job")
        .with_policy(fast_policy(10));
    grid.set_job_output(driver.name(), content, "");
    driver.submit(true).await.expect("submit");

    assert_eq!(
        driver.wait_for_finish().await.expect("finish"),
        JobStatus::Done
    );
    assert_eq!(driver.stdout_text().await.expect("stdout"), content);
}
