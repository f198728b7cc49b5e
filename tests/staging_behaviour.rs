//! Behavioural coverage for size-verified input staging.

#[path = "common/suite.rs"]
mod suite;

use caravel::StagingError;
use caravel::test_support::ScriptedGrid;
use suite::{REMOTE_PARENT, suite_harness, write_input};
use tempfile::TempDir;

#[tokio::test]
async fn staging_verifies_size_parity_and_reports_the_remote_uri() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let content = "markus was here\nthis test suite is great\n";
    let source = write_input(&tmp, "inputFile.txt", content);

    let staged = harness
        .stage_input(session.as_ref(), source.as_str())
        .await
        .expect("staging should succeed");

    let expected_remote = format!("{REMOTE_PARENT}/inputFile.txt");
    assert_eq!(staged.remote, expected_remote);
    assert_eq!(staged.size, content.len() as u64);
    assert_eq!(
        grid.remote_file_size(&expected_remote),
        Some(content.len() as u64)
    );
}

#[tokio::test]
async fn restaging_deletes_the_previous_remote_copy_first() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let source = write_input(&tmp, "inputFile.txt", "same file twice\n");

    harness
        .stage_input(session.as_ref(), source.as_str())
        .await
        .expect("first staging");
    harness
        .stage_input(session.as_ref(), source.as_str())
        .await
        .expect("second staging");

    let deletes = grid
        .calls()
        .iter()
        .filter(|call| call.starts_with("delete "))
        .count();
    assert_eq!(deletes, 2, "each staging run clears the destination");
}

#[tokio::test]
async fn truncated_transfer_is_reported_as_a_size_mismatch() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let content = "payload that will arrive short\n";
    let source = write_input(&tmp, "inputFile.txt", content);
    grid.set_transfer_deficit(1);

    let err = harness
        .stage_input(session.as_ref(), source.as_str())
        .await
        .expect_err("truncated copy must fail verification");

    let StagingError::SizeMismatch {
        source_size,
        remote_size,
        ..
    } = err
    else {
        panic!("expected size mismatch, got {err}");
    };
    assert_eq!(source_size, content.len() as u64);
    assert_eq!(remote_size, content.len() as u64 - 1);
}

#[tokio::test]
async fn remote_source_uses_third_party_transfer() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let source = "gsiftp://elsewhere.test.nesi.org.nz/data/inputFile.txt";
    grid.set_remote_file(source, 42);

    let staged = harness
        .stage_input(session.as_ref(), source)
        .await
        .expect("third-party staging should succeed");

    assert_eq!(staged.size, 42);
    assert_eq!(staged.remote, format!("{REMOTE_PARENT}/inputFile.txt"));
    assert!(
        grid.calls()
            .iter()
            .any(|call| call.starts_with("copy ") && call.ends_with("third_party=true")),
        "remote-to-remote copies must be third party: {:?}",
        grid.calls()
    );
}

#[tokio::test]
async fn missing_local_source_surfaces_the_transfer_failure() {
    let tmp = TempDir::new().expect("temp dir");
    let grid = ScriptedGrid::new();
    let harness = suite_harness(&tmp, grid.clone(), &["local"]);
    let session = harness.session("local").await.expect("session");
    let missing = suite::utf8(tmp.path().join("nowhere.txt"));

    let err = harness
        .stage_input(session.as_ref(), missing.as_str())
        .await
        .expect_err("missing source must fail");

    assert!(
        matches!(err, StagingError::Transfer(_)),
        "unexpected: {err}"
    );
}
