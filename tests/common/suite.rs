//! Shared suite wiring for behavioural tests.

use camino::Utf8PathBuf;
use caravel::test_support::ScriptedGrid;
use caravel::{Harness, HarnessConfig};
use tempfile::TempDir;

pub const REMOTE_PARENT: &str = "gsiftp://globus.test.nesi.org.nz/home/test1";

pub fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap_or_else(|path| {
        panic!("temp path should be valid UTF-8: {}", path.display())
    })
}

/// Writes a minimal credential source file and returns its path.
pub fn write_credential(tmp: &TempDir) -> Utf8PathBuf {
    let path = utf8(tmp.path().join("cred.json"));
    std::fs::write(
        &path,
        r#"{"principal":"test1","passphrase":"test123","fqan":"/test/nesi","myproxy_server":null}"#,
    )
    .unwrap_or_else(|err| panic!("write credential source: {err}"));
    path
}

/// Builds a suite configuration rooted in `tmp` with explicit backends.
pub fn suite_config(tmp: &TempDir, backends: &[&str]) -> HarnessConfig {
    HarnessConfig {
        backends: backends.iter().map(|name| (*name).to_owned()).collect(),
        credential_source: write_credential(tmp).into_string(),
        fqan: String::from("/test/nesi"),
        jobname: String::from("testjob"),
        content: String::from("HELLO WORLD"),
        input_file_name: String::from("inputFile.txt"),
        input_file_name2: String::from("inputFile2.txt"),
        remote_parent: REMOTE_PARENT.to_owned(),
        myproxy_server: None,
        submission_location: None,
    }
}

/// Builds a harness over a scripted grid.
pub fn suite_harness(tmp: &TempDir, grid: ScriptedGrid, backends: &[&str]) -> Harness<ScriptedGrid> {
    Harness::new(suite_config(tmp, backends), grid)
        .unwrap_or_else(|err| panic!("harness should build: {err}"))
}

/// Writes a local input file and returns its path.
pub fn write_input(tmp: &TempDir, name: &str, content: &str) -> Utf8PathBuf {
    let path = utf8(tmp.path().join(name));
    std::fs::write(&path, content).unwrap_or_else(|err| panic!("write input file: {err}"));
    path
}
