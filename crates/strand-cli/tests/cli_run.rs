// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Integration tests for the `strand` binary.
//! Each test runs a command and checks stdout and the exit status.

use std::path::PathBuf;
use std::process::Command;

fn strand_binary() -> PathBuf {
    // cargo test builds into target/debug or target/release
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("strand");
    path
}

/// Run `strand` with a clean environment, returning (stdout, stderr, code).
fn strand(args: &[&str]) -> (String, String, i32) {
    let out = Command::new(strand_binary())
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("FORCE_COLOR")
        .env_remove("STRAND_POLICY")
        .env_remove("STRAND_POOL_SIZE")
        .env_remove("STRAND_DEADLINE_MS")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run strand");
    (
        String::from_utf8_lossy(&out.stdout).to_string(),
        String::from_utf8_lossy(&out.stderr).to_string(),
        out.status.code().unwrap_or(-1),
    )
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({}):\n{}", e, stdout))
}

#[test]
fn hello_prints_greeting() {
    let (stdout, _, code) = strand(&["hello"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "Hello from me");
}

#[test]
fn pool_json_reports_completed_group() {
    let (stdout, stderr, code) = strand(&[
        "pool", "--units", "4", "--workers", "2", "--delay-ms", "1", "--json",
    ]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    let summary = json(&stdout);
    assert_eq!(summary["completed"], true);
    assert_eq!(summary["policy"], "pool(2)");
    assert_eq!(summary["units"].as_array().map(Vec::len), Some(4));
    assert!(summary["peak_concurrency"].as_u64().unwrap() <= 2);
}

#[test]
fn unconfined_counts_in_launch_order() {
    let (stdout, _, code) = strand(&["unconfined", "--units", "3"]);
    assert_eq!(code, 0);
    let counters: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(n, _)| n.trim())
        .filter(|n| n.parse::<usize>().is_ok())
        .collect();
    assert_eq!(counters, vec!["0", "1", "2"]);
    assert!(stdout.contains("unconfined OK"));
}

#[test]
fn values_joins_both_results() {
    let (stdout, _, code) = strand(&["values", "--delay-ms", "5"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Returned value and Returned value 2"), "{}", stdout);
}

#[test]
fn compare_covers_every_policy() {
    let (stdout, _, code) = strand(&["compare", "--units", "3", "--delay-ms", "1", "--json"]);
    assert_eq!(code, 0);
    let summaries = json(&stdout);
    let policies: Vec<&str> = summaries
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["policy"].as_str().unwrap())
        .collect();
    assert_eq!(policies.len(), 3);
    assert!(policies[0].starts_with("pool("));
    assert_eq!(&policies[1..], &["unconfined", "threads"]);
}

#[test]
fn deadline_exits_with_group_error() {
    let (_, stderr, code) = strand(&["pool", "--deadline-ms", "1", "--delay-ms", "1000"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error"), "{}", stderr);
}

#[test]
fn deadline_from_config_file() {
    let path = std::env::temp_dir().join(format!("strand_cli_test_{}.json", std::process::id()));
    std::fs::write(&path, r#"{"deadline_ms": 1}"#).unwrap();
    let (_, _, code) = strand(&["pool", "--delay-ms", "1000", "--config", path.to_str().unwrap()]);
    let _ = std::fs::remove_file(&path);
    assert_eq!(code, 1);
}

#[test]
fn zero_workers_is_a_config_error() {
    let (_, stderr, code) = strand(&["pool", "--workers", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error"));
}

#[test]
fn bad_usage_exits_with_two() {
    assert_eq!(strand(&["pool", "--bogus"]).2, 2);
    assert_eq!(strand(&["pool", "--units"]).2, 2);
    assert_eq!(strand(&["frobnicate"]).2, 2);
}
