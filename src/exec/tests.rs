use super::runner;
use crate::error::ViolationCode;
use std::path::Path;
use std::time::{Duration, Instant};

const BUDGET: usize = 64 * 1024;

fn cwd() -> &'static Path {
    Path::new("/tmp")
}

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let out = runner::run("echo", &["hello".into()], cwd(), Duration::from_secs(5), BUDGET)
        .await
        .unwrap();
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout, "hello\n");
    assert_eq!(out.stderr, "");
    assert!(!out.timed_out);
    assert!(!out.output_truncated);
}

#[tokio::test]
async fn nonzero_exit_is_not_an_error() {
    let out = runner::run("false", &[], cwd(), Duration::from_secs(5), BUDGET)
        .await
        .unwrap();
    assert_eq!(out.exit_code, 1);
}

#[tokio::test]
async fn missing_binary_is_a_spawn_fault() {
    let err = runner::run("corral-no-such-binary", &[], cwd(), Duration::from_secs(5), BUDGET)
        .await
        .unwrap_err();
    assert!(!err.is_violation());
}

#[tokio::test]
async fn environment_is_stripped_to_path() {
    // HOME is set in the parent; the child must not see it
    let out = runner::run("printenv", &["HOME".into()], cwd(), Duration::from_secs(5), BUDGET)
        .await
        .unwrap();
    assert_ne!(out.exit_code, 0);
    assert_eq!(out.stdout, "");
}

#[tokio::test]
async fn output_exactly_at_budget_is_accepted() {
    // printf emits exactly 5 bytes, no trailing newline
    let out = runner::run("printf", &["abcde".into()], cwd(), Duration::from_secs(5), 5)
        .await
        .unwrap();
    assert_eq!(out.stdout, "abcde");
    assert!(!out.output_truncated);
}

#[tokio::test]
async fn output_over_budget_is_rejected() {
    let err = runner::run("printf", &["abcdef".into()], cwd(), Duration::from_secs(5), 5)
        .await
        .unwrap_err();
    let violation = err.violation().expect("expected a violation");
    assert_eq!(violation.code, ViolationCode::OutputLimit);
}

#[tokio::test]
async fn stderr_counts_against_the_shared_budget() {
    // ls against a missing path writes the diagnostic to stderr
    let err = runner::run(
        "ls",
        &["/no/such/path/for/corral/tests".into()],
        cwd(),
        Duration::from_secs(5),
        4,
    )
    .await
    .unwrap_err();
    assert_eq!(err.violation().unwrap().code, ViolationCode::OutputLimit);
}

#[tokio::test]
async fn slow_command_times_out_and_is_killed() {
    let start = Instant::now();
    let err = runner::run("sleep", &["5".into()], cwd(), Duration::from_millis(300), BUDGET)
        .await
        .unwrap_err();
    assert_eq!(err.violation().unwrap().code, ViolationCode::Timeout);
    // The child was killed at the deadline, not awaited to completion
    assert!(start.elapsed() < Duration::from_secs(4));
}
