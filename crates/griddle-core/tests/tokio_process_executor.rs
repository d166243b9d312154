#![cfg(unix)]

use std::time::Duration;

use griddle_core::execution::{
    CommandSpec, ProcessExitStatus, ProcessSpawnRequest, TokioProcessExecutor, spawn_validated,
};
use griddle_core::models::CoreErrorKind;

fn shell(script: &str) -> ProcessSpawnRequest {
    ProcessSpawnRequest::new(
        CoreErrorKind::Compile,
        CommandSpec::new("/bin/sh").args(["-c", script]),
    )
}

#[tokio::test]
async fn reports_success() {
    let status = spawn_validated(&TokioProcessExecutor, shell("exit 0"))
        .expect("spawn should succeed")
        .wait()
        .await
        .expect("wait should succeed");
    assert_eq!(status, ProcessExitStatus::ExitCode(0));
}

#[tokio::test]
async fn captures_nonzero_exit_code() {
    let handle =
        spawn_validated(&TokioProcessExecutor, shell("exit 101")).expect("spawn should succeed");
    let status = handle.wait().await.expect("wait should succeed");

    assert_eq!(status, ProcessExitStatus::ExitCode(101));
}

#[tokio::test]
async fn signalled_children_are_terminated() {
    let status = spawn_validated(&TokioProcessExecutor, shell("kill -9 $$"))
        .expect("spawn should succeed")
        .wait()
        .await
        .expect("wait should succeed");
    assert_eq!(status, ProcessExitStatus::Terminated);
}

#[tokio::test]
async fn env_is_set_for_the_child_only() {
    let mut request = shell(r#"test "$GRIDDLE_TEST_VALUE" = "child-only""#);
    request.command = request.command.env("GRIDDLE_TEST_VALUE", "child-only");

    let status = spawn_validated(&TokioProcessExecutor, request)
        .expect("spawn should succeed")
        .wait()
        .await
        .expect("wait should succeed");

    assert_eq!(status, ProcessExitStatus::ExitCode(0));
    assert!(std::env::var_os("GRIDDLE_TEST_VALUE").is_none());
}

#[tokio::test]
async fn timeout_kills_long_running_process() {
    let request = shell("sleep 30").timeout(Duration::from_millis(100));

    let handle = spawn_validated(&TokioProcessExecutor, request).expect("spawn should succeed");
    let error = handle.wait().await.expect_err("should time out");

    assert_eq!(error.kind, CoreErrorKind::Compile);
    assert!(error.message.contains("timed out"));
}

#[tokio::test]
async fn spawn_nonexistent_program_uses_failure_kind() {
    let request = ProcessSpawnRequest::new(
        CoreErrorKind::Compile,
        CommandSpec::new("/nonexistent/cargo"),
    );

    let error = match spawn_validated(&TokioProcessExecutor, request) {
        Err(error) => error,
        Ok(_) => panic!("expected spawn to fail for nonexistent binary"),
    };

    assert_eq!(error.kind, CoreErrorKind::Compile);
    assert!(error.message.contains("/nonexistent/cargo"));
}

#[test]
fn validation_rejects_bad_commands() {
    let empty_program = ProcessSpawnRequest::new(CoreErrorKind::Compile, CommandSpec::new(""));
    assert!(empty_program.validate().is_err());

    let nul_arg = shell("exit 0");
    let nul_arg = ProcessSpawnRequest {
        command: nul_arg.command.arg("bad\0arg"),
        ..nul_arg
    };
    assert!(nul_arg.validate().is_err());

    let zero_timeout = shell("exit 0").timeout(Duration::ZERO);
    assert_eq!(
        zero_timeout.validate().unwrap_err().kind,
        CoreErrorKind::Compile
    );
}
