use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use crate::execution::{
    ProcessExecutor, ProcessExitStatus, ProcessSpawnRequest, ProcessWaitFuture, RunningProcess,
};
use crate::models::{CoreError, CoreErrorKind, CoreResult};

/// Spawns children on the tokio runtime with stdout and stderr inherited from this process.
pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn spawn(&self, request: ProcessSpawnRequest) -> CoreResult<Box<dyn RunningProcess>> {
        let mut cmd = tokio::process::Command::new(&request.command.program);
        cmd.args(&request.command.args);

        for (key, value) in &request.command.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|error| {
            CoreError::new(
                request.failure_kind,
                format!(
                    "failed to spawn {}: {error}",
                    request.command.program.display()
                ),
            )
        })?;

        tracing::debug!(
            program = %request.command.program.display(),
            pid = ?child.id(),
            "spawned child process"
        );

        Ok(Box::new(TokioRunningProcess {
            child: Mutex::new(Some(child)),
            timeout: request.timeout,
            failure_kind: request.failure_kind,
        }))
    }
}

struct TokioRunningProcess {
    child: Mutex<Option<tokio::process::Child>>,
    timeout: Option<Duration>,
    failure_kind: CoreErrorKind,
}

impl RunningProcess for TokioRunningProcess {
    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        let child = self.child.into_inner().ok().flatten();
        let timeout = self.timeout;
        let failure_kind = self.failure_kind;

        Box::pin(async move {
            let mut child = child.ok_or_else(|| {
                CoreError::new(failure_kind, "child process already consumed")
            })?;

            let wait_err = |error: std::io::Error| {
                CoreError::new(failure_kind, format!("failed to wait for process: {error}"))
            };

            let status = if let Some(timeout_duration) = timeout {
                match tokio::time::timeout(timeout_duration, child.wait()).await {
                    Ok(result) => result.map_err(wait_err)?,
                    Err(_) => {
                        let _ = child.kill().await;
                        return Err(CoreError::new(
                            failure_kind,
                            format!(
                                "process timed out after {}ms",
                                timeout_duration.as_millis()
                            ),
                        ));
                    }
                }
            } else {
                child.wait().await.map_err(wait_err)?
            };

            Ok(match status.code() {
                Some(code) => ProcessExitStatus::ExitCode(code),
                None => ProcessExitStatus::Terminated,
            })
        })
    }
}
