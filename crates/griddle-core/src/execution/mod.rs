pub mod tokio_process;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

pub use tokio_process::TokioProcessExecutor;

use crate::models::{CoreError, CoreErrorKind, CoreResult};

pub type ProcessWaitFuture = Pin<Box<dyn Future<Output = CoreResult<ProcessExitStatus>> + Send>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets `key` for the child only; the parent environment is never touched.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self, kind: CoreErrorKind) -> CoreResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(CoreError::new(kind, "command program path must not be empty"));
        }

        if self
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(CoreError::new(
                kind,
                "command args must be non-empty and must not contain NUL bytes",
            ));
        }

        if self.env.iter().any(|(key, value)| {
            key.is_empty() || key.contains('=') || key.contains('\0') || value.contains('\0')
        }) {
            return Err(CoreError::new(
                kind,
                "environment keys must be non-empty without '=' and no entry may contain NUL bytes",
            ));
        }

        Ok(())
    }
}

/// A child process to run with the caller's stdout and stderr.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessSpawnRequest {
    pub command: CommandSpec,
    /// Kind attached to every error raised while spawning or waiting.
    pub failure_kind: CoreErrorKind,
    pub timeout: Option<Duration>,
}

impl ProcessSpawnRequest {
    pub fn new(failure_kind: CoreErrorKind, command: CommandSpec) -> Self {
        Self {
            command,
            failure_kind,
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.command.validate(self.failure_kind)?;

        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(CoreError::new(
                self.failure_kind,
                "timeout must be greater than zero when provided",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessExitStatus {
    ExitCode(i32),
    Terminated,
}

pub trait RunningProcess: Send + Sync {
    fn wait(self: Box<Self>) -> ProcessWaitFuture;
}

pub trait ProcessExecutor: Send + Sync {
    fn spawn(&self, request: ProcessSpawnRequest) -> CoreResult<Box<dyn RunningProcess>>;
}

pub fn spawn_validated(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> CoreResult<Box<dyn RunningProcess>> {
    request.validate()?;
    executor.spawn(request)
}
