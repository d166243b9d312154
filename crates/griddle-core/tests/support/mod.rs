#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use griddle_core::context::CancellationToken;
use griddle_core::loader::{LoadedTask, ModuleLoader};
use griddle_core::models::{CoreError, CoreErrorKind, CoreResult, LoadFailure};
use griddle_core::toolchain::{CompileFuture, CompileRequest, Toolchain};
use griddle_task::{Context, Task, TaskDescriptor, TaskResult};
use serde::{Deserialize, Serialize};

pub const LOG_FILE: &str = "tasks.log";

fn append(context: &Context<'_>, line: &str) -> TaskResult {
    let mut log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(context.working_dir().join(LOG_FILE))?;
    writeln!(log, "{line}")?;
    Ok(())
}

pub fn executed(working_dir: &Path) -> Vec<String> {
    std::fs::read_to_string(working_dir.join(LOG_FILE))
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[derive(Default, Serialize, Deserialize)]
pub struct Build {
    verbose: bool,
}

impl Task for Build {
    fn execute(&mut self, context: &Context<'_>) -> TaskResult {
        append(context, &format!("Build verbose={}", self.verbose))
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Lint {
    strict: bool,
}

impl Task for Lint {
    fn execute(&mut self, context: &Context<'_>) -> TaskResult {
        append(context, &format!("Lint strict={}", self.strict))
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Fail {}

impl Task for Fail {
    fn execute(&mut self, _context: &Context<'_>) -> TaskResult {
        Err("lint failed: 3 warnings".into())
    }
}

pub static BUILD: TaskDescriptor = TaskDescriptor::of::<Build>();
pub static LINT: TaskDescriptor = TaskDescriptor::of::<Lint>();
pub static FAIL: TaskDescriptor = TaskDescriptor::of::<Fail>();

/// Compiles by writing a placeholder module to the requested output.
#[derive(Default)]
pub struct FakeToolchain {
    pub requests: Mutex<Vec<CompileRequest>>,
    /// Whether the entry-point manifest existed when each compile started.
    pub entry_points_present: Mutex<Vec<bool>>,
    pub fail_compile: bool,
    pub cancel_after_first: Option<CancellationToken>,
}

impl Toolchain for FakeToolchain {
    fn compile(&self, request: CompileRequest) -> CompileFuture<'_> {
        Box::pin(async move {
            self.entry_points_present
                .lock()
                .unwrap()
                .push(request.entry_point.is_file());

            let count = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len()
            };
            if count == 1
                && let Some(token) = &self.cancel_after_first
            {
                token.cancel();
            }

            if self.fail_compile {
                return Err(CoreError::new(
                    CoreErrorKind::Compile,
                    "could not build task: cargo exited with code 101",
                ));
            }

            std::fs::write(&request.output, b"module").map_err(|error| {
                CoreError::new(CoreErrorKind::Compile, error.to_string())
            })?;
            Ok(())
        })
    }
}

/// Resolves symbols to descriptors linked into the test binary.
pub struct FakeLoader {
    tasks: HashMap<String, &'static TaskDescriptor>,
    pub loads: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeLoader {
    pub fn new(tasks: impl IntoIterator<Item = (&'static str, &'static TaskDescriptor)>) -> Self {
        Self {
            tasks: tasks
                .into_iter()
                .map(|(symbol, descriptor)| (symbol.to_string(), descriptor))
                .collect(),
            loads: Mutex::new(Vec::new()),
        }
    }

    pub fn standard() -> Self {
        Self::new([("Build", &BUILD), ("Lint", &LINT), ("Fail", &FAIL)])
    }
}

impl ModuleLoader for FakeLoader {
    fn load(&self, artifact: &Path, symbol: &str) -> CoreResult<LoadedTask> {
        if !artifact.is_file() {
            return Err(CoreError::new(
                CoreErrorKind::Load(LoadFailure::Open),
                format!("could not open task module {}", artifact.display()),
            ));
        }

        self.loads
            .lock()
            .unwrap()
            .push((artifact.to_path_buf(), symbol.to_string()));

        let descriptor = self.tasks.get(symbol).copied().ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::Load(LoadFailure::MissingSymbol),
                format!("symbol `{symbol}` not found in {}", artifact.display()),
            )
        })?;
        LoadedTask::from_static(descriptor)
    }
}

pub fn write_package(root: &Path, relative: &str, manifest: &str) -> PathBuf {
    let dir = root.join(relative);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("Cargo.toml"), manifest).unwrap();
    dir
}

pub fn write_entry_point(root: &Path, relative: &str, name: &str) -> PathBuf {
    write_package(
        root,
        relative,
        &format!("[package]\nname = \"{name}\"\n\n[lib]\ncrate-type = [\"cdylib\"]\n"),
    )
}

pub fn write_library(root: &Path, relative: &str, name: &str) -> PathBuf {
    write_package(
        root,
        relative,
        &format!(
            "[package]\nname = \"{name}\"\n\n[dependencies]\n{}",
            "griddle-task = { path = \"../sdk\" }\n"
        ),
    )
}
