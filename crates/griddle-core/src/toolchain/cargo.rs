use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::execution::{
    CommandSpec, ProcessExecutor, ProcessExitStatus, ProcessSpawnRequest, spawn_validated,
};
use crate::models::{CoreError, CoreErrorKind, CoreResult};
use crate::package::inspect_manifest;
use crate::toolchain::{CompileFuture, CompileRequest, Toolchain, ToolchainConfig};

/// Builds task packages as `cdylib`s with `cargo build --lib`.
///
/// Intermediate build products go in a `target` directory beside the requested output, so
/// every build within one run shares already-compiled dependencies.
pub struct CargoToolchain {
    executor: Arc<dyn ProcessExecutor>,
    config: ToolchainConfig,
}

impl CargoToolchain {
    pub fn new(executor: Arc<dyn ProcessExecutor>, config: ToolchainConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    pub fn target_dir(output: &Path) -> PathBuf {
        output
            .parent()
            .map(|dir| dir.join("target"))
            .unwrap_or_else(|| PathBuf::from("target"))
    }

    pub fn command(&self, request: &CompileRequest) -> CoreResult<CommandSpec> {
        let manifest = utf8(&request.entry_point, "manifest path")?;
        let target_dir = Self::target_dir(&request.output);

        let mut command = CommandSpec::new(&self.config.cargo)
            .args(["build", "--lib", "--manifest-path"])
            .arg(manifest)
            .args(["--profile", self.config.profile.as_str()])
            .env("CARGO_TARGET_DIR", utf8(&target_dir, "target directory")?);

        if let Some(extra) = &request.extra_search_path {
            let inherited = self
                .config
                .search_path
                .clone()
                .or_else(|| std::env::var_os(&self.config.search_path_var));
            let joined = append_search_path(inherited.as_deref(), extra)?;
            command = command.env(self.config.search_path_var.clone(), joined);
        }

        Ok(command)
    }

    async fn run(&self, request: CompileRequest) -> CoreResult<()> {
        let identifier = request.entry_point.display().to_string();
        let package = inspect_manifest(&identifier, &request.entry_point)
            .map_err(|error| CoreError::new(CoreErrorKind::Compile, error.message))?;
        let command = self.command(&request)?;

        tracing::info!(
            package = %package.package_name,
            manifest = %request.entry_point.display(),
            profile = %self.config.profile,
            "compiling task module"
        );

        let mut spawn = ProcessSpawnRequest::new(CoreErrorKind::Compile, command);
        if let Some(timeout) = self.config.compile_timeout {
            spawn = spawn.timeout(timeout);
        }

        let lockfile = request.entry_point.with_file_name("Cargo.lock");
        let had_lockfile = lockfile.exists();

        let status = spawn_validated(self.executor.as_ref(), spawn)?.wait().await;
        if !had_lockfile {
            remove_generated_lockfile(&lockfile);
        }

        match status? {
            ProcessExitStatus::ExitCode(0) => {}
            ProcessExitStatus::ExitCode(code) => {
                return Err(CoreError::new(
                    CoreErrorKind::Compile,
                    format!("could not build task: cargo exited with code {code}"),
                ));
            }
            ProcessExitStatus::Terminated => {
                return Err(CoreError::new(
                    CoreErrorKind::Compile,
                    "could not build task: cargo was terminated by signal",
                ));
            }
        }

        let built = Self::target_dir(&request.output)
            .join(self.config.profile_dir())
            .join(format!("{DLL_PREFIX}{}{DLL_SUFFIX}", package.lib_name));
        if !built.is_file() {
            return Err(CoreError::new(
                CoreErrorKind::Compile,
                format!(
                    "cargo succeeded but produced no loadable module at {}",
                    built.display()
                ),
            ));
        }

        std::fs::copy(&built, &request.output).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Compile,
                format!(
                    "could not copy {} to {}: {error}",
                    built.display(),
                    request.output.display()
                ),
            )
        })?;

        tracing::debug!(artifact = %request.output.display(), "task module ready");
        Ok(())
    }
}

impl Toolchain for CargoToolchain {
    fn compile(&self, request: CompileRequest) -> CompileFuture<'_> {
        Box::pin(self.run(request))
    }
}

/// Cargo writes a lockfile beside a standalone manifest it builds; the package is left as it
/// was found.
fn remove_generated_lockfile(lockfile: &Path) {
    match std::fs::remove_file(lockfile) {
        Ok(()) => tracing::debug!(lockfile = %lockfile.display(), "removed generated lockfile"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => tracing::warn!(
            lockfile = %lockfile.display(),
            %error,
            "could not remove generated lockfile"
        ),
    }
}

/// Appends `extra` to an existing OS path list without dropping any entry.
pub fn append_search_path(existing: Option<&OsStr>, extra: &Path) -> CoreResult<String> {
    let mut paths: Vec<PathBuf> = existing
        .map(|value| {
            std::env::split_paths(value)
                .filter(|path| !path.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default();
    paths.push(extra.to_path_buf());

    let joined = std::env::join_paths(paths).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Compile,
            format!("could not extend search path with {}: {error}", extra.display()),
        )
    })?;
    joined.into_string().map_err(|_| {
        CoreError::new(CoreErrorKind::Compile, "search path is not valid UTF-8")
    })
}

fn utf8<'a>(path: &'a Path, what: &str) -> CoreResult<&'a str> {
    path.to_str().ok_or_else(|| {
        CoreError::new(
            CoreErrorKind::Compile,
            format!("{what} {} is not valid UTF-8", path.display()),
        )
    })
}
