pub mod cargo;

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

pub use cargo::CargoToolchain;

use crate::models::CoreResult;

pub const SEARCH_PATH_VAR: &str = "GRIDDLE_PATH";
pub const PROFILE_VAR: &str = "GRIDDLE_PROFILE";
pub const DEFAULT_PROFILE: &str = "release";

pub type CompileFuture<'a> = Pin<Box<dyn Future<Output = CoreResult<()>> + Send + 'a>>;

/// One build of a loadable task module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompileRequest {
    /// Manifest of the package to build.
    pub entry_point: PathBuf,
    /// Where the loadable artifact must end up.
    pub output: PathBuf,
    /// Appended to the child's package search path when present.
    pub extra_search_path: Option<PathBuf>,
}

impl CompileRequest {
    pub fn new(entry_point: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            entry_point: entry_point.into(),
            output: output.into(),
            extra_search_path: None,
        }
    }

    pub fn extra_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_search_path = Some(path.into());
        self
    }
}

/// Produces a dynamically loadable artifact from a compilable entry point.
///
/// Diagnostics go straight to the caller's stdout/stderr. On success the artifact exists at
/// `request.output`; any failure is final.
pub trait Toolchain: Send + Sync {
    fn compile(&self, request: CompileRequest) -> CompileFuture<'_>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolchainConfig {
    pub cargo: PathBuf,
    pub profile: String,
    pub compile_timeout: Option<Duration>,
    pub search_path_var: String,
    /// Search path to extend for each build. When unset, the current value of
    /// `search_path_var` is read at command construction.
    pub search_path: Option<OsString>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cargo: PathBuf::from("cargo"),
            profile: DEFAULT_PROFILE.to_string(),
            compile_timeout: None,
            search_path_var: SEARCH_PATH_VAR.to_string(),
            search_path: None,
        }
    }
}

impl ToolchainConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cargo: std::env::var_os("CARGO")
                .map(PathBuf::from)
                .unwrap_or(defaults.cargo),
            profile: std::env::var(PROFILE_VAR)
                .ok()
                .filter(|profile| !profile.trim().is_empty())
                .unwrap_or(defaults.profile),
            search_path: std::env::var_os(&defaults.search_path_var),
            ..defaults
        }
    }

    /// Directory under the target dir where cargo places artifacts for `profile`.
    pub fn profile_dir(&self) -> &str {
        match self.profile.as_str() {
            "dev" | "test" => "debug",
            "bench" => "release",
            other => other,
        }
    }
}
