use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use griddle_core::builder::TaskBuilder;
use griddle_core::context::{CancellationToken, ExecutionContext};
use griddle_core::declarations::{self, DEFAULT_FILE_NAME, LifecyclePhase};
use griddle_core::driver::TaskDriver;
use griddle_core::execution::TokioProcessExecutor;
use griddle_core::loader::DylibLoader;
use griddle_core::models::{CoreError, CoreErrorKind, CoreResult, RunReport};
use griddle_core::package::PackageResolver;
use griddle_core::toolchain::{CargoToolchain, SEARCH_PATH_VAR, ToolchainConfig};

const LOG_VAR: &str = "GRIDDLE_LOG";

/// Build and run the tasks declared for a lifecycle phase
#[derive(Parser, Debug)]
#[command(name = "griddle")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    \
    GRIDDLE_LOG      Log filter, e.g. `griddle_core=debug` (overrides -v)\n    \
    GRIDDLE_PATH     Extra roots searched for task packages\n    \
    GRIDDLE_PROFILE  Cargo profile used to build task modules (default: release)\n    \
    CARGO            Cargo executable to invoke")]
struct Cli {
    /// Declaration file, relative to the working directory
    #[arg(short, long, default_value = DEFAULT_FILE_NAME)]
    file: PathBuf,

    /// Lifecycle phase whose tasks should run
    #[arg(long, value_enum, default_value_t = Phase::BeforeBuild)]
    phase: Phase,

    /// Directory tasks run in and packages are resolved from
    #[arg(short = 'C', long)]
    working_dir: Option<PathBuf>,

    /// Cargo executable used to compile task modules
    #[arg(long)]
    cargo: Option<PathBuf>,

    /// Cargo profile used to compile task modules
    #[arg(long)]
    profile: Option<String>,

    /// Abort any single compilation after this many seconds
    #[arg(long, value_name = "SECS")]
    compile_timeout: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Phase {
    BeforeBuild,
}

impl From<Phase> for LifecyclePhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::BeforeBuild => LifecyclePhase::BeforeBuild,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(report) => {
            for task in &report.completed {
                tracing::info!(
                    index = task.index,
                    package = %task.package,
                    symbol = %task.symbol,
                    elapsed_ms = task.elapsed.as_millis() as u64,
                    "task done"
                );
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("griddle: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_VAR)
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> CoreResult<RunReport> {
    let working_dir = match &cli.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("could not determine working directory: {error}"),
            )
        })?,
    };
    let working_dir = std::path::absolute(&working_dir).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("could not resolve {}: {error}", working_dir.display()),
        )
    })?;

    let file = declarations::parse_file(&declaration_path(&working_dir, &cli.file))?;
    let phase = LifecyclePhase::from(cli.phase);
    let tasks = file.declarations(phase);
    if tasks.is_empty() {
        tracing::info!(phase = phase.as_str(), "no tasks declared");
        return Ok(RunReport::default());
    }

    let driver = TaskDriver::new(
        PackageResolver::from_env(&working_dir, SEARCH_PATH_VAR),
        TaskBuilder::new(
            Arc::new(CargoToolchain::new(
                Arc::new(TokioProcessExecutor),
                toolchain_config(&cli),
            )),
            Arc::new(DylibLoader),
        ),
    );

    let cancellation = CancellationToken::new();
    watch_interrupt(cancellation.clone());

    let context = ExecutionContext::new(&working_dir).with_cancellation(cancellation);
    driver.run(tasks, &context).await
}

fn declaration_path(working_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        working_dir.join(file)
    }
}

fn toolchain_config(cli: &Cli) -> ToolchainConfig {
    let mut config = ToolchainConfig::from_env();
    if let Some(cargo) = &cli.cargo {
        config.cargo = cargo.clone();
    }
    if let Some(profile) = &cli.profile {
        config.profile = profile.clone();
    }
    if let Some(seconds) = cli.compile_timeout {
        config.compile_timeout = Some(Duration::from_secs(seconds));
    }
    config
}

fn watch_interrupt(cancellation: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; no further tasks will start");
            cancellation.cancel();
        }
    });
}
