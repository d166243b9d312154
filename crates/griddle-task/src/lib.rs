//! Plugin-side SDK for griddle lifecycle tasks.
//!
//! A task crate implements [`Task`] for a type that is also `Default`, `Serialize` and
//! `Deserialize`, then exports it under a symbol name:
//!
//! ```ignore
//! #[derive(Default, serde::Serialize, serde::Deserialize)]
//! pub struct Build {
//!     pub verbose: bool,
//! }
//!
//! impl griddle_task::Task for Build {
//!     fn execute(&mut self, context: &griddle_task::Context<'_>) -> griddle_task::TaskResult {
//!         println!("building in {}", context.working_dir().display());
//!         Ok(())
//!     }
//! }
//!
//! griddle_task::export_task!(BUILD, Build);
//! ```
//!
//! Crates built as a `cdylib` with an `export_task!` line are loaded directly. Plain library
//! crates only need the `Task` impl; the host generates the export for them.

pub mod abi;
mod bind;
mod context;

pub use abi::{RawContext, TASK_ABI_VERSION, TASK_MAGIC, TaskDescriptor};
pub use bind::{BindError, bind_params};
pub use context::Context;

pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

pub type TaskResult = Result<(), TaskError>;

/// A unit of work run by the host at a lifecycle point.
///
/// Public fields of the implementing type are its configuration; the host overlays the
/// declared `params` onto a `Default` instance before calling [`Task::execute`].
pub trait Task: Send {
    fn execute(&mut self, context: &Context<'_>) -> TaskResult;
}

/// Exports `$task` under the unmangled symbol `$name` so the host can resolve it.
#[macro_export]
macro_rules! export_task {
    ($name:ident, $task:ty) => {
        #[allow(non_upper_case_globals)]
        #[unsafe(no_mangle)]
        pub static $name: $crate::TaskDescriptor = $crate::TaskDescriptor::of::<$task>();
    };
}
