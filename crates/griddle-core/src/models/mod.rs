pub mod declaration;
pub mod error;
pub mod task;

pub use declaration::{Params, TaskDeclaration};
pub use error::{BindFailure, CoreError, CoreErrorKind, CoreResult, LoadFailure};
pub use task::{CompletedTask, RunReport, TaskStage};
