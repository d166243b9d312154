use crate::loader::LoadedTask;
use crate::models::{BindFailure, CoreError, CoreErrorKind, CoreResult, Params};

/// Applies declared params to a freshly loaded task.
///
/// `None` leaves the task's defaults untouched. An empty map still crosses into the module,
/// so a task whose serialization cannot round-trip fails the same way either way.
pub fn bind_params(task: &mut LoadedTask, params: Option<&Params>) -> CoreResult<()> {
    let Some(params) = params else {
        tracing::trace!("no params declared; keeping task defaults");
        return Ok(());
    };

    let encoded = serde_json::to_string(params).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Bind(BindFailure::Serialize),
            format!("could not encode task params: {error}"),
        )
    })?;

    tracing::debug!(keys = params.len(), "binding task params");
    task.bind_json(&encoded).map_err(|mut error| {
        error.message = format!("could not bind params to task: {}", error.message);
        error
    })
}
