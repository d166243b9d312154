use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_ignored::Path;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("params are not a JSON object: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("could not snapshot task configuration: {0}")]
    Snapshot(#[source] serde_json::Error),

    #[error("task configuration is not a struct with named fields")]
    NotAStruct,

    #[error("unknown task params: {}", .0.join(", "))]
    UnknownFields(Vec<String>),

    #[error("params do not fit task configuration: {0}")]
    Apply(#[source] serde_json::Error),
}

/// Overlays the JSON object in `params` onto `target`.
///
/// The current configuration is serialized, every incoming key is written over it, and the
/// result is deserialized back. Keys the task type does not read are reported as unknown;
/// fields that are not mentioned keep their current values. `target` is only replaced once
/// the merged configuration deserializes cleanly.
pub fn bind_params<T>(target: &mut T, params: &str) -> Result<(), BindError>
where
    T: Serialize + DeserializeOwned,
{
    let incoming: Map<String, Value> = serde_json::from_str(params).map_err(BindError::Decode)?;

    let mut merged = match serde_json::to_value(&*target).map_err(BindError::Snapshot)? {
        Value::Object(fields) => fields,
        _ => return Err(BindError::NotAStruct),
    };
    merged.extend(incoming);

    let mut unknown = Vec::new();
    let bound: Result<T, _> = serde_ignored::deserialize(Value::Object(merged), |path| {
        if let Path::Map {
            parent: Path::Root,
            key,
        } = path
        {
            unknown.push(key);
        }
    });

    if !unknown.is_empty() {
        unknown.sort();
        return Err(BindError::UnknownFields(unknown));
    }
    *target = bound.map_err(BindError::Apply)?;
    Ok(())
}
