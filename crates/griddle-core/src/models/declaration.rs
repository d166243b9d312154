use serde::{Deserialize, Serialize};

/// Free-form task parameters, keyed by configuration field name.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// One task entry from the declaration file.
///
/// `params: None` (key absent or null) and `Some` of an empty map are kept distinct; only
/// the latter triggers a bind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDeclaration {
    #[serde(default)]
    pub package: String,
    #[serde(default, rename = "task")]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl TaskDeclaration {
    pub fn new(package: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            symbol: symbol.into(),
            params: None,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params
            .get_or_insert_with(Params::new)
            .insert(key.into(), value.into());
        self
    }
}
