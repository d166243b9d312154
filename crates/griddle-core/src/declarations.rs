use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, CoreResult, TaskDeclaration};

pub const DEFAULT_FILE_NAME: &str = "griddle.yaml";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LifecyclePhase {
    BeforeBuild,
}

impl LifecyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeBuild => "before_build",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarationFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<LifecycleTasks>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleTasks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_build: Option<Vec<TaskDeclaration>>,
}

impl DeclarationFile {
    /// Declarations for `phase`, in file order. Missing sections yield an empty list.
    pub fn declarations(&self, phase: LifecyclePhase) -> &[TaskDeclaration] {
        let tasks = self.tasks.as_ref();
        match phase {
            LifecyclePhase::BeforeBuild => tasks
                .and_then(|tasks| tasks.before_build.as_deref())
                .unwrap_or_default(),
        }
    }

    fn validate(&self) -> CoreResult<()> {
        for phase in [LifecyclePhase::BeforeBuild] {
            for (index, declaration) in self.declarations(phase).iter().enumerate() {
                let missing = if declaration.package.trim().is_empty() {
                    Some("package")
                } else if declaration.symbol.trim().is_empty() {
                    Some("task")
                } else {
                    None
                };

                if let Some(field) = missing {
                    let mut error = CoreError::new(
                        CoreErrorKind::Declaration,
                        format!("{} entry {index} is missing `{field}`", phase.as_str()),
                    );
                    error.declaration = Some(index);
                    return Err(error);
                }
            }
        }
        Ok(())
    }
}

pub fn parse_str(contents: &str) -> CoreResult<DeclarationFile> {
    // An empty document is a file with no tasks, not a parse error.
    if contents.trim().is_empty() {
        return Ok(DeclarationFile::default());
    }

    let file: DeclarationFile = serde_yaml::from_str(contents).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Declaration,
            format!("invalid declaration file: {error}"),
        )
    })?;
    file.validate()?;
    Ok(file)
}

pub fn parse_file(path: &Path) -> CoreResult<DeclarationFile> {
    let contents = std::fs::read_to_string(path).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Declaration,
            format!("error reading declaration file {}: {error}", path.display()),
        )
    })?;

    parse_str(&contents).map_err(|mut error| {
        error.message = format!("{}: {}", path.display(), error.message);
        error
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_before_build_in_order() {
        let file = parse_str(
            r#"
tasks:
  before_build:
    - package: pkg/a
      task: Build
      params:
        verbose: true
        retries: 3
    - package: ./tasks/lint
      task: Lint
"#,
        )
        .unwrap();

        let declarations = file.declarations(LifecyclePhase::BeforeBuild);
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].package, "pkg/a");
        assert_eq!(declarations[0].symbol, "Build");
        let params = declarations[0].params.as_ref().unwrap();
        assert_eq!(params["verbose"], json!(true));
        assert_eq!(params["retries"], json!(3));
        assert_eq!(declarations[1].symbol, "Lint");
        assert_eq!(declarations[1].params, None);
    }

    #[test]
    fn keeps_empty_params_distinct_from_absent() {
        let file = parse_str(
            r#"
tasks:
  before_build:
    - { package: a, task: A, params: {} }
    - { package: b, task: B, params: ~ }
    - { package: c, task: C }
"#,
        )
        .unwrap();

        let declarations = file.declarations(LifecyclePhase::BeforeBuild);
        assert_eq!(declarations[0].params, Some(Default::default()));
        assert_eq!(declarations[1].params, None);
        assert_eq!(declarations[2].params, None);
    }

    #[test]
    fn missing_sections_mean_no_tasks() {
        for contents in ["", "tasks: {}\n", "tasks:\n  before_build: ~\n"] {
            let file = parse_str(contents).unwrap();
            assert!(file.declarations(LifecyclePhase::BeforeBuild).is_empty());
        }
    }

    #[test]
    fn entries_without_task_are_rejected_with_index() {
        let error = parse_str(
            r#"
tasks:
  before_build:
    - { package: a, task: A }
    - { package: b }
"#,
        )
        .unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::Declaration);
        assert_eq!(error.declaration, Some(1));
        assert!(error.message.contains("missing `task`"));
    }

    #[test]
    fn malformed_yaml_is_a_declaration_error() {
        let error = parse_str("tasks: [not, a, mapping").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::Declaration);
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_FILE_NAME);

        let error = parse_file(&path).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::Declaration);
        assert!(error.message.contains(DEFAULT_FILE_NAME));
    }
}
