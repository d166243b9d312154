use std::path::Path;

use griddle_task::{Context, Task, TaskResult};
use serde::{Deserialize, Serialize};

/// Fails the build when the tree holds more TODO markers than allowed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoCheck {
    pub extensions: Vec<String>,
    pub max_todos: usize,
}

impl Default for TodoCheck {
    fn default() -> Self {
        Self {
            extensions: vec!["rs".to_string()],
            max_todos: 0,
        }
    }
}

impl Task for TodoCheck {
    fn execute(&mut self, context: &Context<'_>) -> TaskResult {
        let mut found = 0;
        self.scan(context, context.working_dir(), &mut found)?;

        if found > self.max_todos {
            let allowed = self.max_todos;
            return Err(format!("found {found} TODO markers, at most {allowed} allowed").into());
        }
        Ok(())
    }
}

impl TodoCheck {
    fn scan(&self, context: &Context<'_>, dir: &Path, found: &mut usize) -> TaskResult {
        for entry in std::fs::read_dir(dir)? {
            if context.is_cancelled() {
                return Err("cancelled".into());
            }

            let path = entry?.path();
            if path.is_dir() {
                if path.file_name().is_some_and(|name| name == "target") {
                    continue;
                }
                self.scan(context, &path, found)?;
                continue;
            }

            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext));
            if matches {
                let contents = std::fs::read_to_string(&path).unwrap_or_default();
                *found += contents.matches("TODO").count();
            }
        }
        Ok(())
    }
}
