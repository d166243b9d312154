use griddle_task::{Context, Task, TaskResult, export_task};
use serde::{Deserialize, Serialize};

/// Writes a build stamp into the working directory.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    pub verbose: bool,
    pub stamp_file: String,
}

impl Default for Build {
    fn default() -> Self {
        Self {
            verbose: false,
            stamp_file: "hello-task.stamp".to_string(),
        }
    }
}

impl Task for Build {
    fn execute(&mut self, context: &Context<'_>) -> TaskResult {
        let stamp = context.working_dir().join(&self.stamp_file);
        if self.verbose {
            eprintln!("hello-task: writing {}", stamp.display());
        }
        std::fs::write(&stamp, "built by hello-task\n")?;
        Ok(())
    }
}

export_task!(Build, Build);
