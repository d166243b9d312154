use std::env::consts::DLL_SUFFIX;
use std::path::Path;
use std::time::Instant;

use crate::builder::TaskBuilder;
use crate::context::ExecutionContext;
use crate::models::{
    CompletedTask, CoreError, CoreErrorKind, CoreResult, RunReport, TaskDeclaration, TaskStage,
};
use crate::package::PackageResolver;

const OUTPUT_ROOT_PREFIX: &str = "griddle";

/// Runs declared tasks one after another, stopping at the first failure.
#[derive(Clone)]
pub struct TaskDriver {
    resolver: PackageResolver,
    builder: TaskBuilder,
}

impl TaskDriver {
    pub fn new(resolver: PackageResolver, builder: TaskBuilder) -> Self {
        Self { resolver, builder }
    }

    pub async fn run(
        &self,
        declarations: &[TaskDeclaration],
        context: &ExecutionContext,
    ) -> CoreResult<RunReport> {
        let output_root = tempfile::Builder::new()
            .prefix(OUTPUT_ROOT_PREFIX)
            .tempdir()
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("could not create output directory: {error}"),
                )
            })?;

        tracing::info!(
            tasks = declarations.len(),
            output_root = %output_root.path().display(),
            "running tasks"
        );

        let mut report = RunReport::default();
        for (index, declaration) in declarations.iter().enumerate() {
            let started = Instant::now();
            let mut stage = TaskStage::Unbuilt;

            if let Err(error) = self
                .run_one(index, declaration, output_root.path(), context, &mut stage)
                .await
            {
                let error = error
                    .for_task(&declaration.package, &declaration.symbol)
                    .at(index, stage);
                tracing::error!(
                    index,
                    package = %declaration.package,
                    symbol = %declaration.symbol,
                    stage = TaskStage::Failed.as_str(),
                    kind = ?error.kind,
                    "task failed"
                );
                return Err(error);
            }

            report.completed.push(CompletedTask {
                index,
                package: declaration.package.clone(),
                symbol: declaration.symbol.clone(),
                elapsed: started.elapsed(),
            });
        }

        let root = output_root.path().to_path_buf();
        if let Err(error) = output_root.close() {
            tracing::warn!(
                output_root = %root.display(),
                error = %error,
                "could not remove output directory"
            );
        }

        tracing::info!(completed = report.completed.len(), "all tasks finished");
        Ok(report)
    }

    async fn run_one(
        &self,
        index: usize,
        declaration: &TaskDeclaration,
        output_root: &Path,
        context: &ExecutionContext,
        stage: &mut TaskStage,
    ) -> CoreResult<()> {
        if context.cancellation().is_cancelled() {
            return Err(CoreError::new(
                CoreErrorKind::Cancelled,
                "run cancelled before task started",
            ));
        }

        advance(index, declaration, stage);
        let package = self.resolver.resolve(&declaration.package)?;
        let artifact = output_root.join(format!("task-{index}{DLL_SUFFIX}"));
        let mut task = self
            .builder
            .build(
                &package,
                &declaration.symbol,
                declaration.params.as_ref(),
                &artifact,
            )
            .await?;

        // The builder hands back a task that is both loaded and bound.
        advance(index, declaration, stage);
        advance(index, declaration, stage);

        advance(index, declaration, stage);
        let context = context.clone();
        tokio::task::spawn_blocking(move || task.execute(&context))
            .await
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("task execution thread failed: {error}"),
                )
            })??;

        advance(index, declaration, stage);
        Ok(())
    }
}

fn advance(index: usize, declaration: &TaskDeclaration, stage: &mut TaskStage) {
    if let Some(next) = stage.next() {
        *stage = next;
    }
    tracing::debug!(
        index,
        package = %declaration.package,
        symbol = %declaration.symbol,
        stage = stage.as_str(),
        "task stage"
    );
}
