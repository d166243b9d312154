use std::path::Path;
use std::sync::Arc;

use crate::adapter::{ADAPTER_SYMBOL, synthesize_adapter};
use crate::binder::bind_params;
use crate::loader::{LoadedTask, ModuleLoader};
use crate::models::{CoreResult, Params};
use crate::package::PackageLocation;
use crate::toolchain::{CompileRequest, Toolchain};

/// Turns a located package and symbol into a loaded, bound task.
#[derive(Clone)]
pub struct TaskBuilder {
    toolchain: Arc<dyn Toolchain>,
    loader: Arc<dyn ModuleLoader>,
}

impl TaskBuilder {
    pub fn new(toolchain: Arc<dyn Toolchain>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self { toolchain, loader }
    }

    /// Builds `symbol` from `package`, compiling the module to `output`.
    ///
    /// Packages that already build as a `cdylib` are compiled directly; anything else goes
    /// through a generated adapter crate.
    pub async fn build(
        &self,
        package: &PackageLocation,
        symbol: &str,
        params: Option<&Params>,
        output: &Path,
    ) -> CoreResult<LoadedTask> {
        if package.is_entry_point {
            self.build_entry_point(package, symbol, params, output).await
        } else {
            self.build_adapted(package, symbol, params, output).await
        }
    }

    pub async fn build_entry_point(
        &self,
        package: &PackageLocation,
        symbol: &str,
        params: Option<&Params>,
        output: &Path,
    ) -> CoreResult<LoadedTask> {
        tracing::debug!(package = %package.identifier, symbol, "building entry-point package");

        let request = CompileRequest::new(&package.manifest_path, output);
        self.finish(request, symbol, params)
            .await
            .map_err(|error| error.for_task(&package.identifier, symbol))
    }

    pub async fn build_adapted(
        &self,
        package: &PackageLocation,
        symbol: &str,
        params: Option<&Params>,
        output: &Path,
    ) -> CoreResult<LoadedTask> {
        let adapted = async {
            let adapter = synthesize_adapter(package, symbol)?;
            tracing::debug!(
                package = %package.identifier,
                symbol,
                adapter = %adapter.root().display(),
                "building library package through adapter"
            );

            let request = CompileRequest::new(adapter.manifest_path(), output)
                .extra_search_path(adapter.root());
            self.finish(request, ADAPTER_SYMBOL, params).await
        };

        adapted
            .await
            .map_err(|error| error.for_task(&package.identifier, symbol))
    }

    async fn finish(
        &self,
        request: CompileRequest,
        symbol: &str,
        params: Option<&Params>,
    ) -> CoreResult<LoadedTask> {
        let artifact = request.output.clone();
        self.toolchain.compile(request).await?;

        let mut task = self.loader.load(&artifact, symbol)?;
        bind_params(&mut task, params)?;
        Ok(task)
    }
}
