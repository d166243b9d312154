//! Generated entry points for task packages that are plain libraries.
//!
//! The adapter is a throwaway `cdylib` crate whose only content is an export of the
//! requested task type under [`ADAPTER_SYMBOL`]. Everything it does at runtime comes from
//! the target package.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use toml::Value;

use crate::models::{CoreError, CoreErrorKind, CoreResult};
use crate::package::{MANIFEST_FILE, PackageLocation, read_manifest};

pub const ADAPTER_SYMBOL: &str = "GRIDDLE_ADAPTED_TASK";
/// Name the target package is imported under inside the adapter.
pub const ADAPTER_ALIAS: &str = "task_package";
pub const ADAPTER_PACKAGE: &str = "griddle-adapter";
pub const SDK_PACKAGE: &str = "griddle-task";

/// A synthesized adapter crate. The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct AdapterSource {
    root: TempDir,
    manifest_path: PathBuf,
    source_path: PathBuf,
}

impl AdapterSource {
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

pub fn synthesize_adapter(package: &PackageLocation, symbol: &str) -> CoreResult<AdapterSource> {
    if !is_rust_path(symbol) {
        return Err(synthesis_error(format!(
            "`{symbol}` is not a valid Rust path to a task type"
        )));
    }

    let package_root = std::path::absolute(&package.root_dir).map_err(|error| {
        synthesis_error(format!(
            "could not resolve {}: {error}",
            package.root_dir.display()
        ))
    })?;
    let sdk = sdk_dependency(package, &package_root)?;

    let prefix = format!("{}-", symbol.replace("::", "_"));
    let root = tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir()
        .map_err(|error| {
            synthesis_error(format!(
                "error creating temp directory for adapter build: {error}"
            ))
        })?;

    let src_dir = root.path().join("src");
    std::fs::create_dir_all(&src_dir).map_err(|error| {
        synthesis_error(format!("could not create {}: {error}", src_dir.display()))
    })?;

    let manifest_path = root.path().join(MANIFEST_FILE);
    let manifest = adapter_manifest(&package.package_name, &package_root, &sdk);
    write(&manifest_path, &manifest)?;

    let source_path = src_dir.join("lib.rs");
    write(&source_path, &adapter_source(&package.identifier, symbol))?;

    tracing::debug!(
        package = %package.identifier,
        symbol,
        root = %root.path().display(),
        "synthesized adapter crate"
    );

    Ok(AdapterSource {
        root,
        manifest_path,
        source_path,
    })
}

fn adapter_manifest(package_name: &str, package_root: &Path, sdk: &Value) -> String {
    let quote = |text: &str| Value::String(text.to_string()).to_string();
    let package_root = package_root.to_string_lossy();

    format!(
        "[package]\n\
         name = {name}\n\
         version = \"0.0.0\"\n\
         edition = \"2024\"\n\
         publish = false\n\
         \n\
         [lib]\n\
         crate-type = [\"cdylib\"]\n\
         path = \"src/lib.rs\"\n\
         \n\
         [dependencies]\n\
         {ADAPTER_ALIAS} = {{ package = {target}, path = {path} }}\n\
         {SDK_PACKAGE} = {sdk}\n\
         \n\
         [workspace]\n",
        name = quote(ADAPTER_PACKAGE),
        target = quote(package_name),
        path = quote(&package_root),
    )
}

fn adapter_source(identifier: &str, symbol: &str) -> String {
    format!(
        "// Generated by griddle for `{identifier}`. Do not edit.\n\
         griddle_task::export_task!({ADAPTER_SYMBOL}, {ADAPTER_ALIAS}::{symbol});\n"
    )
}

/// The target's own `griddle-task` dependency, rewritten so it resolves from anywhere.
fn sdk_dependency(package: &PackageLocation, package_root: &Path) -> CoreResult<Value> {
    let manifest: toml::Table = read_manifest(&package.manifest_path)
        .map_err(|error| synthesis_error(error.to_string()))?;

    let (key, spec) = manifest
        .get("dependencies")
        .and_then(Value::as_table)
        .and_then(|deps| deps.iter().find(|(key, spec)| names_sdk(key, spec)))
        .ok_or_else(|| {
            synthesis_error(format!(
                "package `{}` does not depend on {SDK_PACKAGE}",
                package.package_name
            ))
        })?;

    let Some(table) = spec.as_table() else {
        return Ok(spec.clone());
    };

    if table.get("workspace").and_then(Value::as_bool) == Some(true) {
        let (workspace_dir, inherited) = workspace_dependency(package_root, key)?;
        let mut resolved = match inherited {
            Value::Table(table) => table,
            version => {
                let mut table = toml::Table::new();
                table.insert("version".to_string(), version);
                table
            }
        };
        if let Some(features) = table.get("features") {
            resolved.insert("features".to_string(), features.clone());
        }
        return Ok(Value::Table(absolutize(resolved, &workspace_dir)));
    }

    Ok(Value::Table(absolutize(table.clone(), package_root)))
}

fn names_sdk(key: &str, spec: &Value) -> bool {
    match spec.get("package").and_then(Value::as_str) {
        Some(package) => package == SDK_PACKAGE,
        None => key == SDK_PACKAGE,
    }
}

fn workspace_dependency(package_root: &Path, key: &str) -> CoreResult<(PathBuf, Value)> {
    for dir in package_root.ancestors() {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            continue;
        }
        let manifest: toml::Table = read_manifest(&manifest_path)
            .map_err(|error| synthesis_error(error.to_string()))?;
        let Some(workspace) = manifest.get("workspace") else {
            continue;
        };
        if let Some(spec) = workspace
            .get("dependencies")
            .and_then(|deps| deps.get(key))
        {
            return Ok((dir.to_path_buf(), spec.clone()));
        }
        // The nearest workspace is the only one cargo would consult.
        break;
    }

    Err(synthesis_error(format!(
        "{key} is inherited from a workspace that does not declare it"
    )))
}

fn absolutize(mut spec: toml::Table, base: &Path) -> toml::Table {
    spec.remove("optional");
    spec.remove("workspace");
    if let Some(Value::String(path)) = spec.get_mut("path")
        && Path::new(path.as_str()).is_relative()
    {
        *path = base.join(path.as_str()).to_string_lossy().into_owned();
    }
    spec
}

fn is_rust_path(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.split("::").all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) if first == '_' || first.is_ascii_alphabetic() => {
                    segment != "_" && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
                }
                _ => false,
            }
        })
}

fn write(path: &Path, contents: &str) -> CoreResult<()> {
    std::fs::write(path, contents).map_err(|error| {
        synthesis_error(format!("error writing {}: {error}", path.display()))
    })
}

fn synthesis_error(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::Synthesis, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::inspect_manifest;

    fn library(dir: &Path, manifest: &str) -> PackageLocation {
        std::fs::create_dir_all(dir).unwrap();
        let manifest_path = dir.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, manifest).unwrap();
        inspect_manifest("tasks/lint", &manifest_path).unwrap()
    }

    #[test]
    fn writes_manifest_and_single_export() {
        let workspace = tempfile::tempdir().unwrap();
        let package = library(
            &workspace.path().join("lint"),
            r#"
[package]
name = "lint-tasks"

[dependencies]
griddle-task = { path = "../sdk", optional = true }
"#,
        );

        let adapter = synthesize_adapter(&package, "rules::Lint").unwrap();
        assert!(adapter.root().is_dir());
        assert_eq!(adapter.source_path(), adapter.root().join("src").join("lib.rs"));

        let source = std::fs::read_to_string(adapter.source_path()).unwrap();
        assert!(source.contains(
            "griddle_task::export_task!(GRIDDLE_ADAPTED_TASK, task_package::rules::Lint);"
        ));
        assert_eq!(source.lines().filter(|line| !line.starts_with("//")).count(), 1);

        let manifest: toml::Table =
            toml::from_str(&std::fs::read_to_string(adapter.manifest_path()).unwrap()).unwrap();
        assert_eq!(manifest["lib"]["crate-type"][0].as_str(), Some("cdylib"));
        assert!(manifest.contains_key("workspace"));

        let target = &manifest["dependencies"][ADAPTER_ALIAS];
        assert_eq!(target["package"].as_str(), Some("lint-tasks"));
        let target_path = PathBuf::from(target["path"].as_str().unwrap());
        assert!(target_path.is_absolute());
        assert!(target_path.ends_with("lint"));

        let sdk = &manifest["dependencies"][SDK_PACKAGE];
        let sdk_path = PathBuf::from(sdk["path"].as_str().unwrap());
        assert!(sdk_path.is_absolute());
        assert!(sdk_path.ends_with("lint/../sdk"));
        assert!(sdk.get("optional").is_none());
    }

    #[test]
    fn root_is_removed_on_drop() {
        let workspace = tempfile::tempdir().unwrap();
        let package = library(
            &workspace.path().join("lint"),
            "[package]\nname = \"lint\"\n\n[dependencies]\ngriddle-task = \"0.3\"\n",
        );

        let adapter = synthesize_adapter(&package, "Lint").unwrap();
        let root = adapter.root().to_path_buf();
        let manifest = std::fs::read_to_string(adapter.manifest_path()).unwrap();
        assert!(manifest.contains("griddle-task = \"0.3\""));

        drop(adapter);
        assert!(!root.exists());
    }

    #[test]
    fn resolves_renamed_and_workspace_inherited_sdk() {
        let workspace = tempfile::tempdir().unwrap();
        std::fs::write(
            workspace.path().join(MANIFEST_FILE),
            r#"
[workspace]
members = ["tasks/*"]

[workspace.dependencies]
sdk = { package = "griddle-task", path = "vendor/griddle-task" }
"#,
        )
        .unwrap();
        let package = library(
            &workspace.path().join("tasks").join("lint"),
            r#"
[package]
name = "lint"

[dependencies]
sdk = { workspace = true, features = ["extra"] }
"#,
        );

        let adapter = synthesize_adapter(&package, "Lint").unwrap();
        let manifest: toml::Table =
            toml::from_str(&std::fs::read_to_string(adapter.manifest_path()).unwrap()).unwrap();

        let sdk = &manifest["dependencies"][SDK_PACKAGE];
        assert_eq!(sdk["package"].as_str(), Some("griddle-task"));
        assert_eq!(sdk["features"][0].as_str(), Some("extra"));
        let sdk_path = PathBuf::from(sdk["path"].as_str().unwrap());
        assert_eq!(sdk_path, workspace.path().join("vendor/griddle-task"));
    }

    #[test]
    fn packages_without_sdk_cannot_be_adapted() {
        let workspace = tempfile::tempdir().unwrap();
        let package = library(&workspace.path().join("plain"), "[package]\nname = \"plain\"\n");

        let error = synthesize_adapter(&package, "Lint").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::Synthesis);
        assert!(error.message.contains("does not depend on griddle-task"));
    }

    #[test]
    fn rejects_symbols_that_are_not_paths() {
        let workspace = tempfile::tempdir().unwrap();
        let package = library(
            &workspace.path().join("lint"),
            "[package]\nname = \"lint\"\n\n[dependencies]\ngriddle-task = \"0.3\"\n",
        );

        for symbol in ["", "Lint; fn evil() {}", "9Lint", "a::", "_", "Lint<T>"] {
            let error = synthesize_adapter(&package, symbol).unwrap_err();
            assert_eq!(error.kind, CoreErrorKind::Synthesis, "symbol {symbol:?}");
        }
        assert!(is_rust_path("checks::_Internal"));
    }
}
