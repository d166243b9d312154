use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{CoreError, CoreErrorKind, CoreResult};

pub const MANIFEST_FILE: &str = "Cargo.toml";

/// A task package located on disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageLocation {
    pub identifier: String,
    pub root_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub package_name: String,
    pub lib_name: String,
    /// Builds as a `cdylib`, so it can be compiled and loaded without an adapter.
    pub is_entry_point: bool,
}

#[derive(Debug, Error)]
pub(crate) enum ManifestError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{path} has no [package] section")]
    NotAPackage { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct Manifest {
    package: Option<ManifestPackage>,
    lib: Option<ManifestLib>,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ManifestLib {
    name: Option<String>,
    #[serde(rename = "crate-type", default)]
    crate_type: Vec<String>,
}

pub(crate) fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the package facts griddle needs out of the manifest at `manifest_path`.
pub fn inspect_manifest(identifier: &str, manifest_path: &Path) -> CoreResult<PackageLocation> {
    inspect(identifier, manifest_path)
        .map_err(|error| CoreError::new(CoreErrorKind::Declaration, error.to_string()))
}

fn inspect(identifier: &str, manifest_path: &Path) -> Result<PackageLocation, ManifestError> {
    let manifest: Manifest = read_manifest(manifest_path)?;

    let package = manifest.package.ok_or_else(|| ManifestError::NotAPackage {
        path: manifest_path.to_path_buf(),
    })?;
    let lib = manifest.lib;

    let lib_name = lib
        .as_ref()
        .and_then(|lib| lib.name.clone())
        .unwrap_or_else(|| package.name.replace('-', "_"));
    let is_entry_point = lib
        .as_ref()
        .is_some_and(|lib| lib.crate_type.iter().any(|kind| kind == "cdylib"));

    let root_dir = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    Ok(PackageLocation {
        identifier: identifier.to_string(),
        root_dir,
        manifest_path: manifest_path.to_path_buf(),
        package_name: package.name,
        lib_name,
        is_entry_point,
    })
}

/// Maps package identifiers from declarations to packages on disk.
///
/// An identifier is first tried as a path (relative to the working directory), then as a
/// directory under each search root, in order.
#[derive(Clone, Debug)]
pub struct PackageResolver {
    working_dir: PathBuf,
    search_roots: Vec<PathBuf>,
}

impl PackageResolver {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            search_roots: Vec::new(),
        }
    }

    /// Uses the roots listed in the `var` environment variable (an OS path list).
    pub fn from_env(working_dir: impl Into<PathBuf>, var: &str) -> Self {
        let roots = std::env::var_os(var).unwrap_or_default();
        Self::new(working_dir).search_path(&roots)
    }

    pub fn search_path(mut self, paths: &OsStr) -> Self {
        self.search_roots.extend(
            std::env::split_paths(paths).filter(|root| !root.as_os_str().is_empty()),
        );
        self
    }

    pub fn search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_roots.push(root.into());
        self
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    pub fn resolve(&self, identifier: &str) -> CoreResult<PackageLocation> {
        if identifier.trim().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::Declaration,
                "package identifier must not be empty",
            ));
        }

        let direct = self.working_dir.join(identifier);
        let mut candidates = vec![direct];
        candidates.extend(self.search_roots.iter().map(|root| root.join(identifier)));

        for candidate in &candidates {
            if let Some(manifest) = manifest_in(candidate) {
                tracing::debug!(
                    package = identifier,
                    manifest = %manifest.display(),
                    "resolved task package"
                );
                return inspect_manifest(identifier, &manifest);
            }
        }

        let searched = candidates
            .iter()
            .map(|candidate| candidate.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(CoreError::new(
            CoreErrorKind::Declaration,
            format!("package `{identifier}` not found (searched {searched})"),
        ))
    }
}

fn manifest_in(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() && candidate.file_name().is_some_and(|name| name == MANIFEST_FILE) {
        return Some(candidate.to_path_buf());
    }
    let manifest = candidate.join(MANIFEST_FILE);
    manifest.is_file().then_some(manifest)
}
