//! Pack manifest parsing for qlpack.yml / codeql-pack.yml files
//!
//! Only the identity fields are interpreted. The full YAML mapping is kept so
//! rewriting a manifest preserves every key this crate does not know about.

use super::PackageName;
use crate::error::{BundleError, BundleResult};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest file names, in lookup order
pub const MANIFEST_FILE_NAMES: [&str; 2] = ["qlpack.yml", "codeql-pack.yml"];

/// Lock file written by `codeql pack install`
pub const LOCK_FILE_NAME: &str = "codeql-pack.lock.yml";

/// Parsed pack manifest
#[derive(Debug, Clone, PartialEq)]
pub struct PackManifest {
    pub name: PackageName,
    pub version: String,
    pub library: bool,
    pub dependencies: BTreeMap<PackageName, String>,
    raw: Mapping,
}

/// Why a manifest could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestError {
    /// The `name` field, if it could still be read
    pub declared_name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    library: bool,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, Value>>,
}

impl PackManifest {
    /// Locate the manifest file of a pack directory
    pub fn find_in(dir: &Path) -> Option<PathBuf> {
        MANIFEST_FILE_NAMES
            .iter()
            .map(|file_name| dir.join(file_name))
            .find(|path| path.is_file())
    }

    /// Whether a file name is one of the recognized manifest names
    pub fn is_manifest_file_name(file_name: &str) -> bool {
        MANIFEST_FILE_NAMES.contains(&file_name)
    }

    /// Load a manifest from disk
    pub fn from_file(path: &Path) -> BundleResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BundleError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml(&content).map_err(|e| BundleError::Manifest {
            path: path.to_path_buf(),
            reason: e.reason,
        })
    }

    /// Parse a manifest from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ManifestError {
            declared_name: None,
            reason: e.to_string(),
        })?;
        let raw = match value {
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ManifestError {
                    declared_name: None,
                    reason: "manifest is not a YAML mapping".to_string(),
                })
            }
        };
        let declared_name = raw
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let fail = |reason: String| ManifestError {
            declared_name: declared_name.clone(),
            reason,
        };

        let parsed: RawManifest = serde_yaml::from_value(Value::Mapping(raw.clone()))
            .map_err(|e| fail(e.to_string()))?;
        let name: PackageName = parsed.name.parse().map_err(|e| fail(format!("{}", e)))?;

        let mut dependencies = BTreeMap::new();
        for (dep_name, dep_version) in parsed.dependencies.unwrap_or_default() {
            let dep: PackageName = dep_name
                .parse()
                .map_err(|e| fail(format!("dependency {}", e)))?;
            dependencies.insert(dep, scalar_to_string(&dep_version));
        }

        let version = parsed
            .version
            .as_ref()
            .map(scalar_to_string)
            .unwrap_or_else(|| "0.0.0".to_string());
        // The version names a directory under `qlpacks/<scope>/<name>`
        if !is_path_safe_version(&version) {
            return Err(fail(format!("invalid version '{}'", version)));
        }

        Ok(PackManifest {
            name,
            version,
            library: parsed.library,
            dependencies,
            raw,
        })
    }

    /// Add or replace a dependency edge
    pub fn set_dependency(&mut self, name: &PackageName, version: &str) {
        self.dependencies.insert(name.clone(), version.to_string());
        self.update_dependencies(|deps| {
            deps.insert(Value::String(name.to_string()), Value::String(version.to_string()));
        });
    }

    /// Remove a dependency edge, returning whether it was present
    pub fn remove_dependency(&mut self, name: &PackageName) -> bool {
        let removed = self.dependencies.remove(name).is_some();
        self.update_dependencies(|deps| {
            deps.remove(Value::String(name.to_string()));
        });
        removed
    }

    fn update_dependencies(&mut self, update: impl FnOnce(&mut Mapping)) {
        if !matches!(self.raw.get("dependencies"), Some(Value::Mapping(_))) {
            self.raw.insert(
                Value::String("dependencies".to_string()),
                Value::Mapping(Mapping::new()),
            );
        }
        if let Some(Value::Mapping(deps)) = self.raw.get_mut("dependencies") {
            update(deps);
        }
    }

    /// Serialize the manifest, including keys this crate does not interpret
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.raw)
    }

    /// Write the manifest back to disk
    pub fn write_to_file(&self, path: &Path) -> BundleResult<()> {
        let content = self.to_yaml().map_err(|e| BundleError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, content)
            .map_err(|e| BundleError::io(format!("writing {}", path.display()), e))
    }
}

fn is_path_safe_version(version: &str) -> bool {
    !version.is_empty()
        && version != "."
        && !version.contains(['/', '\\'])
        && !version.contains("..")
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "*".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
