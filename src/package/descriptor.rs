//! Pack descriptors: identity plus on-disk location

use super::manifest::{ManifestError, PackManifest};
use super::PackageName;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the resolver needs to know about one pack
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub name: PackageName,
    /// Opaque version token, only used for display and directory names
    pub version: String,
    pub library: bool,
    /// Direct dependencies and the version token they were declared with
    pub dependencies: BTreeMap<PackageName, String>,
    /// Directory containing the manifest
    pub root: PathBuf,
    pub manifest_path: PathBuf,
}

impl PackageDescriptor {
    /// Load a descriptor from a manifest file
    pub fn load(manifest_path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(manifest_path).map_err(|e| ManifestError {
            declared_name: None,
            reason: e.to_string(),
        })?;
        let manifest = PackManifest::from_yaml(&content)?;
        Ok(Self::from_manifest(&manifest, manifest_path))
    }

    pub fn from_manifest(manifest: &PackManifest, manifest_path: &Path) -> Self {
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        PackageDescriptor {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            library: manifest.library,
            dependencies: manifest.dependencies.clone(),
            root,
            manifest_path: manifest_path.to_path_buf(),
        }
    }

    /// `<root>/<scope_>/<name_>/Customizations.qll`
    pub fn customizations_module_path(&self) -> PathBuf {
        self.root.join(self.name.customizations_module_path())
    }

    pub fn has_customizations_module(&self) -> bool {
        self.customizations_module_path().is_file()
    }

    /// Location of this pack inside a bundle's `qlpacks` directory
    pub fn bundle_location(&self, qlpacks: &Path) -> PathBuf {
        qlpacks
            .join(self.name.scope())
            .join(self.name.name())
            .join(&self.version)
    }

    /// Same descriptor, relocated to another root directory
    pub fn relocated(&self, root: &Path) -> Self {
        let manifest_file = self
            .manifest_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("qlpack.yml"));
        PackageDescriptor {
            root: root.to_path_buf(),
            manifest_path: root.join(manifest_file),
            ..self.clone()
        }
    }
}
