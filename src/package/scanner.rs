//! Pack discovery in workspaces and extracted bundles

use super::{PackManifest, PackageDescriptor, PackageName};
use crate::error::{BundleError, BundleResult};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Workspace descriptor file recognized at the workspace root
pub const WORKSPACE_FILE_NAME: &str = "codeql-workspace.yml";

/// A directory that looked like a pack but was left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDiagnostic {
    pub path: PathBuf,
    /// Name found in the manifest, if any
    pub declared_name: Option<String>,
    pub message: String,
}

/// Packs found under one root, keyed by name
#[derive(Debug, Clone, Default)]
pub struct PackageCatalog {
    pub root: PathBuf,
    pub packages: BTreeMap<PackageName, PackageDescriptor>,
    pub diagnostics: Vec<ScanDiagnostic>,
}

impl PackageCatalog {
    pub fn get(&self, name: &PackageName) -> Option<&PackageDescriptor> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &PackageName) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.packages.keys()
    }

    /// Fail unless every requested pack was found
    pub fn require(&self, requested: &[PackageName]) -> BundleResult<()> {
        let missing: Vec<PackageName> = requested
            .iter()
            .filter(|name| !self.contains(name))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let details = self
            .diagnostics
            .iter()
            .filter(|diagnostic| {
                diagnostic
                    .declared_name
                    .as_deref()
                    .is_some_and(|declared| missing.iter().any(|m| m.to_string() == declared))
            })
            .map(|diagnostic| format!("{}: {}", diagnostic.path.display(), diagnostic.message))
            .collect();
        Err(BundleError::UnresolvedTarget {
            names: missing,
            details,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceFile {
    #[serde(default)]
    provide: Vec<String>,
}

/// Scanner over a user workspace
#[derive(Debug)]
pub struct WorkspaceScanner {
    root: PathBuf,
    provide: Option<GlobSet>,
}

impl WorkspaceScanner {
    /// Create a scanner for a workspace directory or a `codeql-workspace.yml` path
    pub fn new<P: AsRef<Path>>(workspace: P) -> BundleResult<Self> {
        let root = resolve_workspace_root(workspace.as_ref());
        let workspace_file = root.join(WORKSPACE_FILE_NAME);
        let provide = if workspace_file.is_file() {
            load_provide_globs(&workspace_file)?
        } else {
            None
        };
        Ok(WorkspaceScanner { root, provide })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan every pack of the workspace
    pub fn scan(&self) -> BundleResult<PackageCatalog> {
        scan_directory(&self.root, self.provide.as_ref())
    }

    /// Scan and require that every requested pack was found
    pub fn scan_for(&self, requested: &[PackageName]) -> BundleResult<PackageCatalog> {
        let catalog = self.scan()?;
        catalog.require(requested)?;
        Ok(catalog)
    }
}

/// A path naming the workspace file itself stands for its directory
pub fn resolve_workspace_root(path: &Path) -> PathBuf {
    let is_workspace_file = path
        .file_name()
        .is_some_and(|name| name == WORKSPACE_FILE_NAME);
    if is_workspace_file {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        path.to_path_buf()
    }
}

fn load_provide_globs(workspace_file: &Path) -> BundleResult<Option<GlobSet>> {
    let content = fs::read_to_string(workspace_file)
        .map_err(|e| BundleError::io(format!("reading {}", workspace_file.display()), e))?;
    let parsed: WorkspaceFile = serde_yaml::from_str::<Option<WorkspaceFile>>(&content)
        .map_err(|e| BundleError::Manifest {
            path: workspace_file.to_path_buf(),
            reason: e.to_string(),
        })?
        .unwrap_or_default();
    if parsed.provide.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in &parsed.provide {
        let glob = GlobBuilder::new(pattern.trim_start_matches("./"))
            .literal_separator(true)
            .build()
            .map_err(|e| BundleError::Manifest {
                path: workspace_file.to_path_buf(),
                reason: format!("invalid provide pattern '{}': {}", pattern, e),
            })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| BundleError::Manifest {
        path: workspace_file.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Some(set))
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with('.')
}

/// Walk `root` and parse every pack manifest below it.
///
/// Hidden directories (including `.codeql` dependency caches) are not
/// descended into. When `provide` is set, only manifests whose path relative
/// to `root` matches are considered.
pub fn scan_directory(root: &Path, provide: Option<&GlobSet>) -> BundleResult<PackageCatalog> {
    if !root.is_dir() {
        return Err(BundleError::io(
            format!("scanning {}", root.display()),
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut catalog = PackageCatalog {
        root: root.to_path_buf(),
        ..PackageCatalog::default()
    };

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !PackManifest::is_manifest_file_name(&file_name) {
            continue;
        }

        let path = entry.path();
        let dir = path.parent().unwrap_or(root);
        if PackManifest::find_in(dir).as_deref() != Some(path) {
            // Both manifest names present; the preferred one is handled instead.
            continue;
        }
        if let Some(globs) = provide {
            let relative = path.strip_prefix(root).unwrap_or(path);
            if !globs.is_match(relative) {
                debug!("Ignoring {} (not provided by the workspace)", path.display());
                continue;
            }
        }

        match PackageDescriptor::load(path) {
            Ok(descriptor) => {
                if let Some(existing) = catalog.packages.get(&descriptor.name) {
                    let message = format!(
                        "duplicate pack {}; keeping {}",
                        descriptor.name,
                        existing.manifest_path.display()
                    );
                    warn!("{}: {}", path.display(), message);
                    catalog.diagnostics.push(ScanDiagnostic {
                        path: path.to_path_buf(),
                        declared_name: Some(descriptor.name.to_string()),
                        message,
                    });
                    continue;
                }
                debug!(
                    "Found pack {}@{} at {}",
                    descriptor.name,
                    descriptor.version,
                    descriptor.root.display()
                );
                catalog.packages.insert(descriptor.name.clone(), descriptor);
            }
            Err(e) => {
                warn!("Excluding {}: {}", path.display(), e.reason);
                catalog.diagnostics.push(ScanDiagnostic {
                    path: path.to_path_buf(),
                    declared_name: e.declared_name,
                    message: e.reason,
                });
            }
        }
    }

    Ok(catalog)
}
