//! Base bundle handling
//!
//! This module provides functionality for:
//! - Materializing a base bundle into a disposable scratch directory
//! - Indexing the packs inside the bundle
//! - Detecting which platforms the bundle carries tooling for
//! - Writing the modified bundle back into archives

pub mod archive;
pub mod platform;

pub use archive::{ArchiveAssembler, ArchiveCodec, TarGzCodec, DEFAULT_ARCHIVE_NAME};
pub use platform::{BundlePlatform, PlatformFilter};

use crate::error::{BundleError, BundleResult};
use crate::fsutil;
use crate::package::{scan_directory, PackageCatalog};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Name of the bundle root directory inside archives and the scratch tree
pub const BUNDLE_ROOT_NAME: &str = "codeql";

/// File name of the default Code Scanning configuration inside a bundle
pub const CODE_SCANNING_CONFIG_NAME: &str = "default-codeql-config.yml";

/// A temporary directory removed on drop unless it is kept for debugging
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl ScratchDir {
    pub fn new(keep: bool) -> BundleResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("codeql-bundle-")
            .tempdir()
            .map_err(|e| BundleError::io("creating scratch directory", e))?;
        let path = dir.path().to_path_buf();
        debug!("Created scratch directory {}", path.display());
        Ok(ScratchDir {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if self.keep {
                let path = dir.keep();
                info!("Keeping scratch directory {}", path.display());
            } else {
                debug!("Removing scratch directory {}", self.path.display());
                if let Err(e) = dir.close() {
                    tracing::warn!("Failed to remove scratch directory {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

/// An extracted, writable base bundle and the packs it contains
#[derive(Debug)]
pub struct BundleIndex {
    root: PathBuf,
    catalog: PackageCatalog,
    platforms: BTreeSet<BundlePlatform>,
    // Dropped last so the tree outlives everything pointing into it.
    scratch: ScratchDir,
}

impl BundleIndex {
    /// Materialize `bundle_path` (a `.tar.gz` archive or an extracted bundle
    /// directory) into a fresh scratch directory and index it
    pub fn open(bundle_path: &Path, codec: &dyn ArchiveCodec, keep_scratch: bool) -> BundleResult<Self> {
        let scratch = ScratchDir::new(keep_scratch)?;
        let root = scratch.path().join(BUNDLE_ROOT_NAME);

        if bundle_path.is_dir() {
            let source = if bundle_path.join(BUNDLE_ROOT_NAME).is_dir() {
                bundle_path.join(BUNDLE_ROOT_NAME)
            } else {
                bundle_path.to_path_buf()
            };
            info!("Copying bundle {} to {}", source.display(), root.display());
            fsutil::copy_tree(&source, &root, |_| false)?;
        } else if bundle_path.is_file() {
            info!("Unpacking bundle {} to {}", bundle_path.display(), scratch.path().display());
            codec.extract(bundle_path, scratch.path())?;
        } else {
            return Err(BundleError::MalformedBundle {
                path: bundle_path.to_path_buf(),
                reason: "path is neither a bundle archive nor a bundle directory".to_string(),
            });
        }

        Self::index(scratch, root, bundle_path)
    }

    fn index(scratch: ScratchDir, root: PathBuf, origin: &Path) -> BundleResult<Self> {
        for required in ["tools", "qlpacks"] {
            if !root.join(required).is_dir() {
                return Err(BundleError::MalformedBundle {
                    path: origin.to_path_buf(),
                    reason: format!("missing '{}/{}' directory", BUNDLE_ROOT_NAME, required),
                });
            }
        }

        let platforms: BTreeSet<BundlePlatform> = BundlePlatform::ALL
            .into_iter()
            .filter(|platform| root.join("tools").join(platform.dir_name()).is_dir())
            .collect();
        debug!(
            "Bundle carries tooling for: {}",
            platforms
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let catalog = scan_directory(&root.join("qlpacks"), None)?;
        info!("Found {} pack(s) in the bundle", catalog.len());

        Ok(BundleIndex {
            root,
            catalog,
            platforms,
            scratch,
        })
    }

    /// The bundle root inside the scratch tree (`<scratch>/codeql`)
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn qlpacks_dir(&self) -> PathBuf {
        self.root.join("qlpacks")
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    pub fn platforms(&self) -> &BTreeSet<BundlePlatform> {
        &self.platforms
    }

    pub fn supports_platform(&self, platform: BundlePlatform) -> bool {
        self.platforms.contains(&platform)
    }

    /// Fail with the unsupported platforms, before any work is done
    pub fn check_platforms(&self, requested: &[BundlePlatform]) -> BundleResult<()> {
        ArchiveAssembler::check_platforms(&self.platforms, requested)
    }

    /// The bundle's own CLI launcher for the running platform
    pub fn codeql_launcher(&self) -> PathBuf {
        let launcher = BundlePlatform::current()
            .map(BundlePlatform::launcher)
            .unwrap_or("codeql");
        self.root.join(launcher)
    }

    /// Install a Code Scanning configuration as the bundle default
    pub fn add_code_scanning_config(&self, config: &Path) -> BundleResult<PathBuf> {
        let destination = self.root.join(CODE_SCANNING_CONFIG_NAME);
        fs::copy(config, &destination).map_err(|e| {
            BundleError::io(
                format!("copying {} to {}", config.display(), destination.display()),
                e,
            )
        })?;
        info!("Added Code Scanning configuration {}", config.display());
        Ok(destination)
    }
}
