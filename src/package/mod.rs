//! Pack metadata: names, manifests, descriptors and discovery
//!
//! This module provides functionality for:
//! - Scoped pack names and the customization module path derived from them
//! - qlpack.yml / codeql-pack.yml parsing and rewriting
//! - Discovering packs in a workspace or an extracted bundle

pub mod name;
pub mod manifest;
pub mod descriptor;
pub mod scanner;

pub use name::{PackageName, PackageNameError};
pub use manifest::{ManifestError, PackManifest, LOCK_FILE_NAME, MANIFEST_FILE_NAMES};
pub use descriptor::PackageDescriptor;
pub use scanner::{
    resolve_workspace_root, scan_directory, PackageCatalog, ScanDiagnostic, WorkspaceScanner,
    WORKSPACE_FILE_NAME,
};
