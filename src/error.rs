//! Error types for the bundle builder
//!
//! Every variant is terminal for an invocation. Validation errors are raised
//! before the scratch tree is mutated; build and archive errors abort the
//! running plan.

use crate::package::PackageName;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all bundle operations
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Requested pack(s) not found in workspace: {}", join_names(.names))]
    UnresolvedTarget {
        names: Vec<PackageName>,
        /// Manifest problems recorded for directories declaring a requested name
        details: Vec<String>,
    },

    #[error("Malformed bundle at {path}: {reason}")]
    MalformedBundle { path: PathBuf, reason: String },

    #[error("Could not resolve dependency {target} of pack {source_pack}")]
    UnresolvedDependency {
        source_pack: PackageName,
        target: PackageName,
    },

    #[error("Invalid customization pack {package}: {reason} (found {edge_count} dependencies)")]
    InvalidCustomizationPackage {
        package: PackageName,
        edge_count: usize,
        reason: String,
    },

    #[error("Cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<PackageName> },

    #[error("Failed to {stage} pack {package}: {message}")]
    CompilationFailure {
        package: PackageName,
        stage: BuildStage,
        message: String,
    },

    #[error("The bundle supports the platform(s) {}, but not {}", join_display(.available), join_display(.requested))]
    UnsupportedPlatform {
        requested: Vec<crate::bundle::BundlePlatform>,
        available: Vec<crate::bundle::BundlePlatform>,
    },

    #[error("Invalid pack manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Unable to customize {package}: {reason}")]
    Injection { package: PackageName, reason: String },

    #[error("Archive error for {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Stage of the build orchestrator a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Install,
    Inject,
    Prepare,
    Compile,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            BuildStage::Install => "install",
            BuildStage::Inject => "inject customizations into",
            BuildStage::Prepare => "prepare",
            BuildStage::Compile => "compile",
        };
        write!(f, "{}", stage)
    }
}

/// Result type alias for bundle operations
pub type BundleResult<T> = Result<T, BundleError>;

impl BundleError {
    /// Stable name of the error kind, written to diagnostic output by the CLI
    pub fn kind(&self) -> &'static str {
        match self {
            BundleError::UnresolvedTarget { .. } => "UnresolvedTargetError",
            BundleError::MalformedBundle { .. } => "MalformedBundleError",
            BundleError::UnresolvedDependency { .. } => "UnresolvedDependencyError",
            BundleError::InvalidCustomizationPackage { .. } => "InvalidCustomizationPackageError",
            BundleError::CyclicDependency { .. } => "CyclicDependencyError",
            BundleError::CompilationFailure { .. } => "CompilationFailure",
            BundleError::UnsupportedPlatform { .. } => "UnsupportedPlatformError",
            BundleError::Manifest { .. } => "ManifestError",
            BundleError::Injection { .. } => "InjectionError",
            BundleError::Archive { .. } => "ArchiveError",
            BundleError::Config(_) => "ConfigError",
            BundleError::Io { .. } => "IoError",
        }
    }

    /// Wrap an I/O error with a short description of what was being done
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BundleError::Io {
            context: context.into(),
            source,
        }
    }
}

fn join_names(names: &[PackageName]) -> String {
    join_display(names)
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_cycle(cycle: &[PackageName]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(|name| name.to_string()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}
