//! The compiler seam and its CodeQL CLI implementation

use crate::error::{BundleError, BundleResult};
use crate::fsutil;
use crate::package::PackageName;
use semver::{BuildMetadata, Version};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

/// One pack to compile in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub name: PackageName,
    /// Pack root inside the scratch tree
    pub root: PathBuf,
    pub library: bool,
    /// Directory holding every pack the compiler may resolve against
    pub search_path: PathBuf,
}

/// Compiles packs inside the scratch tree
pub trait PackCompiler: Send + Sync {
    /// Compile the pack described by `request`; the error string is the
    /// compiler's own diagnostic output
    fn compile(&self, request: &CompileRequest) -> Result<(), String>;
}

/// First CLI release able to write `.qlx` precompiled queries
pub const QLX_MIN_VERSION: Version = Version::new(2, 11, 4);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    version: String,
    #[serde(default)]
    unpacked_location: Option<PathBuf>,
}

/// Runs the bundle's own `codeql` launcher
#[derive(Debug, Clone)]
pub struct CodeqlCli {
    launcher: PathBuf,
    version: Version,
    threads: Option<usize>,
}

impl CodeqlCli {
    /// Ask `launcher` for its version
    pub fn new(launcher: &Path, threads: Option<usize>) -> BundleResult<Self> {
        let output = Command::new(launcher)
            .args(["version", "--format=json"])
            .output()
            .map_err(|e| BundleError::io(format!("running {}", launcher.display()), e))?;
        if !output.status.success() {
            return Err(BundleError::MalformedBundle {
                path: launcher.to_path_buf(),
                reason: format!("'codeql version' failed: {}", stderr_of(&output)),
            });
        }

        let info: VersionInfo = serde_json::from_slice(&output.stdout).map_err(|e| BundleError::MalformedBundle {
            path: launcher.to_path_buf(),
            reason: format!("unreadable version information: {}", e),
        })?;
        let version = parse_version(&info.version).ok_or_else(|| BundleError::MalformedBundle {
            path: launcher.to_path_buf(),
            reason: format!("unrecognized CLI version '{}'", info.version),
        })?;

        info!("Using CodeQL CLI {} at {}", version, launcher.display());
        if let Some(location) = &info.unpacked_location {
            debug!("CodeQL CLI unpacked at {}", location.display());
        }

        Ok(CodeqlCli {
            launcher: launcher.to_path_buf(),
            version,
            threads,
        })
    }

    /// A CLI whose version is already known
    pub fn with_version(launcher: &Path, version: Version, threads: Option<usize>) -> Self {
        CodeqlCli {
            launcher: launcher.to_path_buf(),
            version,
            threads,
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn supports_qlx(&self) -> bool {
        self.version >= QLX_MIN_VERSION
    }

    /// Arguments compiling `request` from the pack sources at `source`.
    ///
    /// Library packs are checked in place with `query compile --check-only`.
    /// Query packs are recreated into the search path with `pack create`,
    /// which also writes their lock file and bundled dependencies.
    pub fn compile_args(&self, request: &CompileRequest, source: &Path) -> Vec<String> {
        let search_path = request.search_path.display();
        let threads = format!("--threads={}", self.threads.unwrap_or(0));
        let mut args: Vec<String> = if request.library {
            vec![
                "query".to_string(),
                "compile".to_string(),
                "--check-only".to_string(),
                threads,
            ]
        } else {
            let mut create = vec![
                "pack".to_string(),
                "create".to_string(),
                "--format=json".to_string(),
                format!("--output={}", search_path),
                threads,
            ];
            if self.supports_qlx() {
                create.push("--qlx".to_string());
            }
            create
        };
        args.push(format!("--additional-packs={}", search_path));
        args.push("--".to_string());
        args.push(source.display().to_string());
        args
    }

    fn run(&self, args: &[String]) -> Result<(), String> {
        debug!("Running {} {}", self.launcher.display(), args.join(" "));
        let output = Command::new(&self.launcher)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run {}: {}", self.launcher.display(), e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(stderr_of(&output))
        }
    }
}

impl PackCompiler for CodeqlCli {
    fn compile(&self, request: &CompileRequest) -> Result<(), String> {
        if request.library {
            return self.run(&self.compile_args(request, &request.root));
        }

        // `pack create` writes to <search path>/<scope>/<name>/<version>, so
        // the sources are moved out of the way first.
        let staging = tempfile::Builder::new()
            .prefix("codeql-bundle-pack-")
            .tempdir()
            .map_err(|e| format!("failed to create a staging directory: {}", e))?;
        let source = staging.path().join(request.name.name());
        fsutil::copy_tree(&request.root, &source, |_| false).map_err(|e| e.to_string())?;
        debug!(
            "Removing {} in preparation for recreating {}",
            request.root.display(),
            request.name
        );
        fsutil::remove_dir_if_exists(&request.root).map_err(|e| e.to_string())?;
        self.run(&self.compile_args(request, &source))
    }
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    }
}

/// Parse CLI versions, which may lack a patch component or carry a suffix
fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(mut version) = Version::parse(raw) {
        // Build metadata does not take part in feature gates
        version.build = BuildMetadata::EMPTY;
        return Some(version);
    }
    let core = raw.split(['+', '-']).next()?;
    let mut parts = core.split('.').map(|part| part.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some(Version::new(major, minor, patch))
}
