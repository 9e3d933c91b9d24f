//! Bundler settings loaded from codeql-bundle.toml, the environment and flags

use crate::error::{BundleError, BundleResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file looked up in the workspace root when `--config` is absent
pub const SETTINGS_FILE_NAME: &str = "codeql-bundle.toml";

pub const JOBS_ENV: &str = "CODEQL_BUNDLE_JOBS";
pub const KEEP_SCRATCH_ENV: &str = "CODEQL_BUNDLE_KEEP_SCRATCH";

/// Tunables of a bundling run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundlerSettings {
    /// Worker threads for the build plan
    pub jobs: usize,
    /// Keep the scratch directory after the run
    pub keep_scratch: bool,
    /// Compile packs after modifying them
    pub precompile: bool,
    /// Value passed as `--threads` to the compiler; 0 lets it pick
    pub compiler_threads: Option<usize>,
    /// CodeQL launcher to use instead of the bundle's own
    pub codeql: Option<PathBuf>,
}

impl Default for BundlerSettings {
    fn default() -> Self {
        BundlerSettings {
            jobs: num_cpus::get(),
            keep_scratch: false,
            precompile: true,
            compiler_threads: None,
            codeql: None,
        }
    }
}

impl BundlerSettings {
    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> BundleResult<Self> {
        let settings: BundlerSettings =
            toml::from_str(content).map_err(|e| BundleError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> BundleResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BundleError::io(format!("reading {}", path.display()), e))?;
        Self::from_toml(&content).map_err(|e| match e {
            BundleError::Config(reason) => BundleError::Config(format!("{}: {}", path.display(), reason)),
            other => other,
        })
    }

    /// Read the explicit settings file, else `<workspace>/codeql-bundle.toml`
    /// if present, else the defaults
    pub fn discover(explicit: Option<&Path>, workspace: &Path) -> BundleResult<Self> {
        if let Some(path) = explicit {
            debug!("Loading settings from {}", path.display());
            return Self::from_file(path);
        }
        let candidate = workspace.join(SETTINGS_FILE_NAME);
        if candidate.is_file() {
            debug!("Loading settings from {}", candidate.display());
            Self::from_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> BundleResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(jobs) = lookup(JOBS_ENV) {
            self.jobs = jobs
                .trim()
                .parse()
                .map_err(|_| BundleError::Config(format!("{} must be a positive integer, got '{}'", JOBS_ENV, jobs)))?;
        }
        if let Some(keep) = lookup(KEEP_SCRATCH_ENV) {
            self.keep_scratch = parse_flag(&keep)
                .ok_or_else(|| BundleError::Config(format!("{} must be a boolean, got '{}'", KEEP_SCRATCH_ENV, keep)))?;
        }
        self.validate()
    }

    /// Apply overrides from the process environment
    pub fn apply_process_env(&mut self) -> BundleResult<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> BundleResult<()> {
        if self.jobs == 0 {
            return Err(BundleError::Config("jobs must be at least 1".to_string()));
        }
        if let Some(codeql) = &self.codeql {
            if codeql.as_os_str().is_empty() {
                return Err(BundleError::Config("codeql launcher path is empty".to_string()));
            }
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
