//! Target platforms a bundle can carry tooling for

use clap::ValueEnum;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// Platform-specific tooling directory names used inside `tools/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum BundlePlatform {
    Linux64,
    Osx64,
    Win64,
}

impl BundlePlatform {
    pub const ALL: [BundlePlatform; 3] = [
        BundlePlatform::Linux64,
        BundlePlatform::Osx64,
        BundlePlatform::Win64,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            BundlePlatform::Linux64 => "linux64",
            BundlePlatform::Osx64 => "osx64",
            BundlePlatform::Win64 => "win64",
        }
    }

    /// Top-level launcher shipped for this platform
    pub fn launcher(self) -> &'static str {
        match self {
            BundlePlatform::Win64 => "codeql.exe",
            BundlePlatform::Linux64 | BundlePlatform::Osx64 => "codeql",
        }
    }

    /// Platform of the machine running this program, if it is one of ours
    pub fn current() -> Option<BundlePlatform> {
        match std::env::consts::OS {
            "linux" => Some(BundlePlatform::Linux64),
            "macos" => Some(BundlePlatform::Osx64),
            "windows" => Some(BundlePlatform::Win64),
            _ => None,
        }
    }

    fn from_dir_name(name: &str) -> Option<BundlePlatform> {
        BundlePlatform::ALL
            .into_iter()
            .find(|platform| platform.dir_name() == name)
    }
}

impl fmt::Display for BundlePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl FromStr for BundlePlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BundlePlatform::from_dir_name(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

/// Selects the bundle entries that belong in an archive for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformFilter {
    platform: Option<BundlePlatform>,
}

impl PlatformFilter {
    /// Keep every entry
    pub fn all() -> Self {
        PlatformFilter { platform: None }
    }

    pub fn for_platform(platform: BundlePlatform) -> Self {
        PlatformFilter {
            platform: Some(platform),
        }
    }

    pub fn platform(&self) -> Option<BundlePlatform> {
        self.platform
    }

    /// Whether a path relative to the bundle root belongs in the archive.
    ///
    /// Drops `tools/<other platform>` subtrees at any depth (the CLI tools and
    /// every extractor) and the launcher of the other OS family.
    pub fn includes(&self, relative: &Path) -> bool {
        let Some(platform) = self.platform else {
            return true;
        };

        let parts: Vec<&str> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();

        if parts.len() == 1 {
            let name = parts[0];
            let is_launcher = BundlePlatform::ALL.iter().any(|p| p.launcher() == name);
            if is_launcher && name != platform.launcher() {
                return false;
            }
        }

        !parts.windows(2).any(|pair| {
            pair[0] == "tools"
                && BundlePlatform::from_dir_name(pair[1]).is_some_and(|other| other != platform)
        })
    }
}
