//! Scoped pack names (`scope/name`)

use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

static NAME_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("pack name pattern is valid")
});

/// A two-part pack identifier such as `codeql/cpp-all`.
///
/// Ordering is by scope, then by name, and is used as the deterministic
/// tie-break wherever packs are scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName {
    scope: String,
    name: String,
}

/// Reasons a string is not a valid pack name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackageNameError {
    #[error("pack name '{0}' has no scope (expected 'scope/name')")]
    MissingScope(String),

    #[error("pack name '{0}' contains characters outside [A-Za-z0-9_-]")]
    InvalidCharacters(String),
}

impl PackageName {
    pub fn new(scope: &str, name: &str) -> Result<Self, PackageNameError> {
        let full = format!("{}/{}", scope, name);
        if !NAME_PART.is_match(scope) || !NAME_PART.is_match(name) {
            return Err(PackageNameError::InvalidCharacters(full));
        }
        Ok(PackageName {
            scope: scope.to_string(),
            name: name.to_string(),
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the customization module, relative to the pack root:
    /// `<scope_>/<name_>` with every `-` replaced by `_`.
    pub fn module_dir(&self) -> PathBuf {
        PathBuf::from(transliterate(&self.scope)).join(transliterate(&self.name))
    }

    /// Path of the customization module relative to the pack root
    pub fn customizations_module_path(&self) -> PathBuf {
        self.module_dir().join("Customizations.qll")
    }

    /// QL module prefix, e.g. `foo.cpp_customizations`
    pub fn module_name(&self) -> String {
        format!("{}.{}", transliterate(&self.scope), transliterate(&self.name))
    }
}

fn transliterate(part: &str) -> String {
    part.replace('-', "_")
}

impl FromStr for PackageName {
    type Err = PackageNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((scope, name)) => PackageName::new(scope, name),
            None => Err(PackageNameError::MissingScope(s.to_string())),
        }
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}
