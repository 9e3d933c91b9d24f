//! Bundle archive extraction and re-assembly

use super::platform::{BundlePlatform, PlatformFilter};
use crate::error::{BundleError, BundleResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default file name of a platform-agnostic bundle
pub const DEFAULT_ARCHIVE_NAME: &str = "codeql-bundle.tar.gz";

const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Reads and writes bundle archives
pub trait ArchiveCodec: Send + Sync {
    /// Unpack `archive` into the existing directory `destination`
    fn extract(&self, archive: &Path, destination: &Path) -> BundleResult<()>;

    /// Pack the directory `source` into `archive`, rooted at the directory's
    /// own name and keeping only entries accepted by `filter`
    fn create(&self, source: &Path, filter: &PlatformFilter, archive: &Path) -> BundleResult<()>;
}

/// gzip-compressed tarballs, the format of released CodeQL bundles.
///
/// Archives are written deterministically: entries are sorted by name, owners
/// and timestamps are normalized, and the gzip header carries no mtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzCodec;

fn archive_error(path: &Path, e: impl std::fmt::Display) -> BundleError {
    BundleError::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl ArchiveCodec for TarGzCodec {
    fn extract(&self, archive: &Path, destination: &Path) -> BundleResult<()> {
        debug!("Unpacking {} to {}", archive.display(), destination.display());
        let file = File::open(archive)
            .map_err(|e| BundleError::io(format!("opening {}", archive.display()), e))?;
        let mut reader = tar::Archive::new(GzDecoder::new(file));
        reader.set_preserve_permissions(true);
        reader.set_overwrite(true);
        reader
            .unpack(destination)
            .map_err(|e| archive_error(archive, e))
    }

    fn create(&self, source: &Path, filter: &PlatformFilter, archive: &Path) -> BundleResult<()> {
        let prefix = source
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| archive_error(archive, "source directory has no name"))?;

        let file = File::create(archive)
            .map_err(|e| BundleError::io(format!("creating {}", archive.display()), e))?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        let walker = WalkDir::new(source)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
                filter.includes(relative)
            });

        for entry in walker {
            let entry = entry.map_err(|e| archive_error(archive, e))?;
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let name = prefix.join(relative);
            let appended = if entry.file_type().is_dir() {
                builder.append_dir(&name, entry.path())
            } else {
                builder.append_path_with_name(entry.path(), &name)
            };
            appended.map_err(|e| archive_error(archive, e))?;
        }

        let encoder = builder.into_inner().map_err(|e| archive_error(archive, e))?;
        encoder.finish().map_err(|e| archive_error(archive, e))?;
        Ok(())
    }
}

/// Writes the finished bundle tree into one archive per requested platform
pub struct ArchiveAssembler<'a> {
    codec: &'a dyn ArchiveCodec,
}

impl<'a> ArchiveAssembler<'a> {
    pub fn new(codec: &'a dyn ArchiveCodec) -> Self {
        ArchiveAssembler { codec }
    }

    /// Fail if any requested platform is not carried by the bundle
    pub fn check_platforms(
        available: &BTreeSet<BundlePlatform>,
        requested: &[BundlePlatform],
    ) -> BundleResult<()> {
        let unsupported: Vec<BundlePlatform> = requested
            .iter()
            .filter(|platform| !available.contains(platform))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(BundleError::UnsupportedPlatform {
                requested: unsupported,
                available: available.iter().copied().collect(),
            })
        }
    }

    /// Archive paths that `assemble` would write
    pub fn output_paths(output: &Path, platforms: &[BundlePlatform]) -> BundleResult<Vec<(Option<BundlePlatform>, PathBuf)>> {
        let names_archive = output
            .to_str()
            .is_some_and(|s| s.ends_with(ARCHIVE_EXTENSION))
            && !output.is_dir();

        match platforms {
            [] if names_archive => Ok(vec![(None, output.to_path_buf())]),
            [] => Ok(vec![(None, output.join(DEFAULT_ARCHIVE_NAME))]),
            [platform] if names_archive => Ok(vec![(Some(*platform), output.to_path_buf())]),
            _ if names_archive => Err(BundleError::Config(format!(
                "output {} names a single archive, but {} platform bundles were requested; use a directory",
                output.display(),
                platforms.len()
            ))),
            _ => Ok(platforms
                .iter()
                .map(|platform| {
                    (
                        Some(*platform),
                        output.join(format!("codeql-bundle-{}{}", platform, ARCHIVE_EXTENSION)),
                    )
                })
                .collect()),
        }
    }

    /// Pack `bundle_root` into archives under `output`.
    ///
    /// Nothing is written when a platform is unsupported. If writing any
    /// archive fails, archives already written by this call are removed.
    pub fn assemble(
        &self,
        bundle_root: &Path,
        available: &BTreeSet<BundlePlatform>,
        requested: &[BundlePlatform],
        output: &Path,
    ) -> BundleResult<Vec<PathBuf>> {
        let platforms: Vec<BundlePlatform> = requested
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self::check_platforms(available, &platforms)?;
        let targets = Self::output_paths(output, &platforms)?;

        let mut written = Vec::new();
        for (platform, path) in targets {
            if let Err(e) = self.write_one(bundle_root, platform, &path) {
                for partial in written.iter().chain(std::iter::once(&path)) {
                    if let Err(cleanup) = fs::remove_file(partial) {
                        if cleanup.kind() != std::io::ErrorKind::NotFound {
                            warn!("Failed to remove {}: {}", partial.display(), cleanup);
                        }
                    }
                }
                return Err(e);
            }
            written.push(path);
        }
        Ok(written)
    }

    fn write_one(&self, bundle_root: &Path, platform: Option<BundlePlatform>, path: &Path) -> BundleResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| BundleError::io(format!("creating {}", parent.display()), e))?;
        }
        let filter = match platform {
            Some(platform) => {
                info!("Bundling {} bundle at {}", platform, path.display());
                PlatformFilter::for_platform(platform)
            }
            None => {
                info!("Bundling custom bundle at {}", path.display());
                PlatformFilter::all()
            }
        };
        self.codec.create(bundle_root, &filter, path)
    }
}
