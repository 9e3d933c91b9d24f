//! Filesystem helpers shared by the bundle index and the orchestrator

use crate::error::{BundleError, BundleResult};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copy `source` to `destination`.
///
/// Symbolic links are recreated rather than followed and file permissions are
/// carried over. Entries for which `skip` returns true (given the path
/// relative to `source`) are left out together with their subtrees.
pub fn copy_tree<F>(source: &Path, destination: &Path, skip: F) -> BundleResult<()>
where
    F: Fn(&Path) -> bool,
{
    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            relative.as_os_str().is_empty() || !skip(relative)
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let context = format!("copying {}", source.display());
            match e.into_io_error() {
                Some(io) => BundleError::io(context, io),
                None => BundleError::io(context, std::io::Error::other("filesystem loop")),
            }
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| BundleError::io(format!("creating {}", target.display()), e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| {
                BundleError::io(
                    format!("copying {} to {}", entry.path().display(), target.display()),
                    e,
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> BundleResult<()> {
    let pointee = fs::read_link(link)
        .map_err(|e| BundleError::io(format!("reading link {}", link.display()), e))?;
    std::os::unix::fs::symlink(&pointee, target)
        .map_err(|e| BundleError::io(format!("creating link {}", target.display()), e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> BundleResult<()> {
    fs::copy(link, target)
        .map(|_| ())
        .map_err(|e| BundleError::io(format!("copying {}", link.display()), e))
}

/// Remove a directory tree if it exists
pub fn remove_dir_if_exists(path: &Path) -> BundleResult<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .map_err(|e| BundleError::io(format!("removing {}", path.display()), e))?;
    }
    Ok(())
}

/// Remove a file if it exists
pub fn remove_file_if_exists(path: &Path) -> BundleResult<()> {
    if path.is_file() {
        fs::remove_file(path)
            .map_err(|e| BundleError::io(format!("removing {}", path.display()), e))?;
    }
    Ok(())
}
