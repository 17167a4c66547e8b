//! Archive path validation
//!
//! Keeps extracted entries inside the destination directory. Resolution is
//! lexical so it works before anything exists on disk.

use std::path::{Component, Path, PathBuf};

use crate::error::FetchError;

/// Resolve an archive entry name to a path relative to `dest`.
///
/// Returns an empty path for entries naming the archive root (`./`).
///
/// # Errors
///
/// Returns `PathTraversal` if the entry is absolute or its `..` components
/// climb above the archive root, including `a/../../b`.
pub fn resolve_entry_path(entry: &Path, dest: &Path) -> Result<PathBuf, FetchError> {
    let traversal = || FetchError::PathTraversal {
        entry: entry.display().to_string(),
        dest: dest.to_path_buf(),
    };

    let mut resolved = PathBuf::new();
    for component in entry.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }

    Ok(resolved)
}
