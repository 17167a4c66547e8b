//! Tar extraction with traversal and size limits
//!
//! The archive is scanned twice: the first pass validates every entry and
//! the expanded size, the second writes. A rejected archive leaves `dest`
//! untouched.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tar::{Archive, EntryType};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::security::resolve_entry_path;
use crate::config::SizeLimit;
use crate::error::FetchError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Counts of what an extraction wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UntarSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Extract a tar or tar.gz archive held in memory into `dest`.
pub fn untar(
    data: &[u8],
    dest: &Path,
    max_size: SizeLimit,
    cancel: &CancellationToken,
) -> Result<UntarSummary, FetchError> {
    let expanded = validate_entries(data, dest)?;
    if !max_size.allows(expanded) {
        return Err(FetchError::ExtractionTooLarge {
            limit: max_size.bytes().unwrap_or(u64::MAX),
        });
    }

    let mut summary = UntarSummary::default();
    let mut archive = open(data);
    for entry in archive.entries().map_err(FetchError::Archive)? {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut entry = entry.map_err(FetchError::Archive)?;
        let name = entry.path().map_err(FetchError::Archive)?.into_owned();
        let relative = resolve_entry_path(&name, dest)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                create_dir_all(&target)?;
                summary.directories += 1;
            }
            kind if kind.is_file() => {
                if let Some(parent) = target.parent() {
                    create_dir_all(parent)?;
                }
                let mut file = fs::File::create(&target).map_err(|source| FetchError::Io {
                    path: target.clone(),
                    source,
                })?;
                let written = io::copy(&mut entry, &mut file).map_err(|source| FetchError::Io {
                    path: target.clone(),
                    source,
                })?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Ok(mode) = entry.header().mode() {
                        fs::set_permissions(&target, fs::Permissions::from_mode((mode & 0o777) | 0o600))
                            .map_err(|source| FetchError::Io {
                                path: target.clone(),
                                source,
                            })?;
                    }
                }

                summary.files += 1;
                summary.bytes += written;
            }
            kind => {
                debug!(entry = %name.display(), kind = ?kind, "skipping non-regular archive entry");
            }
        }
    }

    Ok(summary)
}

/// First pass: resolve every entry path and sum the expanded file sizes.
fn validate_entries(data: &[u8], dest: &Path) -> Result<u64, FetchError> {
    let mut archive = open(data);
    let mut expanded: u64 = 0;

    for entry in archive.entries().map_err(FetchError::Archive)? {
        let entry = entry.map_err(FetchError::Archive)?;
        let name = entry.path().map_err(FetchError::Archive)?;
        resolve_entry_path(&name, dest)?;

        if entry.header().entry_type().is_file() {
            expanded = expanded.saturating_add(entry.size());
        }
    }

    Ok(expanded)
}

fn open(data: &[u8]) -> Archive<Box<dyn Read + '_>> {
    let reader: Box<dyn Read + '_> = if data.starts_with(&GZIP_MAGIC) {
        Box::new(flate2::read::GzDecoder::new(data))
    } else {
        Box::new(data)
    };
    Archive::new(reader)
}

fn create_dir_all(path: &Path) -> Result<(), FetchError> {
    fs::create_dir_all(path).map_err(|source| FetchError::Io {
        path: PathBuf::from(path),
        source,
    })
}
