//! Listing extracted artifact content.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::types::ContentEntry;

/// Read the top-level regular files of `dir`, sorted by file name.
///
/// Sorting keeps the produced resources stable across filesystems.
/// Directories, symlinks and other entry kinds are skipped.
pub fn read_entries(dir: &Path) -> io::Result<Vec<ContentEntry>> {
    let mut listing = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    listing.sort_by_key(|e| e.file_name());

    let mut entries = Vec::with_capacity(listing.len());
    for item in listing {
        let name = item.file_name().to_string_lossy().into_owned();
        if !item.file_type()?.is_file() {
            debug!(entry = %name, "skipping non-file artifact entry");
            continue;
        }
        let payload = fs::read(item.path())?;
        entries.push(ContentEntry::new(name, payload));
    }

    Ok(entries)
}
