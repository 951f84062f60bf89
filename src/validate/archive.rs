//! Sealed/unsealed consistency of optional-content archives.
//!
//! An archive is either sealed (all content inside the container, nothing
//! loose beside it) or unsealed (container cut down to its stub size, content
//! loose on disk). A sealed container with loose content beside it means an
//! unpack was interrupted or a tool run went wrong.

use crate::games::{is_tracked_content_extension, TOC_FILE};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loose tracked-extension files in the archive's own directory
/// (the table-of-contents file and the archive itself excluded).
pub fn loose_content_beside(archive: &Path) -> std::io::Result<Vec<PathBuf>> {
    let Some(dir) = archive.parent() else {
        return Ok(Vec::new());
    };

    let mut loose = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path == archive {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.eq_ignore_ascii_case(TOC_FILE) {
            continue;
        }
        let tracked = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(is_tracked_content_extension)
            .unwrap_or(false);
        if tracked {
            loose.push(path);
        }
    }
    Ok(loose)
}

/// Whether an archive is in one of its two legal states.
///
/// Stub-sized (unpacked) archives are always considered consistent; the
/// loose content of a fully unpacked package is not verified here.
pub fn is_archive_consistent(archive: &Path, stub_size: u64) -> std::io::Result<bool> {
    let size = std::fs::metadata(archive)?.len();
    if size <= stub_size {
        return Ok(true);
    }

    let loose = loose_content_beside(archive)?;
    if !loose.is_empty() {
        debug!(
            "Sealed archive {} has {} loose files beside it (first: {})",
            archive.display(),
            loose.len(),
            loose[0].display()
        );
    }
    Ok(loose.is_empty())
}
