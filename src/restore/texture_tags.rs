//! Undoing the texture tool's per-file tracking tag before a mirror restore.
//!
//! The tool appends four bytes to every file it processed without otherwise
//! changing it. Cutting the tag off and copying the backup's timestamp lets
//! the mirror treat the file as identical instead of recopying it.

use crate::games::{is_package_file, TEXTURE_FILE_TAG};
use crate::installation::has_trailing_tag;
use crate::operation::OperationError;
use crate::paths;
use crate::validate::{IntegrityValidator, Verdict};
use filetime::FileTime;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

/// Strip the tag from non-vanilla package files under `root` whose size is
/// exactly a vanilla size plus the tag, then give them the backup copy's timestamp.
///
/// Returns the relative paths of the files that were stripped.
pub fn strip_texture_tags(
    validator: &IntegrityValidator,
    root: &Path,
    backup: &Path,
) -> Result<Vec<String>, OperationError> {
    let mut findings = Vec::new();
    validator.validate_tree(root, |f| findings.push(f.clone()), false, false)?;

    let tag_len = TEXTURE_FILE_TAG.len() as u64;
    let mut stripped = Vec::new();

    let tagged_candidates = findings
        .into_iter()
        .filter(|f| f.verdict == Verdict::Modified && is_package_file(&f.relative_path));
    for finding in tagged_candidates {
        let Some(candidates) = validator.manifest().lookup(&finding.relative_path) else {
            continue;
        };
        let size = match std::fs::metadata(&finding.path) {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };
        if !candidates.iter().any(|c| c.size + tag_len == size) {
            continue;
        }
        if !has_trailing_tag(&finding.path, TEXTURE_FILE_TAG) {
            continue;
        }

        let io_err =
            |e| OperationError::io(format!("Removing texture tag from {}", finding.path.display()), e);
        let file = OpenOptions::new().write(true).open(&finding.path).map_err(io_err)?;
        file.set_len(size - tag_len).map_err(io_err)?;
        drop(file);

        if let Some(original) = paths::resolve_case_insensitive(backup, &finding.relative_path) {
            let meta = std::fs::metadata(&original).map_err(io_err)?;
            filetime::set_file_mtime(&finding.path, FileTime::from_last_modification_time(&meta))
                .map_err(io_err)?;
        }

        debug!("Stripped texture tag from {}", finding.relative_path);
        stripped.push(finding.relative_path);
    }

    info!("Stripped texture tags from {} files", stripped.len());
    Ok(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::Game;
    use crate::testutil::{self, FakeFile};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_strip_makes_file_vanilla_again() {
        let files = vec![
            FakeFile::new("BIOGame/CookedPCConsole/BioD_Nor.pcc", &[3u8; 64]),
            FakeFile::new("BIOGame/CookedPCConsole/Tweaked.pcc", &[4u8; 64]),
        ];
        let validator = IntegrityValidator::new(Game::Me3, Arc::new(testutil::manifest_for(&files)));

        let backup = TempDir::new().unwrap();
        testutil::write_files(backup.path(), &files);
        let live = TempDir::new().unwrap();
        testutil::write_files(live.path(), &files);

        let mut tagged = vec![3u8; 64];
        tagged.extend_from_slice(TEXTURE_FILE_TAG);
        testutil::write(live.path(), "BIOGame/CookedPCConsole/BioD_Nor.pcc", &tagged);
        // Right size, wrong trailer: left alone
        testutil::write(live.path(), "BIOGame/CookedPCConsole/Tweaked.pcc", &[4u8; 68]);

        let stripped = strip_texture_tags(&validator, live.path(), backup.path()).unwrap();
        assert_eq!(stripped, vec!["biogame\\cookedpcconsole\\biod_nor.pcc".to_string()]);

        let rel = "BIOGame/CookedPCConsole/BioD_Nor.pcc";
        assert_eq!(validator.classify(live.path(), rel, true).unwrap(), Verdict::Vanilla);
        let live_meta = std::fs::metadata(live.path().join(rel)).unwrap();
        let backup_meta = std::fs::metadata(backup.path().join(rel)).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&live_meta),
            FileTime::from_last_modification_time(&backup_meta)
        );
        assert_eq!(
            validator
                .classify(live.path(), "BIOGame/CookedPCConsole/Tweaked.pcc", false)
                .unwrap(),
            Verdict::Modified
        );
    }
}
