//! Vanilla integrity checks for game installations.
//!
//! # Classification Flow
//!
//! 1. Paths absent from the manifest (or under the per-user config prefix) are `Untracked`
//! 2. Sealed archives: stub-sized ones are skipped, others get a consistency check
//! 3. Regenerated files (TOC, loader DLL) are always exempt
//! 4. Size must match some candidate
//! 5. With deep hashing, the MD5 must match some candidate
//!
//! Steps 4 and 5 are independent: the size may match one candidate and the
//! hash another.

mod archive;

pub use archive::{is_archive_consistent, loose_content_beside};

use crate::games::{Game, LOADER_DLL, NON_STRICT_ALLOW_LIST, TOC_FILE};
use crate::hash;
use crate::installation::Installation;
use crate::manifest::{Manifest, ManifestError, ManifestStore};
use crate::paths;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Result of checking one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Vanilla,
    Modified,
    /// Not in the manifest; not judged
    Untracked,
    /// Sealed archive with loose content beside it
    ArchiveInconsistent,
}

/// A non-vanilla file found during a tree scan.
#[derive(Debug, Clone)]
pub struct Finding {
    /// Relative path in manifest key form
    pub relative_path: String,
    pub path: PathBuf,
    pub verdict: Verdict,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("cannot validate: {0}")]
    CannotValidate(#[from] ManifestError),

    #[error("failed to inspect {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Checks files against one title's vanilla manifest.
#[derive(Clone)]
pub struct IntegrityValidator {
    game: Game,
    manifest: Arc<Manifest>,
}

impl IntegrityValidator {
    pub fn new(game: Game, manifest: Arc<Manifest>) -> Self {
        Self { game, manifest }
    }

    /// Validator for an installation, using the manifest matching its build variant.
    pub fn for_installation(
        store: &ManifestStore,
        installation: &Installation,
    ) -> Result<Self, ValidationError> {
        let manifest = store.load(installation.game, installation.regional_variant)?;
        Ok(Self::new(installation.game, manifest))
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Classify one file below `root`.
    pub fn classify(
        &self,
        root: &Path,
        relative_path: &str,
        deep_hash: bool,
    ) -> Result<Verdict, ValidationError> {
        let path = paths::resolve_case_insensitive(root, relative_path)
            .unwrap_or_else(|| paths::join_windows_path(root, relative_path));
        self.classify_path(&path, relative_path, deep_hash)
    }

    fn classify_path(
        &self,
        path: &Path,
        relative_path: &str,
        deep_hash: bool,
    ) -> Result<Verdict, ValidationError> {
        let key = paths::normalize_for_lookup(relative_path);
        if key.starts_with(self.game.user_config_prefix()) {
            return Ok(Verdict::Untracked);
        }
        let Some(candidates) = self.manifest.lookup(&key) else {
            return Ok(Verdict::Untracked);
        };

        let io_err = |source| ValidationError::Io {
            path: path.to_path_buf(),
            source,
        };
        let size = std::fs::metadata(path).map_err(io_err)?.len();
        let name = paths::file_name(&key);

        if let Some(sealed) = self.game.sealed_archive() {
            if paths::extension(name) == Some(sealed.extension) {
                if size == sealed.stub_size {
                    debug!("{} is an unpacked stub, skipping", key);
                    return Ok(Verdict::Vanilla);
                }
                if !is_archive_consistent(path, sealed.stub_size).map_err(io_err)? {
                    return Ok(Verdict::ArchiveInconsistent);
                }
                if deep_hash && !hash_matches(path, candidates).map_err(|e| io_err(to_io(e)))? {
                    return Ok(Verdict::Modified);
                }
                return Ok(Verdict::Vanilla);
            }
        }

        if name.eq_ignore_ascii_case(TOC_FILE) || name.eq_ignore_ascii_case(LOADER_DLL) {
            return Ok(Verdict::Vanilla);
        }

        if !candidates.iter().any(|c| c.size == size) {
            return Ok(Verdict::Modified);
        }

        if deep_hash && !hash_matches(path, candidates).map_err(|e| io_err(to_io(e)))? {
            return Ok(Verdict::Modified);
        }

        Ok(Verdict::Vanilla)
    }

    /// Scan every file below `root`, reporting each non-vanilla one.
    ///
    /// Returns whether the whole tree is vanilla. A missing root is logged and
    /// reported as not vanilla without scanning anything.
    pub fn validate_tree<F>(
        &self,
        root: &Path,
        mut report: F,
        strict: bool,
        deep_hash: bool,
    ) -> Result<bool, ValidationError>
    where
        F: FnMut(&Finding),
    {
        if !root.is_dir() {
            error!("Cannot validate {}: {} does not exist", self.game, root.display());
            return Ok(false);
        }

        info!(
            "Validating {} at {} (strict={}, deep_hash={})",
            self.game,
            root.display(),
            strict,
            deep_hash
        );

        let mut all_vanilla = true;
        let mut scanned = 0u64;
        let mut findings = 0u64;

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry during validation: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = paths::relative_key(root, entry.path()) else {
                continue;
            };

            if !strict {
                let name = paths::file_name(&relative);
                if NON_STRICT_ALLOW_LIST.contains(&name) {
                    continue;
                }
            }

            scanned += 1;
            let verdict = match self.classify_path(entry.path(), &relative, deep_hash) {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("{}; treating as modified", e);
                    Verdict::Modified
                }
            };

            if matches!(verdict, Verdict::Modified | Verdict::ArchiveInconsistent) {
                all_vanilla = false;
                findings += 1;
                debug!("{:?}: {}", verdict, relative);
                report(&Finding {
                    relative_path: relative,
                    path: entry.into_path(),
                    verdict,
                });
            }
        }

        info!(
            "Validated {} files in {}: {} not vanilla",
            scanned, self.game, findings
        );
        Ok(all_vanilla)
    }
}

fn hash_matches(path: &Path, candidates: &[crate::manifest::Candidate]) -> anyhow::Result<bool> {
    let actual = hash::compute_md5(path)?;
    Ok(candidates.iter().any(|c| c.md5.eq_ignore_ascii_case(&actual)))
}

fn to_io(e: anyhow::Error) -> std::io::Error {
    match e.downcast::<std::io::Error>() {
        Ok(io) => io,
        Err(other) => std::io::Error::other(format!("{:#}", other)),
    }
}
