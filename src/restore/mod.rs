//! Restoring a title from its registered backup.
//!
//! # Strategies
//!
//! - **Mirror** (default): delete extraneous files, copy changed ones, keep
//!   identical ones. Texture-tagged files are untagged first so they count
//!   as identical.
//! - **Legacy**: empty the destination, then copy the whole backup.

mod archive_queue;
mod texture_tags;

pub use archive_queue::{restore_archive, ArchiveRestoreOutcome, ArchiveRestoreQueue};
pub use texture_tags::strip_texture_tags;

use crate::backup::check_writable;
use crate::config::RestoreStrategy;
use crate::context::Vault;
use crate::copy::{self, CopyProgress};
use crate::games::{Game, BACKUP_MARKER_FILE};
use crate::host::{FileProgress, Host, Prompt};
use crate::installation::Installation;
use crate::operation::{AbortCause, OperationError, PreflightAbort};
use crate::paths;
use crate::validate::IntegrityValidator;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the backup goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// The tracked installation of the title
    Installation,
    /// Any other directory; must be empty or absent
    Custom(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RestoreSummary {
    pub destination: PathBuf,
    pub strategy: RestoreStrategy,
    /// Files whose texture tag was removed instead of recopying them
    pub untagged: Vec<String>,
    pub copied: u64,
    pub preserved: u64,
    pub deleted: u64,
    pub bytes: u64,
    /// The restored installation with freshly computed flags, when the
    /// tracked installation was the target
    pub installation: Option<Installation>,
}

pub struct RestoreOrchestrator<'a> {
    vault: &'a Vault,
    host: &'a dyn Host,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(vault: &'a Vault, host: &'a dyn Host) -> Self {
        Self { vault, host }
    }

    /// Restore `game` from its backup, with the configured strategy unless
    /// one is given.
    pub fn restore(
        &self,
        game: Game,
        target: RestoreTarget,
        strategy: Option<RestoreStrategy>,
    ) -> Result<RestoreSummary, OperationError> {
        let _ticket = self.vault.begin(game)?;
        let strategy = strategy.unwrap_or(self.vault.settings.restore_strategy);

        let backup = self.vault.catalog.get(game).ok_or_else(|| {
            PreflightAbort::new(
                AbortCause::NoBackup,
                format!("{} has no usable backup.", game),
            )
        })?;

        let (destination, installation) = match target {
            RestoreTarget::Installation => {
                let installation = self.vault.installation(game).ok_or_else(|| {
                    PreflightAbort::new(
                        AbortCause::NotAnInstallation,
                        format!("No installation of {} is tracked.", game),
                    )
                })?;
                if self.vault.platform().is_running(game) {
                    return Err(PreflightAbort::new(
                        AbortCause::GameRunning,
                        format!("Close {} before restoring it.", game),
                    )
                    .into());
                }
                let prompt = Prompt::OverwriteInstallation {
                    path: installation.root.clone(),
                };
                if !self.host.confirm(&prompt) {
                    return Err(PreflightAbort::new(
                        AbortCause::UserDeclined,
                        "The installation was left unchanged.",
                    )
                    .into());
                }
                (installation.root.clone(), Some(installation))
            }
            RestoreTarget::Custom(path) => {
                let occupied = std::fs::read_dir(&path)
                    .map(|mut entries| entries.next().is_some())
                    .unwrap_or(false);
                if occupied {
                    return Err(PreflightAbort::new(
                        AbortCause::DirectoryNotEmpty,
                        format!("{} is not empty.", path.display()),
                    )
                    .into());
                }
                if let Some(tracked) = self
                    .vault
                    .tracked_paths()
                    .into_iter()
                    .find(|tracked| paths::overlaps(&path, tracked))
                {
                    return Err(PreflightAbort::new(
                        AbortCause::InsideInstallation,
                        format!("{} overlaps the installation at {}.", path.display(), tracked.display()),
                    )
                    .into());
                }
                (path, None)
            }
        };
        if paths::overlaps(&destination, &backup) {
            return Err(PreflightAbort::new(
                AbortCause::OverlapsBackup,
                format!(
                    "{} overlaps the backup at {}.",
                    destination.display(),
                    backup.display()
                ),
            )
            .into());
        }
        check_writable(&destination)?;

        info!(
            "Restoring {} from {} to {} ({:?})",
            game,
            backup.display(),
            destination.display(),
            strategy
        );
        self.host.status(&format!("Restoring {}", game));

        let mut summary = RestoreSummary {
            destination: destination.clone(),
            strategy,
            untagged: Vec::new(),
            copied: 0,
            preserved: 0,
            deleted: 0,
            bytes: 0,
            installation: None,
        };

        let on_file = |progress: &CopyProgress| {
            self.host.file_progress(&FileProgress {
                done: progress.files_done,
                total: progress.total_files,
                current: progress.current.clone(),
                category: crate::backup::categorize(game, &progress.current, progress.current_size),
            })
        };
        let on_bytes = |done, total| self.host.byte_progress(done, total);
        let include = |key: &str, _: bool| key != BACKUP_MARKER_FILE;

        match strategy {
            RestoreStrategy::Mirror => {
                if let Some(installation) = installation.as_ref().filter(|i| i.texture_modded) {
                    summary.untagged = self.untag(installation, &backup)?;
                }
                let stats = copy::mirror(&backup, &destination, include, on_file, on_bytes)?;
                summary.copied = stats.copied;
                summary.preserved = stats.preserved;
                summary.deleted = stats.deleted;
                summary.bytes = stats.bytes;
            }
            RestoreStrategy::Legacy => {
                self.host.status("Deleting existing files");
                summary.deleted = copy::clear_directory(&destination)?;
                let stats = copy::copy_tree(&backup, &destination, include, on_file, on_bytes)?;
                summary.copied = stats.files;
                summary.bytes = stats.bytes;
            }
        }

        remove_marker(&destination)?;

        if let Some(mut installation) = installation {
            installation.reload();
            summary.installation = Some(installation);
        }

        info!(
            "Restore of {} complete: {} copied, {} kept, {} deleted",
            game, summary.copied, summary.preserved, summary.deleted
        );
        Ok(summary)
    }

    fn untag(&self, installation: &Installation, backup: &Path) -> Result<Vec<String>, OperationError> {
        let validator = match IntegrityValidator::for_installation(&self.vault.manifests, installation) {
            Ok(validator) => validator,
            Err(e) => {
                warn!("Skipping texture tag removal: {}", e);
                return Ok(Vec::new());
            }
        };
        self.host.status("Removing texture tool tags");
        strip_texture_tags(&validator, &installation.root, backup)
    }
}

/// A live installation must never carry the backup marker.
fn remove_marker(destination: &Path) -> Result<(), OperationError> {
    let marker = destination.join(BACKUP_MARKER_FILE);
    match std::fs::remove_file(&marker) {
        Ok(()) => {
            info!("Removed {} from restored installation", marker.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OperationError::io(format!("Removing {}", marker.display()), e)),
    }
}
