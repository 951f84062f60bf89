//! Restoring individual sealed DLC archives from the backup.
//!
//! Jobs run one at a time on a single worker thread, so two restores can
//! never race on the same DLC folder.

use crate::copy;
use crate::games::Game;
use crate::operation::{AbortCause, OperationError, PreflightAbort};
use crate::paths;
use crate::validate::loose_content_beside;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Pending jobs before `submit` blocks.
const QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRestoreOutcome {
    pub dlc: String,
    pub archives: usize,
    /// Loose files deleted from beside the restored archives
    pub loose_removed: usize,
}

type Reply = Result<ArchiveRestoreOutcome, OperationError>;

struct Job {
    dlc: String,
    reply: Sender<Reply>,
}

/// Copy the sealed archives of one DLC folder back from the backup and
/// delete any unpacked files left beside them.
pub fn restore_archive(
    game: Game,
    backup_root: &Path,
    game_root: &Path,
    dlc: &str,
) -> Result<ArchiveRestoreOutcome, OperationError> {
    let Some(sealed) = game.sealed_archive() else {
        return Err(PreflightAbort::new(
            AbortCause::NoSealedArchives,
            format!("{} does not ship DLC in sealed archives.", game),
        )
        .into());
    };

    let relative = format!("{}\\{}", game.dlc_dir(), dlc);
    let backup_dlc = paths::resolve_case_insensitive(backup_root, &relative).ok_or_else(|| {
        PreflightAbort::new(
            AbortCause::NoBackup,
            format!("The backup does not contain {}.", dlc),
        )
    })?;
    let live_dlc = paths::resolve_case_insensitive(game_root, &relative)
        .unwrap_or_else(|| paths::join_windows_path(game_root, &relative));

    let archives: Vec<PathBuf> = WalkDir::new(&backup_dlc)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(sealed.extension))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    if archives.is_empty() {
        return Err(PreflightAbort::new(
            AbortCause::NoBackup,
            format!("The backup of {} has no .{} archive.", dlc, sealed.extension),
        )
        .into());
    }

    let mut loose_removed = 0;
    for archive in &archives {
        let Ok(inner) = archive.strip_prefix(&backup_dlc) else {
            continue;
        };
        let target = live_dlc.join(inner);
        copy::copy_file(archive, &target, |_| {})?;
        debug!("Restored {}", target.display());

        let loose = loose_content_beside(&target)
            .map_err(|e| OperationError::io(format!("Listing {}", live_dlc.display()), e))?;
        for file in loose {
            std::fs::remove_file(&file)
                .map_err(|e| OperationError::io(format!("Deleting {}", file.display()), e))?;
            loose_removed += 1;
        }
    }

    info!(
        "Restored {} archives of {}, removed {} loose files",
        archives.len(),
        dlc,
        loose_removed
    );
    Ok(ArchiveRestoreOutcome {
        dlc: dlc.to_string(),
        archives: archives.len(),
        loose_removed,
    })
}

/// Single-consumer queue of DLC archive restores.
pub struct ArchiveRestoreQueue {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ArchiveRestoreQueue {
    pub fn start(game: Game, backup_root: PathBuf, game_root: PathBuf) -> std::io::Result<Self> {
        let (jobs, inbox) = bounded::<Job>(QUEUE_CAPACITY);
        let worker = std::thread::Builder::new()
            .name(format!("{}-archive-restore", game.code().to_lowercase()))
            .spawn(move || {
                for job in inbox {
                    let result = restore_archive(game, &backup_root, &game_root, &job.dlc);
                    if let Err(e) = &result {
                        warn!("Restoring {} failed: {}", job.dlc, e);
                    }
                    // The submitter may have stopped waiting
                    let _ = job.reply.send(result);
                }
                debug!("Archive restore worker for {} finished", game);
            })?;

        Ok(Self {
            jobs: Some(jobs),
            worker: Some(worker),
        })
    }

    /// Queue a DLC folder; the receiver yields its result once it has run.
    pub fn submit(&self, dlc: &str) -> Receiver<Reply> {
        let (reply, result) = bounded(1);
        let job = Job {
            dlc: dlc.to_string(),
            reply,
        };
        let rejected = match &self.jobs {
            Some(jobs) => jobs.send(job).err().map(|e| e.into_inner()),
            None => Some(job),
        };
        if let Some(job) = rejected {
            let _ = job.reply.send(Err(OperationError::io(
                format!("Queueing {}", job.dlc),
                std::io::Error::other("archive restore worker has stopped"),
            )));
        }
        result
    }
}

impl Drop for ArchiveRestoreQueue {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Archive restore worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::TempDir;

    const END: &str = "BIOGame/DLC/DLC_CON_END/CookedPCConsole";

    #[test]
    fn test_restore_archive_reseals_package() {
        let backup = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        testutil::write(backup.path(), &format!("{}/Default.sfar", END), &[1u8; 512]);
        testutil::write(live.path(), &format!("{}/Default.sfar", END), &[0u8; 32]);
        testutil::write(live.path(), &format!("{}/BioD_End001.pcc", END), b"unpacked");
        testutil::write(live.path(), &format!("{}/PCConsoleTOC.bin", END), b"toc");

        let outcome = restore_archive(Game::Me3, backup.path(), live.path(), "DLC_CON_END").unwrap();
        assert_eq!(outcome.archives, 1);
        assert_eq!(outcome.loose_removed, 1);

        let cooked = live.path().join(END);
        assert_eq!(std::fs::metadata(cooked.join("Default.sfar")).unwrap().len(), 512);
        assert!(!cooked.join("BioD_End001.pcc").exists());
        assert!(cooked.join("PCConsoleTOC.bin").exists());
    }

    #[test]
    fn test_queue_runs_jobs_in_order() {
        let backup = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        testutil::write(backup.path(), &format!("{}/Default.sfar", END), &[1u8; 64]);
        testutil::write(
            backup.path(),
            "BIOGame/DLC/DLC_HEN_PR/CookedPCConsole/Default.sfar",
            &[2u8; 64],
        );

        let queue =
            ArchiveRestoreQueue::start(Game::Me3, backup.path().to_path_buf(), live.path().to_path_buf())
                .unwrap();
        let first = queue.submit("DLC_CON_END");
        let missing = queue.submit("DLC_EXP_Pack001");
        let second = queue.submit("DLC_HEN_PR");

        assert_eq!(first.recv().unwrap().unwrap().dlc, "DLC_CON_END");
        assert_eq!(
            missing.recv().unwrap().unwrap_err().cause(),
            Some(AbortCause::NoBackup)
        );
        assert_eq!(second.recv().unwrap().unwrap().archives, 1);
        drop(queue);

        assert!(live
            .path()
            .join("BIOGame/DLC/DLC_HEN_PR/CookedPCConsole/Default.sfar")
            .is_file());
    }

    #[test]
    fn test_titles_without_archives() {
        let dir = TempDir::new().unwrap();
        let err = restore_archive(Game::Me2, dir.path(), dir.path(), "DLC_HEN_VT").unwrap_err();
        assert_eq!(err.cause(), Some(AbortCause::NoSealedArchives));
    }
}
