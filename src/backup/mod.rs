//! Creating, linking and unlinking vanilla backups.
//!
//! A fresh backup is a filtered copy of a validated installation. Linking
//! registers an existing vanilla copy without copying anything. Either way
//! the directory gets the marker file and its path goes into the catalog.

mod preflight;

pub use preflight::{check_destination, check_source, check_writable, DestinationMode, SourceReport};

use crate::context::Vault;
use crate::copy;
use crate::games::{language_suffix, looks_like_installation, Game, Language, BACKUP_MARKER_FILE, LEFTOVER_BACKUP_DIR};
use crate::host::{FileCategory, FileProgress, Host, PathPrompt, Prompt};
use crate::installation::{tree_size, Installation};
use crate::operation::{AbortCause, OperationError, PreflightAbort};
use crate::paths;
use std::path::{Path, PathBuf};
use tracing::info;

/// Files at least this large are reported as "large file".
pub const LARGE_FILE_THRESHOLD: u64 = 128 * 1024 * 1024;

/// Classify a file for status reporting. Copy behavior never depends on it.
pub fn categorize(game: Game, relative_key: &str, size: u64) -> FileCategory {
    let dlc_prefix = format!("{}\\", paths::normalize_for_lookup(game.dlc_dir()));
    if relative_key.starts_with(&dlc_prefix) {
        return FileCategory::OptionalContent;
    }
    if matches!(paths::extension(relative_key), Some("bik" | "bk2")) {
        return FileCategory::Cinematic;
    }
    if size >= LARGE_FILE_THRESHOLD {
        return FileCategory::LargeFile;
    }
    FileCategory::BaseGame
}

/// Whether a file survives the language filter. English is always kept, and
/// an empty selection keeps everything.
pub fn keeps_language(file_name: &str, selected: &[Language]) -> bool {
    match language_suffix(file_name) {
        None => true,
        Some(Language::English) => true,
        Some(_) if selected.is_empty() => true,
        Some(language) => selected.contains(&language),
    }
}

fn in_leftover_backup_dir(relative_key: &str) -> bool {
    relative_key
        .split('\\')
        .any(|part| part.eq_ignore_ascii_case(LEFTOVER_BACKUP_DIR))
}

/// Write the marker file naming the tool version and creation time.
pub fn write_marker(dir: &Path, game: Game) -> Result<(), OperationError> {
    let marker = dir.join(BACKUP_MARKER_FILE);
    let content = format!(
        "{} {} vanilla backup of {}, created {}\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        game,
        chrono::Local::now().to_rfc3339()
    );
    std::fs::write(&marker, content)
        .map_err(|e| OperationError::io(format!("Writing {}", marker.display()), e))
}

#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub destination: PathBuf,
    pub files: u64,
    pub bytes: u64,
    pub marker_written: bool,
    /// Official packages the user agreed to leave out
    pub missing_official: Vec<String>,
}

/// Runs backup operations against a [`Vault`], talking to the user through a [`Host`].
pub struct BackupOrchestrator<'a> {
    vault: &'a Vault,
    host: &'a dyn Host,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(vault: &'a Vault, host: &'a dyn Host) -> Self {
        Self { vault, host }
    }

    /// Copy the tracked installation of `game` into `destination` (or a
    /// directory the host picks) and register it.
    pub fn create(
        &self,
        game: Game,
        destination: Option<PathBuf>,
        languages: &[Language],
    ) -> Result<BackupSummary, OperationError> {
        let _ticket = self.vault.begin(game)?;

        let source = self.vault.installation(game).ok_or_else(|| {
            PreflightAbort::new(
                AbortCause::NotAnInstallation,
                format!("No installation of {} is tracked.", game),
            )
        })?;
        let report = check_source(self.vault, self.host, &source, true)?;

        let destination = destination
            .or_else(|| self.host.choose_path(&PathPrompt::BackupDestination))
            .ok_or_else(|| {
                PreflightAbort::new(AbortCause::NoDestination, "No backup folder was chosen.")
            })?;

        let (_, required_bytes) = tree_size(&source.root);
        check_destination(
            self.vault,
            game,
            &destination,
            DestinationMode::Fresh { required_bytes },
        )?;

        info!(
            "Backing up {} from {} to {}",
            game,
            source.root.display(),
            destination.display()
        );
        self.host.status(&format!("Backing up {}", game));

        let include = |key: &str, is_dir: bool| {
            if in_leftover_backup_dir(key) {
                return false;
            }
            is_dir || keeps_language(paths::file_name(key), languages)
        };
        let stats = copy::copy_tree(
            &source.root,
            &destination,
            include,
            |progress| {
                self.host.file_progress(&FileProgress {
                    done: progress.files_done,
                    total: progress.total_files,
                    current: progress.current.clone(),
                    category: categorize(game, &progress.current, progress.current_size),
                })
            },
            |done, total| self.host.byte_progress(done, total),
        )?;

        // The source passed the vanilla and unofficial-content checks above
        write_marker(&destination, game)?;
        self.vault.catalog.set(game, &destination)?;

        info!(
            "Backup of {} complete: {} files, {} bytes",
            game, stats.files, stats.bytes
        );
        Ok(BackupSummary {
            destination,
            files: stats.files,
            bytes: stats.bytes,
            marker_written: true,
            missing_official: report.missing_official,
        })
    }

    /// Register an existing vanilla copy of `game` as its backup.
    pub fn link(&self, game: Game, path: &Path) -> Result<(), OperationError> {
        let _ticket = self.vault.begin(game)?;

        check_destination(self.vault, game, path, DestinationMode::Link)?;
        if !looks_like_installation(game, path) {
            let [first, second] = game.canonical_dirs();
            return Err(PreflightAbort::new(
                AbortCause::NotAnInstallation,
                format!(
                    "{} does not contain {} and {} folders.",
                    path.display(),
                    first,
                    second
                ),
            )
            .into());
        }

        let prompt = Prompt::LinkExistingInstallation {
            path: path.to_path_buf(),
        };
        if !self.host.confirm(&prompt) {
            return Err(PreflightAbort::new(
                AbortCause::UserDeclined,
                "The folder was not linked.",
            )
            .into());
        }

        let candidate = Installation::load(game, path);
        check_source(self.vault, self.host, &candidate, false)?;

        write_marker(path, game)?;
        self.vault.catalog.set(game, path)?;
        info!("Linked {} as the backup of {}", path.display(), game);
        Ok(())
    }

    /// Forget the backup of `game`; its files stay on disk.
    pub fn unlink(&self, game: Game) -> Result<(), OperationError> {
        let _ticket = self.vault.begin(game)?;
        self.vault.catalog.unlink(game)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;
    use crate::testutil::{self, World};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHost {
        files: RefCell<Vec<(String, FileCategory)>>,
    }

    impl Host for RecordingHost {
        fn confirm(&self, _prompt: &Prompt) -> bool {
            true
        }

        fn file_progress(&self, progress: &FileProgress) {
            self.files
                .borrow_mut()
                .push((progress.current.clone(), progress.category));
        }
    }

    #[test]
    fn test_categorize() {
        assert_eq!(
            categorize(Game::Me3, "biogame\\dlc\\dlc_con_end\\default.sfar", 10),
            FileCategory::OptionalContent
        );
        assert_eq!(categorize(Game::Me3, "biogame\\movies\\intro.bik", 10), FileCategory::Cinematic);
        assert_eq!(
            categorize(Game::Me3, "biogame\\cookedpcconsole\\textures.tfc", LARGE_FILE_THRESHOLD),
            FileCategory::LargeFile
        );
        assert_eq!(categorize(Game::Me1, "dlc\\dlc_unc\\x.upk", 1), FileCategory::OptionalContent);
        assert_eq!(categorize(Game::Me3, "binaries\\win32\\masseffect3.exe", 1), FileCategory::BaseGame);
    }

    #[test]
    fn test_language_filter() {
        let german = [Language::German];
        assert!(keeps_language("biogame_int.tlk", &german));
        assert!(keeps_language("biogame_deu.tlk", &german));
        assert!(!keeps_language("biogame_fra.tlk", &german));
        assert!(keeps_language("biogame_fra.tlk", &[]));
        assert!(keeps_language("startup.pcc", &german));
    }

    #[test]
    fn test_backup_into_non_empty_directory_aborts() {
        let world = World::new();
        let destination = world.path("Backup");
        testutil::write(&destination, "already-here.txt", b"x");

        let host = HeadlessHost::accepting();
        let err = BackupOrchestrator::new(&world.vault, &host)
            .create(Game::Me3, Some(destination.clone()), &[])
            .unwrap_err();

        assert_eq!(err.cause(), Some(AbortCause::DirectoryNotEmpty));
        assert_eq!(world.vault.catalog.stored_path(Game::Me3), None);
        assert!(!destination.join(BACKUP_MARKER_FILE).exists());
    }

    #[test]
    fn test_backup_copies_and_registers() {
        let world = World::new();
        testutil::write(&world.install, "BIOGame/cmmbackup/BioD_Nor.pcc", b"old tool copy");
        let destination = world.path("Backup");

        let host = RecordingHost::default();
        let summary = BackupOrchestrator::new(&world.vault, &host)
            .create(Game::Me3, Some(destination.clone()), &[Language::French])
            .unwrap();

        // German text left out; English always kept
        assert_eq!(summary.files, world.files.len() as u64 - 1);
        assert!(summary.marker_written);
        assert!(destination.join(BACKUP_MARKER_FILE).is_file());
        assert!(destination.join("BIOGame/CookedPCConsole/BIOGame_INT.tlk").is_file());
        assert!(!destination.join("BIOGame/CookedPCConsole/BIOGame_DEU.tlk").exists());
        assert!(!destination.join("BIOGame/cmmbackup").exists());
        assert_eq!(world.vault.catalog.get(Game::Me3), Some(destination));

        let files = host.files.borrow();
        assert!(files
            .iter()
            .any(|(path, category)| path.ends_with("intro.bik") && *category == FileCategory::Cinematic));
    }

    #[test]
    fn test_backup_without_destination() {
        let world = World::new();
        let host = HeadlessHost::accepting();
        let err = BackupOrchestrator::new(&world.vault, &host)
            .create(Game::Me3, None, &[])
            .unwrap_err();
        assert_eq!(err.cause(), Some(AbortCause::NoDestination));
    }

    #[test]
    fn test_operation_in_progress() {
        let world = World::new();
        let _busy = world.vault.begin(Game::Me3).unwrap();
        let host = HeadlessHost::accepting();
        let err = BackupOrchestrator::new(&world.vault, &host)
            .create(Game::Me3, Some(world.path("Backup")), &[])
            .unwrap_err();
        assert_eq!(err.cause(), Some(AbortCause::OperationInProgress));
    }

    #[test]
    fn test_link_and_unlink() {
        let world = World::new();
        let copy = world.path("Existing Copy");
        testutil::make_layout(Game::Me3, &copy);
        testutil::write_files(&copy, &world.files);

        let declining = HeadlessHost { answer: false };
        let err = BackupOrchestrator::new(&world.vault, &declining)
            .link(Game::Me3, &copy)
            .unwrap_err();
        assert_eq!(err.cause(), Some(AbortCause::UserDeclined));

        let host = HeadlessHost::accepting();
        let orchestrator = BackupOrchestrator::new(&world.vault, &host);
        orchestrator.link(Game::Me3, &copy).unwrap();
        assert!(copy.join(BACKUP_MARKER_FILE).is_file());
        assert_eq!(world.vault.catalog.get(Game::Me3), Some(copy.clone()));

        orchestrator.unlink(Game::Me3).unwrap();
        assert_eq!(world.vault.catalog.get(Game::Me3), None);
        assert!(!copy.join(BACKUP_MARKER_FILE).exists());
    }

    #[test]
    fn test_link_rejects_modified_copy() {
        let world = World::new();
        let copy = world.path("Modded Copy");
        testutil::make_layout(Game::Me3, &copy);
        testutil::write_files(&copy, &world.files);
        testutil::write(&copy, "Binaries/Win32/MassEffect3.exe", b"patched");

        let host = HeadlessHost::accepting();
        let err = BackupOrchestrator::new(&world.vault, &host)
            .link(Game::Me3, &copy)
            .unwrap_err();
        assert_eq!(err.cause(), Some(AbortCause::SourceModified));
        assert_eq!(world.vault.catalog.stored_path(Game::Me3), None);
    }

    #[test]
    fn test_link_requires_installation_layout() {
        let world = World::new();
        let empty = world.path("Empty");
        std::fs::create_dir_all(&empty).unwrap();
        let host = HeadlessHost::accepting();
        let err = BackupOrchestrator::new(&world.vault, &host)
            .link(Game::Me3, &empty)
            .unwrap_err();
        assert_eq!(err.cause(), Some(AbortCause::NotAnInstallation));
    }
}
