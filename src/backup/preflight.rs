//! Checks that must pass before a directory is copied or registered as a backup.

use crate::context::Vault;
use crate::games::Game;
use crate::host::{Host, Prompt};
use crate::installation::Installation;
use crate::operation::{AbortCause, OperationError, PreflightAbort};
use crate::paths;
use crate::validate::{is_archive_consistent, Finding, ValidationError, Verdict};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// How many offending files an abort message lists before summarising.
const LISTED_FILES: usize = 10;

/// What the source checks found, for callers that want to report it.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    /// Official packages not installed, accepted by the user
    pub missing_official: Vec<String>,
}

fn list_files(findings: &[Finding]) -> String {
    let mut listed: Vec<&str> = findings
        .iter()
        .take(LISTED_FILES)
        .map(|f| f.relative_path.as_str())
        .collect();
    if findings.len() > LISTED_FILES {
        listed.push("...");
    }
    listed.join("\n")
}

/// Source checks, in order: not running, vanilla, archives consistent,
/// no unofficial packages, no texture cache leftovers. Missing official
/// packages need the user's confirmation.
pub fn check_source(
    vault: &Vault,
    host: &dyn Host,
    installation: &Installation,
    check_running: bool,
) -> Result<SourceReport, OperationError> {
    let game = installation.game;

    if check_running && vault.platform().is_running(game) {
        return Err(PreflightAbort::new(
            AbortCause::GameRunning,
            format!("Close {} before continuing.", game),
        )
        .into());
    }

    host.status(&format!("Validating {}", game));
    let validator = match vault.validator_for(installation) {
        Ok(validator) => validator,
        Err(ValidationError::CannotValidate(e)) => {
            return Err(PreflightAbort::new(AbortCause::ValidationUnavailable, e.to_string()).into())
        }
        Err(e) => return Err(e.into()),
    };

    if !installation.exists() {
        return Err(PreflightAbort::new(
            AbortCause::NotAnInstallation,
            format!("{} does not exist.", installation.root.display()),
        )
        .into());
    }

    let mut findings = Vec::new();
    let vanilla = validator.validate_tree(
        &installation.root,
        |finding| findings.push(finding.clone()),
        false,
        false,
    )?;
    if !vanilla {
        let (inconsistent, modified): (Vec<Finding>, Vec<Finding>) = findings
            .into_iter()
            .partition(|f| f.verdict == Verdict::ArchiveInconsistent);
        if !modified.is_empty() {
            return Err(PreflightAbort::new(
                AbortCause::SourceModified,
                format!(
                    "{} is not vanilla. {} files differ from the shipped game:\n{}",
                    game,
                    modified.len(),
                    list_files(&modified)
                ),
            )
            .into());
        }
        return Err(PreflightAbort::new(
            AbortCause::InconsistentArchive,
            format!(
                "These DLC archives have loose files beside them:\n{}",
                list_files(&inconsistent)
            ),
        )
        .into());
    }

    if let Some(sealed) = game.sealed_archive() {
        for archive in installation.official_archives() {
            let consistent = is_archive_consistent(&archive, sealed.stub_size)
                .map_err(|e| OperationError::io(format!("Checking {}", archive.display()), e))?;
            if !consistent {
                return Err(PreflightAbort::new(
                    AbortCause::InconsistentArchive,
                    format!(
                        "{} is sealed but has unpacked files beside it.",
                        archive.display()
                    ),
                )
                .into());
            }
        }
    }

    let unofficial = installation.unofficial_dlc();
    if !unofficial.is_empty() {
        return Err(PreflightAbort::new(
            AbortCause::UnofficialContent,
            format!(
                "Remove these third-party DLC folders first:\n{}",
                unofficial.join("\n")
            ),
        )
        .into());
    }

    let leftovers = installation.texture_cache_leftovers();
    if !leftovers.is_empty() {
        let names: Vec<String> = leftovers
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        return Err(PreflightAbort::new(
            AbortCause::TextureCacheLeftovers,
            format!(
                "Texture tool cache files remain from an earlier texture install:\n{}",
                names.join("\n")
            ),
        )
        .into());
    }

    let missing_official = installation.missing_official_dlc();
    if !missing_official.is_empty() {
        warn!(
            "{} official DLC packages are not installed: {}",
            missing_official.len(),
            missing_official.join(", ")
        );
        let prompt = Prompt::MissingOfficialContent {
            packages: missing_official.clone(),
        };
        if !host.confirm(&prompt) {
            return Err(PreflightAbort::new(
                AbortCause::UserDeclined,
                "The backup would not contain all official DLC.",
            )
            .into());
        }
    }

    info!("{} at {} passed source checks", game, installation.root.display());
    Ok(SourceReport { missing_official })
}

/// Which destination checks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationMode {
    /// Copying a new backup of `required_bytes`
    Fresh { required_bytes: u64 },
    /// Registering an existing directory
    Link,
}

fn is_empty_dir(path: &Path) -> std::io::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Destination checks. A fresh destination that does not exist yet is created
/// by the writability probe.
pub fn check_destination(
    vault: &Vault,
    game: Game,
    destination: &Path,
    mode: DestinationMode,
) -> Result<(), PreflightAbort> {
    if let DestinationMode::Fresh { required_bytes } = mode {
        match is_empty_dir(destination) {
            Ok(true) => {}
            Ok(false) => {
                return Err(PreflightAbort::new(
                    AbortCause::DirectoryNotEmpty,
                    format!(
                        "{} is not empty. Backups must go into an empty folder.",
                        destination.display()
                    ),
                ))
            }
            Err(e) => {
                return Err(PreflightAbort::new(
                    AbortCause::NotWritable,
                    format!("{} cannot be read: {}", destination.display(), e),
                ))
            }
        }

        match vault.platform().free_space(destination) {
            // 1.1x the source size
            Some(free) if (free as u128) * 10 < (required_bytes as u128) * 11 => {
                return Err(PreflightAbort::new(
                    AbortCause::InsufficientSpace,
                    format!(
                        "The backup needs {:.2} GB but only {:.2} GB are free at {}.",
                        required_bytes as f64 * 1.1 / 1_073_741_824.0,
                        free as f64 / 1_073_741_824.0,
                        destination.display()
                    ),
                ));
            }
            Some(_) => {}
            None => warn!(
                "Could not determine free space at {}; continuing",
                destination.display()
            ),
        }
    }

    if let Some(documents) = vault.platform().documents_dir() {
        let game_documents = documents.join(game.documents_subdir());
        if paths::is_same_or_within(destination, &game_documents) {
            return Err(PreflightAbort::new(
                AbortCause::DocumentsDirectory,
                format!(
                    "{} holds the game's saves and settings; pick another folder.",
                    game_documents.display()
                ),
            ));
        }
    }

    for tracked in vault.tracked_paths() {
        if paths::is_same_or_within(destination, &tracked) {
            return Err(PreflightAbort::new(
                AbortCause::InsideInstallation,
                format!(
                    "{} is inside the game installation at {}.",
                    destination.display(),
                    tracked.display()
                ),
            ));
        }
    }

    check_writable(destination)
}

/// Create and remove a temporary file in `dir`, creating `dir` if needed.
pub fn check_writable(dir: &Path) -> Result<(), PreflightAbort> {
    let not_writable = |e: std::io::Error| {
        PreflightAbort::new(
            AbortCause::NotWritable,
            format!("Cannot write to {}: {}", dir.display(), e),
        )
    };
    fs::create_dir_all(dir).map_err(not_writable)?;
    let probe = tempfile::NamedTempFile::new_in(dir).map_err(not_writable)?;
    probe.close().map_err(not_writable)?;
    Ok(())
}
