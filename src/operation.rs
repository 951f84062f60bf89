//! Failure types shared by the backup and restore orchestrators, and the
//! per-title "operation in progress" flag.

use crate::catalog::StoreError;
use crate::games::Game;
use crate::validate::ValidationError;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Machine-distinguishable reason an operation refused to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCause {
    OperationInProgress,
    GameRunning,
    NoBackup,
    NoDestination,
    NotAnInstallation,
    ValidationUnavailable,
    SourceModified,
    InconsistentArchive,
    UnofficialContent,
    TextureCacheLeftovers,
    UserDeclined,
    DirectoryNotEmpty,
    InsufficientSpace,
    NotWritable,
    DocumentsDirectory,
    InsideInstallation,
    OverlapsBackup,
    NoSealedArchives,
}

impl AbortCause {
    /// Short user-facing title.
    pub fn title(&self) -> &'static str {
        match self {
            AbortCause::OperationInProgress => "Operation already running",
            AbortCause::GameRunning => "Game is running",
            AbortCause::NoBackup => "No backup available",
            AbortCause::NoDestination => "No destination selected",
            AbortCause::NotAnInstallation => "Not a game installation",
            AbortCause::ValidationUnavailable => "Cannot validate game",
            AbortCause::SourceModified => "Game is modified",
            AbortCause::InconsistentArchive => "DLC is in an inconsistent state",
            AbortCause::UnofficialContent => "Third-party DLC installed",
            AbortCause::TextureCacheLeftovers => "Texture tool leftovers found",
            AbortCause::UserDeclined => "Operation cancelled",
            AbortCause::DirectoryNotEmpty => "Directory not empty",
            AbortCause::InsufficientSpace => "Not enough free space",
            AbortCause::NotWritable => "Directory not writable",
            AbortCause::DocumentsDirectory => "Cannot use the game's Documents folder",
            AbortCause::InsideInstallation => "Cannot use a folder inside a game installation",
            AbortCause::OverlapsBackup => "Cannot restore into the backup",
            AbortCause::NoSealedArchives => "Title has no DLC archives",
        }
    }
}

/// An operation refused to start.
#[derive(Debug, Clone, Error)]
#[error("{title}: {message}")]
pub struct PreflightAbort {
    pub cause: AbortCause,
    pub title: String,
    pub message: String,
}

impl PreflightAbort {
    pub fn new(cause: AbortCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            title: cause.title().to_string(),
            message: message.into(),
        }
    }
}

/// A single file failed during a bulk copy; the batch stops there.
#[derive(Debug, Error)]
#[error("failed to copy {}: {source}", path.display())]
pub struct CopyError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Everything a backup or restore can fail with.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Aborted(#[from] PreflightAbort),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl OperationError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        OperationError::Io {
            context: context.into(),
            source,
        }
    }

    /// Short user-facing title; `to_string()` carries the explanation.
    pub fn title(&self) -> &str {
        match self {
            OperationError::Aborted(abort) => &abort.title,
            OperationError::Validation(_) => "Validation failed",
            OperationError::Copy(_) => "Copy failed",
            OperationError::Store(_) => "Could not save settings",
            OperationError::Io { .. } => "File system error",
        }
    }

    /// The abort cause, when the operation refused to start.
    pub fn cause(&self) -> Option<AbortCause> {
        match self {
            OperationError::Aborted(abort) => Some(abort.cause),
            _ => None,
        }
    }
}

/// Per-title in-progress flags. Backup and restore of the same title must not overlap.
#[derive(Debug, Default)]
pub struct OperationGuard {
    busy: Mutex<HashSet<Game>>,
}

/// Held for the duration of one operation; releases the flag on drop.
#[derive(Debug)]
pub struct OperationTicket<'a> {
    guard: &'a OperationGuard,
    game: Game,
}

impl OperationGuard {
    pub fn begin(&self, game: Game) -> Result<OperationTicket<'_>, PreflightAbort> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(game) {
            return Err(PreflightAbort::new(
                AbortCause::OperationInProgress,
                format!("A backup or restore of {} is already running.", game),
            ));
        }
        Ok(OperationTicket { guard: self, game })
    }
}

impl Drop for OperationTicket<'_> {
    fn drop(&mut self) {
        self.guard
            .busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.game);
    }
}
