//! Capabilities the caller provides to long-running operations.
//!
//! Orchestrators never talk to a terminal or window directly. Questions and
//! progress go through a [`Host`], which the CLI implements with stdin prompts
//! and progress bars and tests implement with canned answers.
//!
//! Progress methods are called synchronously on the worker thread, sometimes
//! once per file or per copied buffer. Implementations must return quickly.

use std::path::PathBuf;

/// Yes/no questions an operation may ask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Official optional content is not installed; the backup would not contain it.
    MissingOfficialContent { packages: Vec<String> },
    /// Registering an existing directory as the backup. It will never be used to
    /// run the game, only as a restore source.
    LinkExistingInstallation { path: PathBuf },
    /// Restoring will overwrite the live installation.
    OverwriteInstallation { path: PathBuf },
}

/// Directory choices an operation may ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPrompt {
    BackupDestination,
}

/// Broad file categories, used for status reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    OptionalContent,
    Cinematic,
    LargeFile,
    BaseGame,
}

/// Per-file progress notification.
#[derive(Debug, Clone)]
pub struct FileProgress {
    /// Files handled so far, including this one
    pub done: u64,
    pub total: u64,
    /// Relative path of the file being processed
    pub current: String,
    pub category: FileCategory,
}

/// Caller-provided callbacks. Every method has a headless default:
/// questions are declined and progress is dropped.
pub trait Host {
    fn confirm(&self, _prompt: &Prompt) -> bool {
        false
    }

    fn choose_path(&self, _prompt: &PathPrompt) -> Option<PathBuf> {
        None
    }

    fn status(&self, _message: &str) {}

    fn file_progress(&self, _progress: &FileProgress) {}

    fn byte_progress(&self, _done: u64, _total: u64) {}
}

/// Host that answers every question with a fixed value and ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessHost {
    pub answer: bool,
}

impl HeadlessHost {
    pub fn accepting() -> Self {
        Self { answer: true }
    }
}

impl Host for HeadlessHost {
    fn confirm(&self, _prompt: &Prompt) -> bool {
        self.answer
    }
}
