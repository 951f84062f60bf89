//! Operating-system facts the orchestrators depend on.

use crate::games::Game;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};
use tracing::debug;

/// Environment queries, injectable so orchestration can run headless in tests.
pub trait Platform: Send + Sync {
    /// Whether the game's executable is currently running.
    fn is_running(&self, game: Game) -> bool;

    /// Free bytes on the volume holding `path`, if it can be determined.
    fn free_space(&self, path: &Path) -> Option<u64>;

    /// The user's Documents folder.
    fn documents_dir(&self) -> Option<PathBuf>;
}

/// Real implementation backed by `sysinfo` and `dirs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn is_running(&self, game: Game) -> bool {
        let system = System::new_all();
        let name = game.process_name();
        let running = system
            .processes()
            .values()
            .any(|process| process.name().eq_ignore_ascii_case(name));
        debug!("{} running: {}", name, running);
        running
    }

    fn free_space(&self, path: &Path) -> Option<u64> {
        let target = crate::paths::canonicalize_lenient(path);
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point that contains the target wins
        disks
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }

    fn documents_dir(&self) -> Option<PathBuf> {
        dirs::document_dir()
    }
}
