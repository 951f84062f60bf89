//! Game type definitions.
//!
//! This module defines the supported titles and every per-title constant
//! the validator, backup and restore code relies on.

mod dlc;
mod language;

pub use language::{language_suffix, Language};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the sentinel file that marks a directory as a registered vanilla backup.
pub const BACKUP_MARKER_FILE: &str = "cmm_vanilla";

/// Table-of-contents file regenerated by installers and mod tools.
pub const TOC_FILE: &str = "PCConsoleTOC.bin";

/// Redistributable loader DLL, routinely replaced by the ASI loader.
pub const LOADER_DLL: &str = "binkw32.dll";

/// Files a non-strict tree scan skips entirely.
pub const NON_STRICT_ALLOW_LIST: &[&str] = &["binkw32.dll", "binkw23.dll", "pcconsoletoc.bin"];

/// Subdirectory left behind by an older backup tool; never copied into a backup.
pub const LEFTOVER_BACKUP_DIR: &str = "cmmbackup";

/// Trailing bytes written by the texture tool into its installation marker asset.
pub const TEXTURE_MARKER_TAG: &[u8] = b"ThisIsMEMEndOfFileMarker";

/// Fixed-length tag the texture tool appends to files it has processed.
pub const TEXTURE_FILE_TAG: &[u8; 4] = b"MEMI";

/// Supported game types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    /// Mass Effect (2007/2008)
    Me1,
    /// Mass Effect 2
    Me2,
    /// Mass Effect 3
    Me3,
}

/// Sealed optional-content container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedArchive {
    /// Container extension, lowercase without the dot
    pub extension: &'static str,
    /// Size of a container that has been unpacked to loose files
    pub stub_size: u64,
}

impl Game {
    pub const ALL: [Game; 3] = [Game::Me1, Game::Me2, Game::Me3];

    /// Returns the display name for this game.
    pub fn name(&self) -> &'static str {
        match self {
            Game::Me1 => "Mass Effect",
            Game::Me2 => "Mass Effect 2",
            Game::Me3 => "Mass Effect 3",
        }
    }

    /// Short identifier used for settings keys and CLI arguments.
    pub fn code(&self) -> &'static str {
        match self {
            Game::Me1 => "ME1",
            Game::Me2 => "ME2",
            Game::Me3 => "ME3",
        }
    }

    /// Parses a game from its short code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        Game::ALL
            .into_iter()
            .find(|g| g.code().eq_ignore_ascii_case(code))
    }

    /// Top-level directories every installation of this title has.
    pub fn canonical_dirs(&self) -> [&'static str; 2] {
        match self {
            Game::Me1 | Game::Me2 => ["BioGame", "Binaries"],
            Game::Me3 => ["BIOGame", "Binaries"],
        }
    }

    /// Main executable, relative to the installation root.
    pub fn executable(&self) -> &'static str {
        match self {
            Game::Me1 => "Binaries\\MassEffect.exe",
            Game::Me2 => "Binaries\\MassEffect2.exe",
            Game::Me3 => "Binaries\\Win32\\MassEffect3.exe",
        }
    }

    /// Process image name while the game is running.
    pub fn process_name(&self) -> &'static str {
        crate::paths::file_name(self.executable())
    }

    /// Optional-content (DLC) directory, relative to the installation root.
    pub fn dlc_dir(&self) -> &'static str {
        match self {
            Game::Me1 => "DLC",
            Game::Me2 => "BioGame\\DLC",
            Game::Me3 => "BIOGame\\DLC",
        }
    }

    /// Relative prefix of per-user configuration files (lookup-key form).
    ///
    /// Anything below it is user-owned and never judged.
    pub fn user_config_prefix(&self) -> &'static str {
        "biogame\\config\\"
    }

    /// Save/config directory below the user's Documents folder.
    pub fn documents_subdir(&self) -> PathBuf {
        Path::new("BioWare").join(self.name())
    }

    /// Asset whose trailing bytes reveal a texture-modified installation.
    pub fn texture_marker_asset(&self) -> &'static str {
        match self {
            Game::Me1 => "BioGame\\CookedPC\\testVolumeLight_VFX.upk",
            Game::Me2 => "BioGame\\CookedPC\\BIOC_Materials.pcc",
            Game::Me3 => "BIOGame\\CookedPCConsole\\adv_combat_tutorial_xbox_D_Int.afc",
        }
    }

    /// Asset only present in the regional (Polish) build, if the title has one.
    pub fn regional_variant_asset(&self) -> Option<&'static str> {
        match self {
            Game::Me1 => Some("BioGame\\CookedPC\\Movies\\niebieska_pl.bik"),
            Game::Me2 | Game::Me3 => None,
        }
    }

    /// Sealed container format for optional content, if the title uses one.
    pub fn sealed_archive(&self) -> Option<SealedArchive> {
        match self {
            Game::Me3 => Some(SealedArchive {
                extension: "sfar",
                stub_size: 32,
            }),
            Game::Me1 | Game::Me2 => None,
        }
    }

    /// Manifest asset name (without extension) for the given build variant.
    pub fn manifest_asset(&self, regional_variant: bool) -> &'static str {
        match (self, regional_variant) {
            (Game::Me1, true) => "ME1PL",
            (Game::Me1, false) => "ME1",
            (Game::Me2, _) => "ME2",
            (Game::Me3, _) => "ME3",
        }
    }

    /// Officially released optional-content package folder names.
    pub fn official_dlc(&self) -> &'static [&'static str] {
        dlc::official(*self)
    }

    /// Checks whether a package folder name is an official release (case-insensitive).
    pub fn is_official_dlc(&self, folder: &str) -> bool {
        self.official_dlc()
            .iter()
            .any(|name| name.eq_ignore_ascii_case(folder))
    }

    /// Settings-store key holding this title's backup location.
    pub fn backup_key(&self) -> String {
        format!("{}VanillaBackupLocation", self.code())
    }
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Checks whether a directory has the canonical layout of an installation of `game`.
pub fn looks_like_installation(game: Game, path: &Path) -> bool {
    path.is_dir()
        && game.canonical_dirs().iter().all(|dir| {
            crate::paths::resolve_case_insensitive(path, dir)
                .map(|p| p.is_dir())
                .unwrap_or(false)
        })
}

/// True when `path` is a vanilla backup rather than a live installation.
pub fn is_marked_backup(path: &Path) -> bool {
    path.join(BACKUP_MARKER_FILE).is_file()
}

/// Extensions of files that count as loose optional-content data.
pub fn is_tracked_content_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "pcc" | "tfc" | "afc" | "bik" | "tlk" | "cnd" | "bin" | "usf" | "isb"
    )
}

/// Opaque "is this a game package" predicate.
pub fn is_package_file(path: &str) -> bool {
    matches!(
        crate::paths::extension(path)
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("pcc" | "sfm" | "u" | "upk" | "xxx")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_game_properties() {
        assert_eq!(Game::Me3.name(), "Mass Effect 3");
        assert_eq!(Game::Me3.process_name(), "MassEffect3.exe");
        assert_eq!(Game::Me2.dlc_dir(), "BioGame\\DLC");
        assert_eq!(Game::Me1.manifest_asset(true), "ME1PL");
        assert_eq!(Game::Me2.manifest_asset(true), "ME2");
        assert_eq!(Game::Me3.sealed_archive().map(|a| a.stub_size), Some(32));
        assert!(Game::Me1.sealed_archive().is_none());
        assert_eq!(Game::Me3.backup_key(), "ME3VanillaBackupLocation");
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Game::from_code("me2"), Some(Game::Me2));
        assert_eq!(Game::from_code("ME3"), Some(Game::Me3));
        assert_eq!(Game::from_code("me4"), None);
    }

    #[test]
    fn test_official_dlc() {
        assert!(Game::Me3.is_official_dlc("dlc_con_end"));
        assert!(Game::Me1.is_official_dlc("DLC_UNC"));
        assert!(!Game::Me3.is_official_dlc("DLC_MOD_EGM"));
    }

    #[test]
    fn test_looks_like_installation() {
        let dir = TempDir::new().unwrap();
        assert!(!looks_like_installation(Game::Me3, dir.path()));

        std::fs::create_dir_all(dir.path().join("biogame")).unwrap();
        std::fs::create_dir_all(dir.path().join("Binaries")).unwrap();
        assert!(looks_like_installation(Game::Me3, dir.path()));
        assert!(!is_marked_backup(dir.path()));

        // A backup has the same layout but is never a live installation
        std::fs::write(dir.path().join(BACKUP_MARKER_FILE), "backup").unwrap();
        assert!(is_marked_backup(dir.path()));
    }

    #[test]
    fn test_content_predicates() {
        assert!(is_tracked_content_extension("PCC"));
        assert!(!is_tracked_content_extension("sfar"));
        assert!(is_package_file("BIOGame\\CookedPCConsole\\Startup.pcc"));
        assert!(!is_package_file("Binaries\\Win32\\MassEffect3.exe"));
    }
}
