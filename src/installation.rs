//! A game installation on disk and the facts derived from it.
//!
//! Derived flags (texture-modified, regional build) are never persisted; they
//! are recomputed whenever the installation is loaded or reloaded.

use crate::games::{Game, TEXTURE_MARKER_TAG};
use crate::paths;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Installation {
    pub game: Game,
    pub root: PathBuf,
    /// A texture tool has been run on this installation
    pub texture_modded: bool,
    /// Regional (Polish) build with its own vanilla manifest
    pub regional_variant: bool,
}

impl Installation {
    pub fn load(game: Game, root: impl Into<PathBuf>) -> Self {
        let mut installation = Self {
            game,
            root: root.into(),
            texture_modded: false,
            regional_variant: false,
        };
        installation.reload();
        installation
    }

    /// Recompute derived flags from disk.
    pub fn reload(&mut self) {
        self.texture_modded = self
            .resolve(self.game.texture_marker_asset())
            .map(|path| has_trailing_tag(&path, TEXTURE_MARKER_TAG))
            .unwrap_or(false);

        self.regional_variant = self
            .game
            .regional_variant_asset()
            .and_then(|asset| self.resolve(asset))
            .is_some();

        debug!(
            "{} at {}: texture_modded={} regional_variant={}",
            self.game,
            self.root.display(),
            self.texture_modded,
            self.regional_variant
        );
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Resolve a Windows-style relative path case-insensitively.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        paths::resolve_case_insensitive(&self.root, relative)
    }

    /// Optional-content directory, whether or not it exists yet.
    pub fn dlc_root(&self) -> PathBuf {
        self.resolve(self.game.dlc_dir())
            .unwrap_or_else(|| paths::join_windows_path(&self.root, self.game.dlc_dir()))
    }

    /// Folder names of installed optional-content packages.
    pub fn installed_dlc(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.dlc_root()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.to_ascii_uppercase().starts_with("DLC_"))
            .collect();
        names.sort();
        names
    }

    /// Installed packages that are not official releases.
    pub fn unofficial_dlc(&self) -> Vec<String> {
        self.installed_dlc()
            .into_iter()
            .filter(|name| !self.game.is_official_dlc(name))
            .collect()
    }

    /// Official packages that are not installed.
    pub fn missing_official_dlc(&self) -> Vec<String> {
        let installed = self.installed_dlc();
        self.game
            .official_dlc()
            .iter()
            .filter(|name| !installed.iter().any(|i| i.eq_ignore_ascii_case(name)))
            .map(|name| name.to_string())
            .collect()
    }

    /// Sealed archives of the installed official packages.
    pub fn official_archives(&self) -> Vec<PathBuf> {
        let Some(sealed) = self.game.sealed_archive() else {
            return Vec::new();
        };
        let dlc_root = self.dlc_root();
        let mut archives = Vec::new();

        for name in self.installed_dlc() {
            if !self.game.is_official_dlc(&name) {
                continue;
            }
            for entry in WalkDir::new(dlc_root.join(&name))
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let is_archive = entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(sealed.extension))
                    .unwrap_or(false);
                if is_archive {
                    archives.push(entry.into_path());
                }
            }
        }
        archives
    }

    /// Leftover texture-tool cache files (`TexturesMEM*.tfc`).
    pub fn texture_cache_leftovers(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_ascii_lowercase();
                name.starts_with("texturesmem") && name.ends_with(".tfc")
            })
            .map(|e| e.into_path())
            .collect()
    }
}

/// Total file count and bytes below `path`.
pub fn tree_size(path: &Path) -> (u64, u64) {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(files, bytes), e| {
            (files + 1, bytes + e.metadata().map(|m| m.len()).unwrap_or(0))
        })
}

/// Whether a file ends with exactly `tag`.
pub fn has_trailing_tag(path: &Path, tag: &[u8]) -> bool {
    read_tail(path, tag.len()).map(|tail| tail == tag).unwrap_or(false)
}

/// Read the last `len` bytes of a file.
pub fn read_tail(path: &Path, len: usize) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size < len as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "file shorter than tag",
        ));
    }
    file.seek(SeekFrom::End(-(len as i64)))?;
    let mut tail = vec![0u8; len];
    file.read_exact(&mut tail)?;
    Ok(tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::TempDir;

    #[test]
    fn test_derived_flags() {
        let dir = TempDir::new().unwrap();
        testutil::make_layout(Game::Me1, dir.path());

        let mut install = Installation::load(Game::Me1, dir.path());
        assert!(!install.texture_modded);
        assert!(!install.regional_variant);

        testutil::write(dir.path(), "BioGame/CookedPC/Movies/niebieska_pl.bik", b"pl");
        let mut marker = b"package data".to_vec();
        marker.extend_from_slice(TEXTURE_MARKER_TAG);
        testutil::write(dir.path(), "BioGame/CookedPC/testVolumeLight_VFX.upk", &marker);

        install.reload();
        assert!(install.texture_modded);
        assert!(install.regional_variant);
    }

    #[test]
    fn test_dlc_inventory() {
        let dir = TempDir::new().unwrap();
        testutil::make_layout(Game::Me3, dir.path());
        testutil::write(dir.path(), "BIOGame/DLC/DLC_CON_END/CookedPCConsole/Default.sfar", &[0u8; 64]);
        testutil::write(dir.path(), "BIOGame/DLC/DLC_MOD_Example/CookedPCConsole/Mount.dlc", b"m");

        let install = Installation::load(Game::Me3, dir.path());
        assert_eq!(install.installed_dlc(), vec!["DLC_CON_END", "DLC_MOD_Example"]);
        assert_eq!(install.unofficial_dlc(), vec!["DLC_MOD_Example"]);
        assert!(install.missing_official_dlc().contains(&"DLC_HEN_PR".to_string()));
        assert!(!install.missing_official_dlc().contains(&"DLC_CON_END".to_string()));
        assert_eq!(install.official_archives().len(), 1);
    }

    #[test]
    fn test_texture_cache_leftovers() {
        let dir = TempDir::new().unwrap();
        testutil::make_layout(Game::Me3, dir.path());
        testutil::write(dir.path(), "BIOGame/CookedPCConsole/TexturesMEM00.tfc", b"cache");
        testutil::write(dir.path(), "BIOGame/CookedPCConsole/Textures.tfc", b"vanilla");

        let install = Installation::load(Game::Me3, dir.path());
        assert_eq!(install.texture_cache_leftovers().len(), 1);
    }

    #[test]
    fn test_read_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"abcdMEMI").unwrap();
        assert!(has_trailing_tag(&path, b"MEMI"));
        assert!(!has_trailing_tag(&path, b"abcdefghijk"));
        assert_eq!(read_tail(&path, 2).unwrap(), b"MI");
    }
}
