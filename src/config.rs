//! Settings management for vanilla-vault
//!
//! Stores user preferences in ~/.config/vanilla-vault/settings.json

use crate::games::{Game, Language};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// How a backup is copied back onto a live installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreStrategy {
    /// Delete extraneous files, copy changed ones, keep identical ones
    #[default]
    Mirror,
    /// Delete the whole installation, then copy the whole backup
    Legacy,
}

/// User settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Directory holding the compiled vanilla manifests (ME1.bin, ME1PL.bin, ...)
    #[serde(default)]
    pub manifest_dir: String,

    /// Tracked live installation per title
    #[serde(default)]
    pub installations: BTreeMap<Game, PathBuf>,

    #[serde(default)]
    pub restore_strategy: RestoreStrategy,

    /// Languages kept when creating a backup (empty = all)
    #[serde(default)]
    pub backup_languages: Vec<Language>,

    /// Directory for log files (empty = config dir)
    #[serde(default)]
    pub log_dir: String,
}

impl Settings {
    /// Get the config directory path (~/.config/vanilla-vault)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("vanilla-vault");

        Ok(config_dir)
    }

    /// Get the settings file path
    fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path().and_then(|path| Self::load_from(&path)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load settings: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load settings from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Manifest directory, falling back to `<config dir>/manifests`
    pub fn manifest_dir(&self) -> PathBuf {
        if !self.manifest_dir.is_empty() {
            return PathBuf::from(&self.manifest_dir);
        }
        Self::config_dir()
            .map(|dir| dir.join("manifests"))
            .unwrap_or_else(|_| PathBuf::from("manifests"))
    }

    /// Log directory, falling back to `<config dir>/logs`
    pub fn log_dir(&self) -> PathBuf {
        if !self.log_dir.is_empty() {
            return PathBuf::from(&self.log_dir);
        }
        Self::config_dir()
            .map(|dir| dir.join("logs"))
            .unwrap_or_else(|_| PathBuf::from("logs"))
    }

    /// Tracked installation for a title
    pub fn installation(&self, game: Game) -> Option<&Path> {
        self.installations.get(&game).map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(settings.installations.is_empty());
        assert_eq!(settings.restore_strategy, RestoreStrategy::Mirror);
        assert!(settings.backup_languages.is_empty());
    }

    #[test]
    fn test_settings_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings
            .installations
            .insert(Game::Me3, PathBuf::from("/games/Mass Effect 3"));
        settings.restore_strategy = RestoreStrategy::Legacy;
        settings.backup_languages = vec![Language::German];
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(
            loaded.installation(Game::Me3),
            Some(Path::new("/games/Mass Effect 3"))
        );
        assert_eq!(loaded.restore_strategy, RestoreStrategy::Legacy);
        assert_eq!(loaded.backup_languages, vec![Language::German]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let loaded: Settings = serde_json::from_str(r#"{"manifest_dir": "/data/manifests"}"#).unwrap();
        assert_eq!(loaded.manifest_dir(), PathBuf::from("/data/manifests"));
        assert_eq!(loaded.restore_strategy, RestoreStrategy::Mirror);
    }
}
