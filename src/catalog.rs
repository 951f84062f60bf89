//! Registered backup location per title.
//!
//! The only state this crate persists: one string per title in a small
//! key-value store. A stored path only counts as a usable backup while it
//! still looks like an installation of that title and carries the marker
//! file. The store is not safe for concurrent writers in several processes.

use crate::games::{looks_like_installation, Game, BACKUP_MARKER_FILE};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings store {} could not be accessed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings store {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One string value per key, read and written atomically.
pub trait SettingsStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `None` removes the key.
    fn write(&self, key: &str, value: Option<&str>) -> Result<(), StoreError>;
}

/// JSON object on disk, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let content = serde_json::to_string_pretty(map).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load_map()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let mut map = self.load_map()?;
        match value {
            Some(value) => map.insert(key.to_string(), value.to_string()),
            None => map.remove(key),
        };
        self.save_map(&map)
    }
}

/// In-process store for headless use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl SettingsStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        match value {
            Some(value) => values.insert(key.to_string(), value.to_string()),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// What the catalog knows about a title's backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    NotConfigured,
    Unusable { path: PathBuf, reason: String },
    Usable(PathBuf),
}

/// Registered backup locations.
pub struct BackupCatalog {
    store: Box<dyn SettingsStore>,
}

impl BackupCatalog {
    pub fn new(store: impl SettingsStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Stored path for `game`, without any validity checks.
    pub fn stored_path(&self, game: Game) -> Option<PathBuf> {
        match self.store.read(&game.backup_key()) {
            Ok(value) => value.filter(|v| !v.is_empty()).map(PathBuf::from),
            Err(e) => {
                warn!("Backup location for {} unavailable: {}", game, e);
                None
            }
        }
    }

    /// Full status of the registered backup, with the reason it is unusable.
    pub fn status(&self, game: Game) -> BackupStatus {
        let Some(path) = self.stored_path(game) else {
            return BackupStatus::NotConfigured;
        };

        let reason = if !path.is_dir() {
            Some("directory does not exist".to_string())
        } else if !looks_like_installation(game, &path) {
            let [first, second] = game.canonical_dirs();
            Some(format!("missing {} or {} directory", first, second))
        } else if !path.join(BACKUP_MARKER_FILE).is_file() {
            Some(format!("missing {} marker file", BACKUP_MARKER_FILE))
        } else {
            None
        };

        match reason {
            Some(reason) => BackupStatus::Unusable { path, reason },
            None => BackupStatus::Usable(path),
        }
    }

    /// Usable backup location for `game`, if any.
    pub fn get(&self, game: Game) -> Option<PathBuf> {
        match self.status(game) {
            BackupStatus::Usable(path) => Some(path),
            BackupStatus::Unusable { path, reason } => {
                info!(
                    "Backup for {} at {} is not usable: {}",
                    game,
                    path.display(),
                    reason
                );
                None
            }
            BackupStatus::NotConfigured => {
                debug!("No backup registered for {}", game);
                None
            }
        }
    }

    pub fn set(&self, game: Game, path: &Path) -> Result<(), StoreError> {
        info!("Registering backup for {} at {}", game, path.display());
        self.store
            .write(&game.backup_key(), Some(&path.to_string_lossy()))
    }

    /// Forget the backup: delete its marker file and clear the stored path.
    pub fn unlink(&self, game: Game) -> Result<(), StoreError> {
        if let Some(path) = self.stored_path(game) {
            let marker = path.join(BACKUP_MARKER_FILE);
            if marker.exists() {
                if let Err(e) = std::fs::remove_file(&marker) {
                    warn!("Could not delete {}: {}", marker.display(), e);
                }
            }
            info!("Unlinked backup for {} at {}", game, path.display());
        }
        self.store.write(&game.backup_key(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::TempDir;

    #[test]
    fn test_json_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("cfg").join("backups.json"));

        assert_eq!(store.read("ME3VanillaBackupLocation").unwrap(), None);
        store.write("ME3VanillaBackupLocation", Some("/backups/me3")).unwrap();
        store.write("ME2VanillaBackupLocation", Some("/backups/me2")).unwrap();
        assert_eq!(
            store.read("ME3VanillaBackupLocation").unwrap().as_deref(),
            Some("/backups/me3")
        );

        store.write("ME3VanillaBackupLocation", None).unwrap();
        assert_eq!(store.read("ME3VanillaBackupLocation").unwrap(), None);
        assert!(store.read("ME2VanillaBackupLocation").unwrap().is_some());
    }

    #[test]
    fn test_corrupt_store_degrades_to_no_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backups.json");
        std::fs::write(&path, "{not json").unwrap();

        let catalog = BackupCatalog::new(JsonFileStore::new(&path));
        assert_eq!(catalog.get(Game::Me3), None);
        assert_eq!(catalog.status(Game::Me3), BackupStatus::NotConfigured);
    }

    #[test]
    fn test_usable_backup_checks() {
        let dir = TempDir::new().unwrap();
        let backup = dir.path().join("ME3 Backup");
        let catalog = BackupCatalog::new(MemoryStore::default());

        catalog.set(Game::Me3, &backup).unwrap();
        assert!(matches!(catalog.status(Game::Me3), BackupStatus::Unusable { .. }));

        testutil::make_layout(Game::Me3, &backup);
        match catalog.status(Game::Me3) {
            BackupStatus::Unusable { reason, .. } => assert!(reason.contains("marker")),
            other => panic!("unexpected status {:?}", other),
        }

        std::fs::write(backup.join(BACKUP_MARKER_FILE), "test").unwrap();
        assert_eq!(catalog.get(Game::Me3), Some(backup.clone()));
    }

    #[test]
    fn test_unlink_removes_marker() {
        let dir = TempDir::new().unwrap();
        let backup = dir.path().join("backup");
        testutil::make_layout(Game::Me2, &backup);
        std::fs::write(backup.join(BACKUP_MARKER_FILE), "test").unwrap();

        let catalog = BackupCatalog::new(MemoryStore::default());
        catalog.set(Game::Me2, &backup).unwrap();
        assert!(catalog.get(Game::Me2).is_some());

        catalog.unlink(Game::Me2).unwrap();
        assert!(!backup.join(BACKUP_MARKER_FILE).exists());
        assert_eq!(catalog.stored_path(Game::Me2), None);
        assert!(backup.is_dir());
    }
}
