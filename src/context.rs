//! Application context shared by every command.

use crate::catalog::{BackupCatalog, JsonFileStore};
use crate::config::Settings;
use crate::games::{is_marked_backup, Game};
use crate::installation::Installation;
use crate::manifest::{DirectorySource, ManifestStore};
use crate::operation::{OperationGuard, OperationTicket, PreflightAbort};
use crate::platform::{Platform, SystemPlatform};
use crate::validate::{IntegrityValidator, ValidationError};
use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Owns the manifest cache, the backup catalog and the per-title operation flags.
pub struct Vault {
    pub settings: Settings,
    pub manifests: ManifestStore,
    pub catalog: BackupCatalog,
    platform: Box<dyn Platform>,
    guard: OperationGuard,
}

impl Vault {
    pub fn new(
        settings: Settings,
        manifests: ManifestStore,
        catalog: BackupCatalog,
        platform: impl Platform + 'static,
    ) -> Self {
        Self {
            settings,
            manifests,
            catalog,
            platform: Box::new(platform),
            guard: OperationGuard::default(),
        }
    }

    /// Context backed by the real file system and operating system.
    pub fn open(settings: Settings) -> Result<Self> {
        let manifest_dir = settings.manifest_dir();
        let store_path = Settings::config_dir()?.join("backups.json");
        debug!(
            "Manifests from {}, backup catalog at {}",
            manifest_dir.display(),
            store_path.display()
        );

        Ok(Self::new(
            settings,
            ManifestStore::new(DirectorySource::new(manifest_dir)),
            BackupCatalog::new(JsonFileStore::new(store_path)),
            SystemPlatform,
        ))
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// Tracked installation of `game`, with derived flags freshly computed.
    ///
    /// A tracked path that carries the backup marker is ignored.
    pub fn installation(&self, game: Game) -> Option<Installation> {
        let root = self.settings.installation(game)?;
        if is_marked_backup(root) {
            warn!("Ignoring tracked {} path {}: it is a vanilla backup", game, root.display());
            return None;
        }
        Some(Installation::load(game, root))
    }

    /// Every tracked installation path, all titles.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.settings.installations.values().cloned().collect()
    }

    pub fn validator_for(&self, installation: &Installation) -> Result<IntegrityValidator, ValidationError> {
        IntegrityValidator::for_installation(&self.manifests, installation)
    }

    /// Mark `game` busy until the returned ticket is dropped.
    pub fn begin(&self, game: Game) -> Result<OperationTicket<'_>, PreflightAbort> {
        self.guard.begin(game)
    }
}
