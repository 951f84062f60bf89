//! Per-title manifest cache
//!
//! Manifests are decoded lazily on first use and kept for the lifetime of the
//! store. The only thing that forces a reload is a change of the regional
//! variant flag: the default and regional builds of a title have disjoint
//! vanilla hashes, so the two manifests are never merged.

use super::format::{self, FormatError};
use super::Manifest;
use crate::games::Game;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Manifest load failures. Either one means "this title cannot be validated".
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("vanilla manifest {asset} for {game} is not available: {reason}")]
    Unavailable {
        game: Game,
        asset: String,
        reason: String,
    },

    #[error("vanilla manifest {asset} for {game} is corrupt: {source}")]
    Corrupt {
        game: Game,
        asset: String,
        #[source]
        source: FormatError,
    },
}

/// Where manifest bytes come from.
pub trait ManifestSource: Send + Sync {
    /// Raw bytes of a manifest asset; `Ok(None)` when the asset does not exist.
    fn read(&self, asset: &str) -> std::io::Result<Option<Vec<u8>>>;
}

/// Reads `<dir>/<asset>.bin`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ManifestSource for DirectorySource {
    fn read(&self, asset: &str) -> std::io::Result<Option<Vec<u8>>> {
        let path = self.dir.join(format!("{}.bin", asset));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

struct Cached {
    regional_variant: bool,
    manifest: Arc<Manifest>,
}

/// Lazily-populated manifest cache, one entry per title.
pub struct ManifestStore {
    source: Box<dyn ManifestSource>,
    cache: Mutex<HashMap<Game, Cached>>,
}

impl ManifestStore {
    pub fn new(source: impl ManifestSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get the manifest for `game`, decoding it on first use.
    ///
    /// Titles without a regional build ignore `regional_variant`.
    pub fn load(&self, game: Game, regional_variant: bool) -> Result<Arc<Manifest>, ManifestError> {
        let regional_variant = regional_variant && game.regional_variant_asset().is_some();
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = cache.get(&game) {
            if cached.regional_variant == regional_variant {
                return Ok(Arc::clone(&cached.manifest));
            }
            info!(
                "Regional variant flag for {} changed to {}, reloading manifest",
                game, regional_variant
            );
        }

        let asset = game.manifest_asset(regional_variant);
        let bytes = match self.source.read(asset) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("Vanilla manifest {} for {} is missing", asset, game);
                return Err(ManifestError::Unavailable {
                    game,
                    asset: asset.to_string(),
                    reason: "asset not found".to_string(),
                });
            }
            Err(e) => {
                warn!("Could not read vanilla manifest {} for {}: {}", asset, game, e);
                return Err(ManifestError::Unavailable {
                    game,
                    asset: asset.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let manifest = format::decode(&bytes).map_err(|source| ManifestError::Corrupt {
            game,
            asset: asset.to_string(),
            source,
        })?;
        debug!("Decoded {} with {} entries", asset, manifest.len());

        let manifest = Arc::new(manifest);
        cache.insert(
            game,
            Cached {
                regional_variant,
                manifest: Arc::clone(&manifest),
            },
        );
        Ok(manifest)
    }

    /// Drop the cached manifest for `game`; the next load decodes again.
    pub fn invalidate(&self, game: Game) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&game);
    }
}
