//! Fixtures shared by the unit tests.

use crate::catalog::{BackupCatalog, MemoryStore};
use crate::config::Settings;
use crate::context::Vault;
use crate::games::Game;
use crate::manifest::{format, Candidate, Manifest, ManifestSource, ManifestStore};
use crate::paths;
use crate::platform::Platform;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Create the canonical top-level directories of an installation.
pub fn make_layout(game: Game, root: &Path) {
    for dir in game.canonical_dirs() {
        std::fs::create_dir_all(root.join(dir)).unwrap();
    }
}

/// Write a file given a Windows- or Unix-style relative path.
pub fn write(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = paths::join_windows_path(root, &relative.replace('/', "\\"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// A file of a fake installation.
#[derive(Debug, Clone)]
pub struct FakeFile {
    pub relative: String,
    pub content: Vec<u8>,
}

impl FakeFile {
    pub fn new(relative: &str, content: &[u8]) -> Self {
        Self {
            relative: relative.to_string(),
            content: content.to_vec(),
        }
    }
}

pub fn write_files(root: &Path, files: &[FakeFile]) {
    for file in files {
        write(root, &file.relative, &file.content);
    }
}

fn candidate(file: &FakeFile) -> Candidate {
    Candidate {
        size: file.content.len() as u64,
        md5: format!("{:x}", md5::compute(&file.content)),
    }
}

/// Manifest listing every file with its current size and hash.
pub fn manifest_for(files: &[FakeFile]) -> Manifest {
    let mut manifest = Manifest::default();
    for file in files {
        manifest.insert(&file.relative, candidate(file));
    }
    manifest
}

/// Encoded manifest bytes for the files.
pub fn manifest_bytes_for(files: &[FakeFile]) -> Vec<u8> {
    let keys: Vec<(String, Candidate)> = files
        .iter()
        .map(|f| (paths::normalize_for_lookup(&f.relative), candidate(f)))
        .collect();
    format::encode(keys.iter().map(|(k, c)| (k.as_str(), c))).unwrap()
}

/// Manifest source serving in-memory assets.
#[derive(Default)]
pub struct StaticSource {
    assets: HashMap<String, Vec<u8>>,
}

impl StaticSource {
    pub fn with(mut self, asset: &str, bytes: Vec<u8>) -> Self {
        self.assets.insert(asset.to_string(), bytes);
        self
    }
}

impl ManifestSource for StaticSource {
    fn read(&self, asset: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.assets.get(asset).cloned())
    }
}

/// Platform with adjustable answers.
#[derive(Clone, Default)]
pub struct FakePlatform {
    pub running: Arc<AtomicBool>,
    pub free_space: Arc<Mutex<Option<u64>>>,
    pub documents: Option<PathBuf>,
}

impl Platform for FakePlatform {
    fn is_running(&self, _game: Game) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn free_space(&self, _path: &Path) -> Option<u64> {
        *self.free_space.lock().unwrap()
    }

    fn documents_dir(&self) -> Option<PathBuf> {
        self.documents.clone()
    }
}

/// A complete headless test world: one ME3 installation whose files are all
/// listed in the manifest, a scratch area and a fake documents folder.
pub struct World {
    pub dir: tempfile::TempDir,
    pub install: PathBuf,
    pub files: Vec<FakeFile>,
    pub platform: FakePlatform,
    pub vault: Vault,
}

pub fn me3_files() -> Vec<FakeFile> {
    vec![
        FakeFile::new("Binaries/Win32/MassEffect3.exe", b"executable image"),
        FakeFile::new("BIOGame/CookedPCConsole/Startup.pcc", b"startup package"),
        FakeFile::new("BIOGame/CookedPCConsole/BioD_Nor.pcc", &[3u8; 4096]),
        FakeFile::new("BIOGame/CookedPCConsole/Textures.tfc", &[5u8; 2048]),
        FakeFile::new("BIOGame/CookedPCConsole/PCConsoleTOC.bin", b"toc"),
        FakeFile::new("BIOGame/Movies/intro.bik", b"cinematic"),
        FakeFile::new("BIOGame/CookedPCConsole/BIOGame_DEU.tlk", b"german text"),
        FakeFile::new("BIOGame/CookedPCConsole/BIOGame_INT.tlk", b"english text"),
    ]
}

impl World {
    pub fn new() -> Self {
        Self::with_files(me3_files())
    }

    pub fn with_files(files: Vec<FakeFile>) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let install = dir.path().join("Mass Effect 3");
        make_layout(Game::Me3, &install);
        write_files(&install, &files);

        let documents = dir.path().join("Documents");
        std::fs::create_dir_all(documents.join("BioWare").join("Mass Effect 3")).unwrap();

        let platform = FakePlatform {
            documents: Some(documents),
            ..FakePlatform::default()
        };

        let mut settings = Settings::default();
        settings.installations.insert(Game::Me3, install.clone());

        let source = StaticSource::default().with("ME3", manifest_bytes_for(&files));
        let vault = Vault::new(
            settings,
            ManifestStore::new(source),
            BackupCatalog::new(MemoryStore::default()),
            platform.clone(),
        );

        Self {
            dir,
            install,
            files,
            platform,
            vault,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
