//! Vanilla integrity database
//!
//! A manifest maps every file an official build ships to the list of
//! `(size, md5)` signatures it may legitimately have. Multiple candidates
//! cover regional/platform variants of the same file.

pub mod format;
mod store;

pub use store::{DirectorySource, ManifestError, ManifestSource, ManifestStore};

use crate::paths;
use std::collections::HashMap;

/// One valid signature of a shipped file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Size in bytes
    pub size: u64,
    /// 32-char lowercase hex MD5
    pub md5: String,
}

/// All valid signatures of one relative path.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Normalized relative path (lowercase, backslashes, no leading separator)
    pub relative_path: String,
    /// Never empty
    pub candidates: Vec<Candidate>,
}

/// Decoded manifest for one title/build.
#[derive(Debug, Default)]
pub struct Manifest {
    entries: HashMap<String, ManifestEntry>,
}

impl Manifest {
    /// Add a candidate, merging with any existing entry for the same path.
    pub fn insert(&mut self, relative_path: &str, candidate: Candidate) {
        let key = paths::normalize_for_lookup(relative_path);
        self.entries
            .entry(key.clone())
            .or_insert_with(|| ManifestEntry {
                relative_path: key,
                candidates: Vec::new(),
            })
            .candidates
            .push(candidate);
    }

    /// Case-insensitive lookup by relative path (either separator style).
    pub fn lookup(&self, relative_path: &str) -> Option<&[Candidate]> {
        self.entries
            .get(&paths::normalize_for_lookup(relative_path))
            .map(|e| e.candidates.as_slice())
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
