//! Directory tree copy and mirror.
//!
//! Both operations copy file contents through a buffer so callers get
//! per-byte progress, and give every copied file the source's modification
//! time. A failing file stops the batch and is reported with its path.

use crate::operation::CopyError;
use crate::paths;
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

const BUFFER_SIZE: usize = 1024 * 1024;

/// Progress information for the copy operation.
#[derive(Debug, Clone)]
pub struct CopyProgress {
    /// Files handled so far, including the current one.
    pub files_done: u64,
    /// Total number of files to handle.
    pub total_files: u64,
    /// Bytes copied so far.
    pub bytes_done: u64,
    /// Total bytes that may need copying.
    pub total_bytes: u64,
    /// Relative path (lookup-key form) of the current file.
    pub current: String,
    /// Size of the current file.
    pub current_size: u64,
}

/// Result of a full tree copy.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Result of a mirror.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorStats {
    /// Files transferred because they were missing or different
    pub copied: u64,
    /// Files left alone because size and timestamp already matched
    pub preserved: u64,
    /// Extraneous files and directories removed from the destination
    pub deleted: u64,
    pub bytes: u64,
}

fn copy_err(path: &Path) -> impl FnOnce(std::io::Error) -> CopyError + '_ {
    move |source| CopyError {
        path: path.to_path_buf(),
        source,
    }
}

/// Copy one file with buffered reads, reporting each written chunk,
/// then apply the source's permissions and modification time.
pub fn copy_file<F>(source: &Path, dest: &Path, mut on_chunk: F) -> Result<u64, CopyError>
where
    F: FnMut(u64),
{
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(copy_err(dest))?;
    }

    let metadata = fs::metadata(source).map_err(copy_err(source))?;
    let mut reader =
        BufReader::with_capacity(BUFFER_SIZE, File::open(source).map_err(copy_err(source))?);
    let mut writer =
        BufWriter::with_capacity(BUFFER_SIZE, File::create(dest).map_err(copy_err(dest))?);

    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let read = reader.read(&mut buf).map_err(copy_err(source))?;
        if read == 0 {
            break;
        }
        writer.write_all(&buf[..read]).map_err(copy_err(dest))?;
        written += read as u64;
        on_chunk(read as u64);
    }
    writer.flush().map_err(copy_err(dest))?;
    drop(writer);

    fs::set_permissions(dest, metadata.permissions()).map_err(copy_err(dest))?;
    filetime::set_file_mtime(dest, FileTime::from_last_modification_time(&metadata))
        .map_err(copy_err(dest))?;

    Ok(written)
}

/// Counts files and bytes under `root` accepted by `include`.
fn count_files_and_bytes<P>(root: &Path, include: &P) -> Result<(u64, u64), CopyError>
where
    P: Fn(&str, bool) -> bool,
{
    let mut files = 0u64;
    let mut bytes = 0u64;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| accepts(root, e, include));
    for entry in walker {
        let entry = entry.map_err(|e| walk_err(root, e))?;
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok((files, bytes))
}

fn accepts<P>(root: &Path, entry: &walkdir::DirEntry, include: &P) -> bool
where
    P: Fn(&str, bool) -> bool,
{
    if entry.depth() == 0 {
        return true;
    }
    match paths::relative_key(root, entry.path()) {
        Some(key) => include(&key, entry.file_type().is_dir()),
        None => false,
    }
}

fn walk_err(root: &Path, e: walkdir::Error) -> CopyError {
    let path = e.path().unwrap_or(root).to_path_buf();
    CopyError {
        path,
        source: e
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
    }
}

/// Recursively copy `source` into `dest`.
///
/// `include(relative_key, is_dir)` filters entries; rejected directories are
/// not descended into. Empty directories are recreated.
pub fn copy_tree<P, F, B>(
    source: &Path,
    dest: &Path,
    include: P,
    mut on_file: F,
    mut on_bytes: B,
) -> Result<CopyStats, CopyError>
where
    P: Fn(&str, bool) -> bool,
    F: FnMut(&CopyProgress),
    B: FnMut(u64, u64),
{
    if !source.is_dir() {
        return Err(CopyError {
            path: source.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "source directory does not exist"),
        });
    }
    fs::create_dir_all(dest).map_err(copy_err(dest))?;

    let (total_files, total_bytes) = count_files_and_bytes(source, &include)?;
    info!(
        "Copying {} files ({:.2} GB) from {} to {}",
        total_files,
        total_bytes as f64 / 1_073_741_824.0,
        source.display(),
        dest.display()
    );

    let mut stats = CopyStats::default();
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| accepts(source, e, &include));

    for entry in walker {
        let entry = entry.map_err(|e| walk_err(source, e))?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| CopyError {
                path: entry.path().to_path_buf(),
                source: std::io::Error::other("path escaped the source tree"),
            })?;
        let dest_path = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path).map_err(copy_err(&dest_path))?;
        } else if entry.file_type().is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            on_file(&CopyProgress {
                files_done: stats.files + 1,
                total_files,
                bytes_done: stats.bytes,
                total_bytes,
                current: paths::relative_key(source, entry.path()).unwrap_or_default(),
                current_size: size,
            });

            let mut done = stats.bytes;
            stats.bytes += copy_file(entry.path(), &dest_path, |chunk| {
                done += chunk;
                on_bytes(done, total_bytes);
            })?;
            stats.files += 1;
        }
        // Symlinks are not part of shipped game trees
    }

    info!("Copied {} files ({} bytes)", stats.files, stats.bytes);
    Ok(stats)
}

/// Whether `dest` already holds the same file as `source` (length and whole-second mtime).
pub fn same_file_state(source: &fs::Metadata, dest: &Path) -> bool {
    match fs::metadata(dest) {
        Ok(meta) if meta.is_file() => {
            meta.len() == source.len()
                && FileTime::from_last_modification_time(&meta).unix_seconds()
                    == FileTime::from_last_modification_time(source).unix_seconds()
        }
        _ => false,
    }
}

/// Make `dest` identical to the part of `source` accepted by `include`:
/// delete extraneous entries, copy missing or changed files, leave identical
/// files alone.
pub fn mirror<P, F, B>(
    source: &Path,
    dest: &Path,
    include: P,
    mut on_file: F,
    mut on_bytes: B,
) -> Result<MirrorStats, CopyError>
where
    P: Fn(&str, bool) -> bool,
    F: FnMut(&CopyProgress),
    B: FnMut(u64, u64),
{
    if !source.is_dir() {
        return Err(CopyError {
            path: source.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "source directory does not exist"),
        });
    }
    fs::create_dir_all(dest).map_err(copy_err(dest))?;

    let mut stats = MirrorStats::default();

    // Purge first, children before parents
    for entry in WalkDir::new(dest).follow_links(false).contents_first(true) {
        let entry = entry.map_err(|e| walk_err(dest, e))?;
        if entry.depth() == 0 {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dest) else {
            continue;
        };
        let counterpart = source.join(relative);
        let is_dir = entry.file_type().is_dir();
        let wanted = paths::relative_key(dest, entry.path())
            .map(|key| include(&key, is_dir))
            .unwrap_or(false);

        if is_dir {
            if !wanted || !counterpart.is_dir() {
                fs::remove_dir_all(entry.path()).map_err(copy_err(entry.path()))?;
                debug!("Removed extraneous directory {}", entry.path().display());
                stats.deleted += 1;
            }
        } else if !wanted || !counterpart.is_file() {
            fs::remove_file(entry.path()).map_err(copy_err(entry.path()))?;
            debug!("Removed extraneous file {}", entry.path().display());
            stats.deleted += 1;
        }
    }

    let (total_files, total_bytes) = count_files_and_bytes(source, &include)?;
    info!(
        "Mirroring {} files ({:.2} GB) from {} to {}",
        total_files,
        total_bytes as f64 / 1_073_741_824.0,
        source.display(),
        dest.display()
    );

    let mut handled = 0u64;
    let mut done = 0u64;
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| accepts(source, e, &include));
    for entry in walker {
        let entry = entry.map_err(|e| walk_err(source, e))?;
        if entry.depth() == 0 {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let dest_path = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path).map_err(copy_err(&dest_path))?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| walk_err(source, e))?;
        handled += 1;
        on_file(&CopyProgress {
            files_done: handled,
            total_files,
            bytes_done: done,
            total_bytes,
            current: paths::relative_key(source, entry.path()).unwrap_or_default(),
            current_size: metadata.len(),
        });

        if same_file_state(&metadata, &dest_path) {
            stats.preserved += 1;
            done += metadata.len();
            on_bytes(done, total_bytes);
            continue;
        }

        let copied = copy_file(entry.path(), &dest_path, |chunk| {
            done += chunk;
            on_bytes(done, total_bytes);
        })?;
        stats.copied += 1;
        stats.bytes += copied;
    }

    info!(
        "Mirror complete: {} copied, {} preserved, {} deleted",
        stats.copied, stats.preserved, stats.deleted
    );
    Ok(stats)
}

/// Remove everything inside `dir`, keeping `dir` itself.
pub fn clear_directory(dir: &Path) -> Result<u64, CopyError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).map_err(copy_err(dir))? {
        let entry = entry.map_err(copy_err(dir))?;
        let path = entry.path();
        let is_dir = entry.file_type().map_err(copy_err(&path))?.is_dir();
        if is_dir {
            fs::remove_dir_all(&path).map_err(copy_err(&path))?;
        } else {
            fs::remove_file(&path).map_err(copy_err(&path))?;
        }
        removed += 1;
    }
    Ok(removed)
}
