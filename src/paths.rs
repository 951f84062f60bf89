//! Case-insensitive path handling for Windows-style game paths
//!
//! Manifests and game data use Windows-style relative paths with backslashes.
//! This module handles:
//! - Normalizing relative paths into manifest lookup keys
//! - Case-insensitive file lookups (Windows is case-insensitive, Linux is not)
//! - Containment checks between directories chosen by the user

use std::path::{Component, Path, PathBuf};

/// Convert Windows path separators to the native separator
/// `BIOGame\DLC\DLC_CON_END` -> `BIOGame/DLC/DLC_CON_END` on Linux
pub fn to_native_path(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.replace('\\', "/")
    }
}

/// Normalize a relative path into the manifest key form
/// (lowercase, backslashes, no leading separator)
pub fn normalize_for_lookup(path: &str) -> String {
    path.to_lowercase()
        .replace('/', "\\")
        .trim_start_matches('\\')
        .to_string()
}

/// Render a path relative to `root` in manifest key form.
///
/// Returns `None` when `path` is not under `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    Some(normalize_for_lookup(&parts.join("\\")))
}

/// Find a file case-insensitively within a directory
///
/// Given a base directory and a relative path like `BIOGame\CookedPCConsole\Startup.pcc`,
/// finds the actual file even if the real path is `biogame/cookedpcconsole/STARTUP.pcc`
pub fn resolve_case_insensitive(base: &Path, relative: &str) -> Option<PathBuf> {
    let components: Vec<&str> = relative
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .collect();

    if components.is_empty() {
        return Some(base.to_path_buf());
    }

    let mut current = base.to_path_buf();

    for component in components {
        // Fast path: exact case exists
        let exact = current.join(component);
        if exact.exists() {
            current = exact;
            continue;
        }

        let found = std::fs::read_dir(&current).ok()?.find_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            if name.to_string_lossy().eq_ignore_ascii_case(component) {
                Some(entry.path())
            } else {
                None
            }
        });

        match found {
            Some(path) => current = path,
            None => return None,
        }
    }

    Some(current)
}

/// Get the filename from a path (handles both / and \)
pub fn file_name(path: &str) -> &str {
    path.rfind(['\\', '/'])
        .map(|idx| &path[idx + 1..])
        .unwrap_or(path)
}

/// Get file extension (as written, without the dot)
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    name.rfind('.').map(|idx| &name[idx + 1..])
}

/// Join a base path with a Windows-style relative path
pub fn join_windows_path(base: &Path, relative: &str) -> PathBuf {
    base.join(to_native_path(relative))
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the rest.
///
/// Destination folders picked by the user frequently don't exist yet, so plain
/// `canonicalize` is not enough.
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut result = canonical;
            for part in tail.iter().rev() {
                result.push(part);
            }
            return result;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn comparable(path: &Path) -> Vec<String> {
    canonicalize_lenient(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy().to_string()),
            _ => None,
        })
        .map(|part| if cfg!(windows) { part.to_lowercase() } else { part })
        .collect()
}

/// True when `path` is `base` or lives somewhere below it
pub fn is_same_or_within(path: &Path, base: &Path) -> bool {
    let path = comparable(path);
    let base = comparable(base);
    path.len() >= base.len() && path[..base.len()] == base[..]
}

/// True when either path is the other or lives below it
pub fn overlaps(a: &Path, b: &Path) -> bool {
    is_same_or_within(a, b) || is_same_or_within(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_for_lookup("BIOGame/CookedPCConsole/Startup.pcc"),
            "biogame\\cookedpcconsole\\startup.pcc"
        );
        assert_eq!(normalize_for_lookup("\\Binaries\\Win32\\MassEffect3.exe"), "binaries\\win32\\masseffect3.exe");
    }

    #[test]
    fn test_relative_key() {
        let root = Path::new("/games/me3");
        let file = root.join("BIOGame").join("DLC").join("Default.sfar");
        assert_eq!(relative_key(root, &file).as_deref(), Some("biogame\\dlc\\default.sfar"));
        assert_eq!(relative_key(root, Path::new("/elsewhere/file")), None);
    }

    #[test]
    fn test_file_name_and_extension() {
        assert_eq!(file_name("BIOGame\\CookedPCConsole\\Startup.pcc"), "Startup.pcc");
        assert_eq!(file_name("Startup.pcc"), "Startup.pcc");
        assert_eq!(extension("DLC/Default.sfar"), Some("sfar"));
        assert_eq!(extension("noext"), None);
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("BIOGame").join("CookedPCConsole")).unwrap();
        std::fs::write(dir.path().join("BIOGame/CookedPCConsole/Startup.pcc"), b"x").unwrap();

        let found = resolve_case_insensitive(dir.path(), "biogame\\cookedpcconsole\\STARTUP.PCC");
        assert_eq!(found, Some(dir.path().join("BIOGame/CookedPCConsole/Startup.pcc")));
        assert_eq!(resolve_case_insensitive(dir.path(), "biogame\\missing.pcc"), None);
    }

    #[test]
    fn test_containment() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("Mass Effect 3");
        std::fs::create_dir_all(&base).unwrap();

        assert!(is_same_or_within(&base, &base));
        // Non-existent children still compare correctly
        assert!(is_same_or_within(&base.join("Backups").join("new"), &base));
        assert!(!is_same_or_within(&dir.path().join("Mass Effect"), &base));

        assert!(overlaps(&base, &base.join("Backups")));
        assert!(overlaps(&base.join("Backups"), &base));
        assert!(!overlaps(&base.join("Backups"), &base.join("Saves")));
    }
}
