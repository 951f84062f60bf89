//! Hash utilities for vanilla file verification.
//!
//! Vanilla manifests identify files by MD5, stored on disk with the two
//! nibbles of every byte swapped. This module computes file hashes and
//! converts between the stored and the conventional hex forms.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Compute MD5 of a file and return it as 32 lowercase hex chars.
///
/// Uses streaming to handle large files without loading into memory.
pub fn compute_md5(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(1024 * 1024, file); // 1MB buffer
    let mut buf = vec![0u8; 1024 * 1024];
    let mut context = md5::Context::new();

    loop {
        let bytes_read = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        context.write_all(&buf[..bytes_read])?;
    }

    Ok(format!("{:x}", context.compute()))
}

/// Hex-encode a stored manifest digest (low nibble of each byte first).
pub fn nibble_swapped_hex(bytes: &[u8; 16]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(32);
    for b in bytes {
        out.push(HEX[(b & 0x0f) as usize] as char);
        out.push(HEX[(b >> 4) as usize] as char);
    }
    out
}

/// Inverse of [`nibble_swapped_hex`]: turn a conventional hex digest into stored bytes.
pub fn nibble_swapped_bytes(hex: &str) -> Result<[u8; 16]> {
    let hex = hex.as_bytes();
    if hex.len() != 32 {
        bail!("MD5 digest must be 32 hex chars, got {}", hex.len());
    }

    let nibble = |c: u8| -> Result<u8> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => bail!("invalid hex digit {:?}", c as char),
        }
    };

    let mut out = [0u8; 16];
    for (i, pair) in hex.chunks_exact(2).enumerate() {
        out[i] = nibble(pair[0])? | (nibble(pair[1])? << 4);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_compute_md5_known_value() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"Hello, World!")?;
        tmp.flush()?;

        assert_eq!(compute_md5(tmp.path())?, "65a8e27d8879283831b664bd8b7f0ad4");
        Ok(())
    }

    #[test]
    fn test_compute_md5_empty_file() -> Result<()> {
        let tmp = NamedTempFile::new()?;
        assert_eq!(compute_md5(tmp.path())?, "d41d8cd98f00b204e9800998ecf8427e");
        Ok(())
    }

    #[test]
    fn test_nibble_swap() -> Result<()> {
        let mut stored = [0u8; 16];
        stored[0] = 0x5a;
        stored[15] = 0x01;
        let hex = nibble_swapped_hex(&stored);
        assert!(hex.starts_with("a5"));
        assert!(hex.ends_with("10"));
        assert_eq!(nibble_swapped_bytes(&hex)?, stored);
        Ok(())
    }

    #[test]
    fn test_nibble_swapped_bytes_rejects_garbage() {
        assert!(nibble_swapped_bytes("abc").is_err());
        assert!(nibble_swapped_bytes(&"zz".repeat(16)).is_err());
    }
}
