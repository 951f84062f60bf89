//! MD5T vanilla manifest reader/writer
//!
//! Layout (all integers little-endian):
//! - `MD5T` magic, `i32` decompressed payload size
//! - LZMA-alone stream holding the payload
//!
//! Payload:
//! - `i32` path count, then that many null-terminated ASCII paths
//! - `i32` entry count, then `(i32 path index, i32 size, [u8; 16] md5)` records
//!
//! Digests are stored with the nibbles of every byte swapped.

use super::{Candidate, Manifest};
use crate::hash;
use crate::paths;
use binrw::{binrw, BinRead, BinWrite, NullString};
use std::collections::BTreeMap;
use std::io::Cursor;
use thiserror::Error;

/// Magic bytes at start of a manifest
pub const MAGIC: &[u8; 4] = b"MD5T";

/// Low-level decode/encode failure
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid manifest header: {0}")]
    Header(binrw::Error),

    #[error("LZMA payload failed to decompress: {0}")]
    Decompress(String),

    #[error("payload decompressed to {actual} bytes, header declares {declared}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("invalid manifest table: {0}")]
    Table(binrw::Error),

    #[error("entry {entry} references path index {index}, only {paths} paths present")]
    PathIndex { entry: usize, index: i32, paths: usize },

    #[error("cannot encode manifest: {0}")]
    Encode(String),
}

#[binrw]
#[brw(little, magic = b"MD5T")]
#[derive(Debug)]
struct Header {
    #[br(assert(decompressed_size >= 0, "negative payload size"))]
    decompressed_size: i32,
}

#[binrw]
#[brw(little)]
#[derive(Debug)]
struct RawEntry {
    path_index: i32,
    size: i32,
    md5: [u8; 16],
}

#[binrw]
#[brw(little)]
#[derive(Debug)]
struct Table {
    #[br(temp, assert(path_count >= 0, "negative path count"))]
    #[bw(calc = paths.len() as i32)]
    path_count: i32,

    #[br(count = path_count as usize)]
    paths: Vec<NullString>,

    #[br(temp, assert(entry_count >= 0, "negative entry count"))]
    #[bw(calc = entries.len() as i32)]
    entry_count: i32,

    #[br(count = entry_count as usize)]
    entries: Vec<RawEntry>,
}

/// Decode a complete manifest file.
pub fn decode(bytes: &[u8]) -> Result<Manifest, FormatError> {
    let mut cursor = Cursor::new(bytes);
    let header = Header::read(&mut cursor).map_err(FormatError::Header)?;
    let declared = header.decompressed_size as usize;

    let mut compressed = &bytes[cursor.position() as usize..];
    let options = lzma_rs::decompress::Options {
        unpacked_size: lzma_rs::decompress::UnpackedSize::ReadHeaderButUseProvided(Some(
            declared as u64,
        )),
        ..Default::default()
    };

    let mut payload = Vec::with_capacity(declared);
    lzma_rs::lzma_decompress_with_options(&mut compressed, &mut payload, &options)
        .map_err(|e| FormatError::Decompress(e.to_string()))?;

    if payload.len() != declared {
        return Err(FormatError::SizeMismatch {
            declared,
            actual: payload.len(),
        });
    }

    let table = Table::read(&mut Cursor::new(&payload)).map_err(FormatError::Table)?;
    let paths: Vec<String> = table.paths.iter().map(|p| p.to_string()).collect();

    let mut manifest = Manifest::default();
    for (i, entry) in table.entries.iter().enumerate() {
        let path = usize::try_from(entry.path_index)
            .ok()
            .and_then(|idx| paths.get(idx))
            .ok_or(FormatError::PathIndex {
                entry: i,
                index: entry.path_index,
                paths: paths.len(),
            })?;

        manifest.insert(
            path,
            Candidate {
                size: entry.size as u32 as u64,
                md5: hash::nibble_swapped_hex(&entry.md5),
            },
        );
    }

    Ok(manifest)
}

/// Encode `(relative path, candidate)` records into a manifest file.
///
/// Paths are normalized the same way the reader keys them; records for the
/// same path share one string-table slot.
pub fn encode<'a, I>(records: I) -> Result<Vec<u8>, FormatError>
where
    I: IntoIterator<Item = (&'a str, &'a Candidate)>,
{
    let mut index: BTreeMap<String, i32> = BTreeMap::new();
    let mut table = Table {
        paths: Vec::new(),
        entries: Vec::new(),
    };

    for (path, candidate) in records {
        let key = paths::normalize_for_lookup(path);
        let next = table.paths.len() as i32;
        let path_index = *index.entry(key.clone()).or_insert_with(|| {
            table.paths.push(NullString::from(key.as_str()));
            next
        });

        let size = i32::try_from(candidate.size)
            .or_else(|_| u32::try_from(candidate.size).map(|s| s as i32))
            .map_err(|_| FormatError::Encode(format!("{} is larger than 4 GiB", path)))?;
        let md5 = hash::nibble_swapped_bytes(&candidate.md5)
            .map_err(|e| FormatError::Encode(format!("{}: {}", path, e)))?;

        table.entries.push(RawEntry {
            path_index,
            size,
            md5,
        });
    }

    let mut payload = Cursor::new(Vec::new());
    table.write(&mut payload).map_err(FormatError::Table)?;
    let payload = payload.into_inner();

    let mut compressed = Vec::new();
    lzma_rs::lzma_compress(&mut payload.as_slice(), &mut compressed)
        .map_err(|e| FormatError::Encode(e.to_string()))?;

    let header = Header {
        decompressed_size: i32::try_from(payload.len())
            .map_err(|_| FormatError::Encode("payload exceeds 2 GiB".to_string()))?,
    };
    let mut out = Cursor::new(Vec::with_capacity(compressed.len() + 8));
    header.write(&mut out).map_err(FormatError::Header)?;

    let mut out = out.into_inner();
    out.extend_from_slice(&compressed);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(size: u64, md5: &str) -> Candidate {
        Candidate {
            size,
            md5: md5.to_string(),
        }
    }

    #[test]
    fn test_decode_merges_duplicate_paths() {
        let a = candidate(10, "0123456789abcdef0123456789abcdef");
        let b = candidate(12, "fedcba9876543210fedcba9876543210");
        let c = candidate(3_000_000_000, "00000000000000000000000000000001");
        let bytes = encode([
            ("BIOGame/CookedPCConsole/Startup.pcc", &a),
            ("biogame\\cookedpcconsole\\startup.pcc", &b),
            ("\\Binaries\\Win32\\MassEffect3.exe", &c),
        ])
        .unwrap();
        assert_eq!(&bytes[..4], MAGIC);

        let manifest = decode(&bytes).unwrap();
        assert_eq!(manifest.len(), 2);

        let startup = manifest.lookup("BIOGame\\CookedPCConsole\\STARTUP.pcc").unwrap();
        assert_eq!(startup, &[a, b]);

        let exe = manifest.lookup("Binaries/Win32/MassEffect3.exe").unwrap();
        assert_eq!(exe[0].size, 3_000_000_000);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = decode(b"NOPE\x00\x00\x00\x00").unwrap_err();
        assert!(matches!(err, FormatError::Header(_)));
    }

    #[test]
    fn test_rejects_wrong_declared_size() {
        let a = candidate(10, "0123456789abcdef0123456789abcdef");
        let mut bytes = encode([("file.pcc", &a)]).unwrap();

        // Declare a bigger payload than the stream holds
        let declared = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        bytes[4..8].copy_from_slice(&(declared + 100).to_le_bytes());

        assert!(matches!(
            decode(&bytes).unwrap_err(),
            FormatError::Decompress(_) | FormatError::SizeMismatch { .. }
        ));
    }

    #[test]
    fn test_rejects_truncated_stream() {
        let a = candidate(10, "0123456789abcdef0123456789abcdef");
        let bytes = encode([("file.pcc", &a)]).unwrap();
        assert!(decode(&bytes[..bytes.len() / 2]).is_err());
    }
}
