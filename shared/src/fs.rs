//! Filesystem helpers shared across romshelf crates.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Bytes of a ROM hashed to derive its instance id.
pub const HASH_PREFIX_BYTES: u64 = 1024 * 1024; // 1 MiB

/// SHA-256 of the first [`HASH_PREFIX_BYTES`] of a file, hex encoded.
///
/// Hashing only a prefix keeps scans of multi-GiB disc images cheap.
pub fn hash_file_prefix(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut reader = file.take(HASH_PREFIX_BYTES);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
