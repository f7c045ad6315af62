//! Streaming upload/download with a running SHA-256 (spec.md §4.4).
//!
//! Chunked copies in ≤64 KiB pieces, hashed as they go, so neither side
//! ever needs the whole file in memory.

use std::io::{Read, Write};

use sha2::{Digest, Sha256};

use crate::error::{BridgeError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Reads exactly `size` bytes from `reader`, writing them to `dest` and
/// returning their SHA-256 hex digest. Never reports `ok:false` for a
/// checksum mismatch here — that comparison happens at the caller, which
/// still echoes the computed hash either way (spec.md §4.4 step 4).
pub fn receive_exact<R: Read, W: Write>(reader: &mut R, size: u64, dest: &mut W) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut remaining = size;
    let mut buf = [0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        reader.read_exact(&mut buf[..want])?;
        dest.write_all(&buf[..want])?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }
    dest.flush()?;
    Ok(hex::encode(hasher.finalize()))
}

/// Streams exactly `size` bytes from `src` to `writer`, returning the
/// SHA-256 hex digest of what was sent (spec.md §4.4 download step 2).
pub fn send_exact<R: Read, W: Write>(src: &mut R, size: u64, writer: &mut W) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut remaining = size;
    let mut buf = [0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        src.read_exact(&mut buf[..want])?;
        writer.write_all(&buf[..want])?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }
    writer.flush()?;
    Ok(hex::encode(hasher.finalize()))
}

/// Computes the SHA-256 hex digest of an existing file without loading it
/// wholesale into memory.
pub fn sha256_file(path: &std::path::Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compares a declared checksum (if any) against what was actually
/// received/sent; returns the mismatch error spec.md §7 kind-5 calls for.
pub fn verify_declared(declared: Option<&str>, computed: &str) -> Result<()> {
    match declared {
        Some(expected) if !expected.eq_ignore_ascii_case(computed) => {
            Err(BridgeError::IntegrityMismatch {
                declared: expected.to_string(),
                computed: computed.to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn receive_exact_hashes_while_copying() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut reader = Cursor::new(data.clone());
        let mut dest = Vec::new();
        let digest = receive_exact(&mut reader, data.len() as u64, &mut dest).unwrap();
        assert_eq!(dest, data);
        assert_eq!(digest.len(), 64);

        let mut expected = Sha256::new();
        expected.update(&data);
        assert_eq!(digest, hex::encode(expected.finalize()));
    }

    #[test]
    fn verify_declared_flags_a_mismatch() {
        assert!(verify_declared(Some("deadbeef"), "cafebabe").is_err());
        assert!(verify_declared(Some("ABCD"), "abcd").is_ok());
        assert!(verify_declared(None, "anything").is_ok());
    }
}
