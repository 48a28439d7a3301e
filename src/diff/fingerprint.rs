// src/diff/fingerprint.rs

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::trace;

use crate::fs::FileSystem;

/// Hex MD5 of an in-memory buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Hex MD5 of a file's full content, streamed in fixed-size chunks.
pub fn fingerprint_file(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut reader = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;

    let mut ctx = md5::Context::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }

    let fingerprint = format!("{:x}", ctx.compute());
    trace!(path = ?path, fingerprint = %fingerprint, "hashed file");
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn known_digest() {
        assert_eq!(fingerprint_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(fingerprint_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn streamed_file_hash_matches_buffer_hash() {
        let fs = MockFileSystem::new();
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        fs.add_file("big.bin", data.clone());
        assert_eq!(
            fingerprint_file(&fs, Path::new("big.bin")).unwrap(),
            fingerprint_bytes(&data)
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let fs = MockFileSystem::new();
        assert!(fingerprint_file(&fs, Path::new("nope")).is_err());
    }
}
