//! Content-addressed file identity.
//!
//! Edits are keyed by a SHA-256 over the raw file bytes, so renames and moves
//! never orphan an edit record.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// 32-byte SHA-256 of the file contents. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileFingerprint([u8; 32]);

impl FileFingerprint {
    /// Hash a file in 1 MiB chunks.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let mut file = std::fs::File::open(path.as_ref())
            .map_err(|e| format!("Failed to open file for hashing: {}", e))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 1 << 20];
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| format!("Failed to read file for hashing: {}", e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Lowercase hex, the persistence key format.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in self.0 {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_known_digest() {
        // SHA-256("abc")
        let fp = FileFingerprint::from_bytes(b"abc");
        assert_eq!(
            fp.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bin");
        let payload = vec![7u8; 3 * 1024 * 1024 + 13];
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&payload)
            .unwrap();

        let from_file = FileFingerprint::from_path(&path).unwrap();
        let from_bytes = FileFingerprint::from_bytes(&payload);
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(FileFingerprint::from_path("/nonexistent/scan.tif").is_err());
    }
}
