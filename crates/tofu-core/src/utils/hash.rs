//! SHA-256 content hashing.
//!
//! The registry provider protocol advertises SHA-256 `shasum` values, so the
//! same digest doubles as the object store key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{TofuError, TofuResult};

/// A SHA-256 content digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Convert hash to lowercase hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Create ContentHash from a hexadecimal string (case-insensitive)
    pub fn from_hex(hex_str: &str) -> TofuResult<Self> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| TofuError::Parse {
            message: format!("digest '{}': {}", hex_str, e),
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| TofuError::Parse {
            message: format!("digest '{}': expected 32 bytes, got {}", hex_str, v.len()),
        })?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = TofuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TofuError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

/// Compute the SHA-256 of content
pub fn compute_hash(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    ContentHash::new(digest.into())
}

/// Incremental hasher for bodies that arrive in chunks
#[derive(Debug, Clone, Default)]
pub struct StreamingHasher {
    hasher: Sha256,
    len: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Bytes seen so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash::new(self.hasher.finalize().into())
    }
}

/// Compute the SHA-256 of a file
pub fn hash_file(path: &std::path::Path) -> TofuResult<ContentHash> {
    let data = std::fs::read(path)
        .map_err(|e| TofuError::io(format!("Failed to read file: {}", path.display()), e))?;
    Ok(compute_hash(&data))
}

/// Verify data against an expected digest, returning the computed one
pub fn verify_integrity(data: &[u8], expected: &ContentHash, source: &str) -> TofuResult<ContentHash> {
    let actual = compute_hash(data);
    if actual == *expected {
        Ok(actual)
    } else {
        Err(TofuError::DigestMismatch {
            url: source.to_string(),
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_compute_hash_known_value() {
        let hash = compute_hash(b"hello world");
        assert_eq!(hash.to_hex(), HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_from_hex_accepts_uppercase() {
        let hash = ContentHash::from_hex(&HELLO_WORLD_SHA256.to_uppercase()).unwrap();
        assert_eq!(hash, compute_hash(b"hello world"));
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::from_hex("not hex at all").is_err());
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.len(), 11);
        assert_eq!(hasher.finalize(), compute_hash(b"hello world"));
    }

    #[test]
    fn test_verify_integrity() {
        let expected = compute_hash(b"test data");
        assert!(verify_integrity(b"test data", &expected, "mem").is_ok());

        let err = verify_integrity(b"other data", &expected, "mem").unwrap_err();
        assert!(matches!(err, TofuError::DigestMismatch { .. }));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = compute_hash(b"hello world");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", HELLO_WORLD_SHA256));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_hash_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        assert_eq!(hash_file(file.path()).unwrap().to_hex(), HELLO_WORLD_SHA256);
    }
}
