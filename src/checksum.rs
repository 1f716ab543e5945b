/*!
 * Streaming checksum computation for data part verification
 */

use crate::error::{EdlError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm for part digests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// BLAKE3 (fast, secure, default)
    Blake3,

    /// SHA-256
    Sha256,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Blake3
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => write!(f, "blake3"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = EdlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            _ => Err(EdlError::config(format!("unknown hash algorithm: {}", s))),
        }
    }
}

/// Streaming hasher that digests data incrementally
pub struct StreamingHasher {
    inner: HasherInner,
}

enum HasherInner {
    Blake3(blake3::Hasher),
    Sha256(Sha256),
}

impl StreamingHasher {
    /// Create a new streaming hasher for the given algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Blake3 => HasherInner::Blake3(blake3::Hasher::new()),
            HashAlgorithm::Sha256 => HasherInner::Sha256(Sha256::new()),
        };
        Self { inner }
    }

    /// Update the hash with new data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            HasherInner::Blake3(hasher) => {
                hasher.update(data);
            }
            HasherInner::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the algorithm-tagged digest string
    pub fn finalize(self) -> String {
        match self.inner {
            HasherInner::Blake3(hasher) => format!("blake3:{}", hasher.finalize().to_hex()),
            HasherInner::Sha256(hasher) => format!("sha256:{}", hex::encode(hasher.finalize())),
        }
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

/// Compute the algorithm-tagged digest of a file
pub fn compute_checksum(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = BufReader::new(File::open(path)?);
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buffer = [0u8; 64 * 1024]; // 64KB buffer

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Compute the algorithm-tagged digest of an in-memory buffer
pub fn compute_buffer_checksum(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = StreamingHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Algorithm of a tagged digest string; an untagged digest is read as BLAKE3
pub fn tagged_algorithm(digest: &str) -> Option<HashAlgorithm> {
    match digest.split_once(':') {
        None => Some(HashAlgorithm::Blake3),
        Some((tag, _)) => tag.parse().ok(),
    }
}

/// Compare two digest strings, tolerating a missing tag and hex case
pub fn digests_match(expected: &str, computed: &str) -> bool {
    fn split(digest: &str) -> (&str, String) {
        match digest.split_once(':') {
            Some((tag, hex)) => (tag, hex.to_ascii_lowercase()),
            None => ("blake3", digest.to_ascii_lowercase()),
        }
    }
    split(expected) == split(computed)
}
