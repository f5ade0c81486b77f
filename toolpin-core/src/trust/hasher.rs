//! Content hashing for catalog documents and downloaded artifacts
//!
//! Hashes are declared in catalogs as `{"type": "sha-256", "value": "<hex>"}`
//! and compared case-insensitively.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "sha-256", alias = "sha256")]
    Sha256,
    #[serde(rename = "sha-384", alias = "sha384")]
    Sha384,
    #[serde(rename = "sha-512", alias = "sha512")]
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha-256",
            HashAlgorithm::Sha384 => "sha-384",
            HashAlgorithm::Sha512 => "sha-512",
        }
    }

    fn hasher(&self) -> Box<dyn sha2::digest::DynDigest> {
        match self {
            HashAlgorithm::Sha256 => Box::new(Sha256::new()),
            HashAlgorithm::Sha384 => Box::new(Sha384::new()),
            HashAlgorithm::Sha512 => Box::new(Sha512::new()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared or computed content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHash {
    #[serde(rename = "type")]
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl ToolHash {
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Self {
        Self {
            algorithm,
            value: value.into(),
        }
    }

    /// Hash an in-memory buffer
    pub fn for_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(bytes);
        Self::new(algorithm, hex::encode(hasher.finalize()))
    }

    /// Compute the same kind of hash over `bytes` and compare
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        self.equals(&Self::for_bytes(self.algorithm, bytes))
    }

    /// Algorithm-aware, case-insensitive comparison
    pub fn equals(&self, other: &ToolHash) -> bool {
        self.algorithm == other.algorithm && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl fmt::Display for ToolHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}
