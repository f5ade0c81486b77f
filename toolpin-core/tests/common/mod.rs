//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use toolpin_core::catalog::ToolVersion;
use toolpin_core::download::{resolve_location, Downloader};
use toolpin_core::trust::{
    DetachedSignature, HashAlgorithm, Keyring, KeyringVerifier, SignatureVerifier, ToolHash,
    UntrustedKeyStrategy, VerificationResult,
};
use toolpin_core::UpdateError;

/// One `download_file_to` call as observed by the downloader
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub url: String,
    pub destination: PathBuf,
    pub existed_before: bool,
}

/// Serves documents and artifacts from memory
#[derive(Default)]
pub struct MemoryDownloader {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl MemoryDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.into());
    }

    pub fn serve_json(&self, url: &str, document: &serde_json::Value) {
        self.serve(url, serde_json::to_vec(document).unwrap());
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }

    fn get(&self, location: &str) -> Result<Vec<u8>, UpdateError> {
        self.files
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| UpdateError::Download {
                location: location.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })
    }
}

#[async_trait]
impl Downloader for MemoryDownloader {
    async fn download_json_file(
        &self,
        location: &str,
        base_dir: Option<&str>,
        _bypass_cache: bool,
        hash: Option<&ToolHash>,
    ) -> Result<serde_json::Value, UpdateError> {
        let resolved = resolve_location(location, base_dir);
        let bytes = self.get(&resolved)?;

        if let Some(expected) = hash {
            if !expected.matches_bytes(&bytes) {
                return Err(UpdateError::Integrity {
                    path: PathBuf::from(&resolved),
                    algorithm: expected.algorithm.to_string(),
                    expected: expected.value.clone(),
                    actual: ToolHash::for_bytes(expected.algorithm, &bytes).value,
                });
            }
        }

        serde_json::from_slice(&bytes).map_err(|e| UpdateError::Load {
            location: resolved,
            reason: e.to_string(),
        })
    }

    async fn download_file_to(&self, url: &str, destination: &Path) -> Result<(), UpdateError> {
        let bytes = self.get(url)?;
        self.writes.lock().unwrap().push(WriteRecord {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            existed_before: destination.exists(),
        });

        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(destination, bytes).unwrap();
        Ok(())
    }
}

/// Verifier that must never be reached
#[derive(Default)]
pub struct CountingVerifier {
    pub calls: AtomicUsize,
}

impl SignatureVerifier for CountingVerifier {
    fn verify(&self, _artifact: &[u8], _signature: &[u8]) -> VerificationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        VerificationResult::invalid(None)
    }
}

pub fn publisher_key() -> SigningKey {
    SigningKey::from_bytes(&[7; 32])
}

pub fn stranger_key() -> SigningKey {
    SigningKey::from_bytes(&[42; 32])
}

/// Verifier trusting only [`publisher_key`]
pub fn trusting_verifier() -> KeyringVerifier {
    let mut keyring = Keyring::new();
    keyring.add(publisher_key().verifying_key());
    KeyringVerifier::new(keyring, UntrustedKeyStrategy::Reject)
}

/// Detached signature document over `artifact`
pub fn sign(key: &SigningKey, artifact: &[u8]) -> Vec<u8> {
    DetachedSignature::create(key, artifact).to_bytes().unwrap()
}

pub fn sha256(bytes: &[u8]) -> ToolHash {
    ToolHash::for_bytes(HashAlgorithm::Sha256, bytes)
}

/// Tool version downloadable from `https://example.org/<name>-<version>.phar`
pub fn tool(name: &str, version: &str) -> ToolVersion {
    let mut tool = ToolVersion::new(name, version);
    tool.url = Some(format!("https://example.org/{name}-{version}.phar"));
    tool
}

pub fn tool_url(name: &str, version: &str) -> String {
    format!("https://example.org/{name}-{version}.phar")
}

pub fn signature_url(name: &str, version: &str) -> String {
    format!("https://example.org/{name}-{version}.phar.sig")
}
