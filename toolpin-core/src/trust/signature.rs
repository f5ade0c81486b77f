//! Detached artifact signatures and their verification
//!
//! A detached signature is a small JSON document stored next to the artifact:
//!
//! ```json
//! {"algorithm": "ed25519", "public-key": "<base64>", "signature": "<base64>"}
//! ```
//!
//! The embedded public key identifies the signer; whether that signer is
//! trusted is decided by the [`Keyring`] and the [`UntrustedKeyStrategy`].

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

const ALGORITHM_ED25519: &str = "ed25519";

/// Outcome of a signature check
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerificationResult {
    pub valid: bool,
    pub fingerprint: Option<String>,
}

impl VerificationResult {
    pub fn valid(fingerprint: impl Into<String>) -> Self {
        Self {
            valid: true,
            fingerprint: Some(fingerprint.into()),
        }
    }

    pub fn invalid(fingerprint: Option<String>) -> Self {
        Self {
            valid: false,
            fingerprint,
        }
    }
}

/// Capability consumed by the update executor
///
/// Synchronous and potentially slow; callers wanting a timeout must add one.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, artifact: &[u8], signature: &[u8]) -> VerificationResult;
}

/// What to do with a correctly signed artifact whose key is not in the keyring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UntrustedKeyStrategy {
    #[default]
    Reject,
    TrustAll,
}

/// Upper-case hex of the first 20 bytes of SHA-256 over the raw public key
pub fn fingerprint(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode_upper(&digest[..20])
}

/// Trusted signer keys, indexed by fingerprint
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: BTreeMap<String, VerifyingKey>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a keyring from base64-encoded ed25519 public keys
    pub fn from_base64_keys<I, S>(keys: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keyring = Self::new();
        for key in keys {
            keyring.add(decode_verifying_key(key.as_ref())?);
        }
        Ok(keyring)
    }

    /// Add a key and return its fingerprint
    pub fn add(&mut self, key: VerifyingKey) -> String {
        let fp = fingerprint(&key);
        self.keys.insert(fp.clone(), key);
        fp
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.keys.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Serialized detached signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetachedSignature {
    pub algorithm: String,
    pub public_key: String,
    pub signature: String,
}

impl DetachedSignature {
    /// Sign `artifact` with `key`
    pub fn create(key: &SigningKey, artifact: &[u8]) -> Self {
        Self {
            algorithm: ALGORITHM_ED25519.to_string(),
            public_key: BASE64.encode(key.verifying_key().to_bytes()),
            signature: BASE64.encode(key.sign(artifact).to_bytes()),
        }
    }

    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(bytes).context("signature is not a detached signature document")
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("failed to serialize signature")
    }

    pub fn verifying_key(&self) -> anyhow::Result<VerifyingKey> {
        decode_verifying_key(&self.public_key)
    }

    /// Check the cryptographic signature only, ignoring trust
    pub fn verify_bytes(&self, artifact: &[u8]) -> anyhow::Result<()> {
        if self.algorithm != ALGORITHM_ED25519 {
            anyhow::bail!("unsupported signature algorithm '{}'", self.algorithm);
        }

        let signature_raw = BASE64
            .decode(&self.signature)
            .context("invalid signature encoding (expected base64)")?;
        let signature = Signature::from_slice(&signature_raw)
            .map_err(|e| anyhow!("invalid signature bytes: {}", e))?;

        self.verifying_key()?
            .verify(artifact, &signature)
            .map_err(|e| anyhow!("signature verification failed: {}", e))
    }
}

/// Ed25519 verifier backed by a keyring of trusted signers
#[derive(Debug, Clone, Default)]
pub struct KeyringVerifier {
    keyring: Keyring,
    strategy: UntrustedKeyStrategy,
}

impl KeyringVerifier {
    pub fn new(keyring: Keyring, strategy: UntrustedKeyStrategy) -> Self {
        Self { keyring, strategy }
    }
}

impl SignatureVerifier for KeyringVerifier {
    fn verify(&self, artifact: &[u8], signature: &[u8]) -> VerificationResult {
        let detached = match DetachedSignature::parse(signature) {
            Ok(detached) => detached,
            Err(e) => {
                debug!("Unreadable signature: {:#}", e);
                return VerificationResult::invalid(None);
            }
        };

        let fp = match detached.verifying_key() {
            Ok(key) => fingerprint(&key),
            Err(e) => {
                debug!("Signature carries no usable public key: {:#}", e);
                return VerificationResult::invalid(None);
            }
        };

        if let Err(e) = detached.verify_bytes(artifact) {
            debug!("Signature from {} does not match artifact: {:#}", fp, e);
            return VerificationResult::invalid(Some(fp));
        }

        if self.keyring.contains(&fp) {
            return VerificationResult::valid(fp);
        }

        match self.strategy {
            UntrustedKeyStrategy::TrustAll => {
                tracing::warn!("Accepting signature from untrusted key {}", fp);
                VerificationResult::valid(fp)
            }
            UntrustedKeyStrategy::Reject => {
                debug!("Key {} is not in the trusted keyring", fp);
                VerificationResult::invalid(Some(fp))
            }
        }
    }
}

fn decode_verifying_key(public_key_b64: &str) -> anyhow::Result<VerifyingKey> {
    let key_raw = BASE64
        .decode(public_key_b64.trim())
        .context("invalid public key encoding (expected base64)")?;
    let key_raw: [u8; 32] = key_raw
        .try_into()
        .map_err(|_| anyhow!("invalid public key length (expected 32 bytes)"))?;

    VerifyingKey::from_bytes(&key_raw).map_err(|e| anyhow!("invalid ed25519 public key: {}", e))
}
