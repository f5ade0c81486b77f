//! Toolpin Trust System - integrity and authenticity gates for downloads
//!
//! Design Principles:
//! - Signatures required by default - unsigned artifacts need an explicit opt-out
//! - Hash first - a declared hash is checked before any signature is looked at
//! - Untrusted artifacts never survive a rejection on disk
//! - Industry standard crypto - SHA-2 hashing, Ed25519 detached signatures

pub mod error;
pub mod hasher;
pub mod policy;
pub mod signature;

pub use error::{TrustError, UNKNOWN_FINGERPRINT};
pub use hasher::{HashAlgorithm, ToolHash};
pub use policy::TrustPolicy;
pub use signature::{
    DetachedSignature, Keyring, KeyringVerifier, SignatureVerifier, UntrustedKeyStrategy,
    VerificationResult,
};
