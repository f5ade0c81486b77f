//! Trust gate error types with clear, actionable messages

use thiserror::Error;

/// Marker used when a signature could not be attributed to any key
pub const UNKNOWN_FINGERPRINT: &str = "UNKNOWN";

/// Rejections raised by the signature gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// Policy requires a signature but the catalog declared none
    #[error("Install of {subject} rejected. No signature given.\n\nYou may have to disable signature verification for this entry:\n  signed: false")]
    MissingSignature { subject: String },

    /// A signature was present but did not verify against a trusted key
    #[error("Verify signature for {subject} failed with key fingerprint \"{fingerprint}\"\n\nTo trust this key, add it to trusted-keys or re-run with --trust-keys")]
    InvalidSignature { subject: String, fingerprint: String },
}

impl TrustError {
    /// Log security-critical trust errors
    pub fn log_if_security_critical(&self) {
        if let TrustError::InvalidSignature { .. } = self {
            tracing::error!(target: "security", "TRUST VIOLATION: {}", self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_signature_message_carries_fingerprint() {
        let err = TrustError::InvalidSignature {
            subject: "tool \"phpunit\"".to_string(),
            fingerprint: "ABCDEF".to_string(),
        };
        assert!(err.to_string().contains("\"ABCDEF\""));
    }

    #[test]
    fn missing_signature_names_subject() {
        let err = TrustError::MissingSignature {
            subject: "plugin \"psalm\"".to_string(),
        };
        assert!(err.to_string().contains("No signature given"));
        assert!(err.to_string().contains("plugin \"psalm\""));
    }
}
