//! Crypto error types.

/// Errors raised while handling keys and signatures.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The device has no attestation key on record.
    #[error("No public key available for verification")]
    MissingPublicKey,

    /// The key could be parsed neither as PEM nor as base64 DER.
    #[error("Malformed public key: {0}")]
    MalformedPublicKey(String),

    /// The signature is not valid base64 or has the wrong length.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// The signature does not match the canonical payload.
    #[error("Signature verification failed")]
    SignatureMismatch,

    /// A credential secret is malformed or too short.
    #[error("Invalid credential key: {0}")]
    InvalidKey(String),

    /// Producing a signature failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_public_key_display() {
        assert_eq!(
            CryptoError::MissingPublicKey.to_string(),
            "No public key available for verification"
        );
    }

    #[test]
    fn malformed_public_key_display() {
        let e = CryptoError::MalformedPublicKey("not pem".into());
        assert_eq!(e.to_string(), "Malformed public key: not pem");
    }

    #[test]
    fn signature_mismatch_display() {
        assert_eq!(
            CryptoError::SignatureMismatch.to_string(),
            "Signature verification failed"
        );
    }

    #[test]
    fn invalid_key_display() {
        let e = CryptoError::InvalidKey("too short".into());
        assert_eq!(e.to_string(), "Invalid credential key: too short");
    }
}
