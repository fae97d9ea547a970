//! Engine error types.

use std::path::PathBuf;

use tg_audit::AuditError;
use tg_core::{CoreError, StoreError};
use tg_crypto::CryptoError;
use tg_token::TokenError;

/// Engine errors.
///
/// Access denials are not errors; they are returned as decisions. These
/// variants cover infrastructure failures and bad configuration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A storage collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The audit sink failed.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Credential signing failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Invalid key material.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A policy document failed validation.
    #[error(transparent)]
    Policy(#[from] CoreError),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The request was refused before any decision was made.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Logging could not be initialized.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_display() {
        let e = EngineError::InvalidConfig("ttl_secs must be > 0".into());
        assert_eq!(e.to_string(), "Invalid configuration: ttl_secs must be > 0");
    }

    #[test]
    fn store_error_is_transparent() {
        let e: EngineError = StoreError::Unavailable("timeout".into()).into();
        assert_eq!(e.to_string(), "Store unavailable: timeout");
    }

    #[test]
    fn read_error_display() {
        let e = EngineError::Read {
            path: PathBuf::from("/etc/trustgate.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(e.to_string(), "Failed to read /etc/trustgate.toml: missing");
    }

    #[test]
    fn rejected_display() {
        let e = EngineError::Rejected("Device not found".into());
        assert_eq!(e.to_string(), "Request rejected: Device not found");
    }
}
