//! Credential error types.

use tg_core::StoreError;

/// Credential errors.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The credential could not be signed.
    #[error("Failed to sign credential: {0}")]
    SigningFailed(String),

    /// The credential is not a well-formed JWT or lacks required claims.
    #[error("Malformed credential: {0}")]
    Malformed(String),

    /// The signature does not match.
    #[error("Credential signature invalid")]
    InvalidSignature,

    /// The credential is past its expiry.
    #[error("Credential expired")]
    Expired,

    /// The `iss` claim is not ours.
    #[error("Credential issuer invalid")]
    InvalidIssuer,

    /// The `aud` claim is not ours.
    #[error("Credential audience invalid")]
    InvalidAudience,

    /// The `token_type` claim is not `device_access`.
    #[error("Unexpected credential type: {0}")]
    WrongTokenType(String),

    /// A refreshed credential belongs to another user.
    #[error("Credential subject does not match caller")]
    SubjectMismatch,

    /// A refreshed credential belongs to another device.
    #[error("Credential device does not match caller")]
    DeviceMismatch,

    /// The policy snapshot could not be loaded.
    #[error("Policy evaluation unavailable: {0}")]
    PolicyUnavailable(#[from] StoreError),
}

/// Result type for credential operations.
pub type TokenResult<T> = Result<T, TokenError>;

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_failed_display() {
        let e = TokenError::SigningFailed("bad key".into());
        assert_eq!(e.to_string(), "Failed to sign credential: bad key");
    }

    #[test]
    fn expired_display() {
        assert_eq!(TokenError::Expired.to_string(), "Credential expired");
    }

    #[test]
    fn wrong_token_type_display() {
        let e = TokenError::WrongTokenType("refresh".into());
        assert_eq!(e.to_string(), "Unexpected credential type: refresh");
    }

    #[test]
    fn policy_unavailable_from_store_error() {
        let e: TokenError = StoreError::Unavailable("db down".into()).into();
        assert_eq!(
            e.to_string(),
            "Policy evaluation unavailable: Store unavailable: db down"
        );
    }

    #[test]
    fn jwt_errors_map_to_kinds() {
        use jsonwebtoken::errors::ErrorKind;

        let e: TokenError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert!(matches!(e, TokenError::InvalidSignature));
        let e: TokenError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAudience).into();
        assert!(matches!(e, TokenError::InvalidAudience));
        let e: TokenError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken).into();
        assert!(matches!(e, TokenError::Malformed(_)));
    }
}
