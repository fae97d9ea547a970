//! Credential verification.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tg_core::Clock;
use tg_crypto::CredentialKey;
use tracing::debug;

use crate::{AUDIENCE, AccessClaims, ISSUER, TOKEN_TYPE, TokenError, TokenResult};

/// Validates access credentials.
///
/// Expiry is checked against the injected clock with zero leeway.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    key: Arc<CredentialKey>,
    clock: Arc<dyn Clock>,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for credentials signed with `key`.
    #[must_use]
    pub fn new(key: Arc<CredentialKey>, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is compared against `clock` below.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        Self {
            key,
            clock,
            validation,
        }
    }

    pub(crate) fn key(&self) -> &CredentialKey {
        &self.key
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    /// Returns the [`TokenError`] describing the first failed check.
    pub fn verify_detailed(&self, token: &str) -> TokenResult<AccessClaims> {
        let decoding_key = DecodingKey::from_secret(self.key.as_bytes());
        let data = jsonwebtoken::decode::<AccessClaims>(token.trim(), &decoding_key, &self.validation)?;
        let claims = data.claims;

        if claims.is_expired_at(self.clock.now()) {
            return Err(TokenError::Expired);
        }
        if claims.token_type != TOKEN_TYPE {
            return Err(TokenError::WrongTokenType(claims.token_type));
        }
        Ok(claims)
    }

    /// Verify `token`, returning `None` on any failure.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<AccessClaims> {
        match self.verify_detailed(token) {
            Ok(claims) => Some(claims),
            Err(err) => {
                debug!(error = %err, "credential rejected");
                None
            }
        }
    }
}
