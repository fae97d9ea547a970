//! Credential issuance and refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tg_core::{
    Clock, Device, EvaluationContext, Identity, PolicyEvaluation, PolicyEvaluator, score_posture,
};
use tg_crypto::CredentialKey;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    AUDIENCE, AccessClaims, DEFAULT_TTL_MINUTES, ISSUER, TOKEN_TYPE, TokenError, TokenResult,
    TokenVerifier, effective_ttl_minutes,
};

/// Access type recorded in the policy context for credential requests.
pub const TOKEN_ACCESS_TYPE: &str = "token";

/// A freshly minted credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Encoded JWT.
    pub token: String,
    /// Its claims.
    pub claims: AccessClaims,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

/// Result of an issue or refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// Policy allowed; a credential was minted.
    Issued(IssuedToken),
    /// Policy denied; nothing was minted.
    Denied(PolicyEvaluation),
}

impl IssueOutcome {
    /// The minted credential, if any.
    #[must_use]
    pub const fn issued(&self) -> Option<&IssuedToken> {
        match self {
            Self::Issued(issued) => Some(issued),
            Self::Denied(_) => None,
        }
    }

    /// Consume into the encoded token, if any.
    #[must_use]
    pub fn into_token(self) -> Option<String> {
        match self {
            Self::Issued(issued) => Some(issued.token),
            Self::Denied(_) => None,
        }
    }
}

/// Mints credentials after re-running policy evaluation.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    verifier: TokenVerifier,
    evaluator: PolicyEvaluator,
    default_ttl_minutes: u32,
}

impl CredentialIssuer {
    /// Create an issuer.
    #[must_use]
    pub fn new(key: Arc<CredentialKey>, evaluator: PolicyEvaluator, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier: TokenVerifier::new(key, clock),
            evaluator,
            default_ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }

    /// Override the lifetime used when the caller requests none.
    #[must_use]
    pub fn with_default_ttl(mut self, minutes: u32) -> Self {
        self.default_ttl_minutes = effective_ttl_minutes(Some(minutes), DEFAULT_TTL_MINUTES);
        self
    }

    /// The verifier sharing this issuer's key and clock.
    #[must_use]
    pub const fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Issue a credential for `identity` on `device` scoped to `resource`.
    ///
    /// Policy is evaluated against the device's stored state and latest
    /// posture. A denial mints nothing.
    ///
    /// # Errors
    /// Returns [`TokenError::PolicyUnavailable`] if policies cannot be loaded
    /// and [`TokenError::SigningFailed`] if encoding fails.
    pub async fn issue(
        &self,
        identity: &Identity,
        device: &Device,
        resource: &str,
        ttl_minutes: Option<u32>,
    ) -> TokenResult<IssueOutcome> {
        let now = self.verifier.clock().now();
        let ctx = EvaluationContext::new(now)
            .with_roles(identity.roles.iter().cloned())
            .with_device(device.state())
            .with_posture(device.last_posture().cloned())
            .with_resource(resource)
            .with_access_type(TOKEN_ACCESS_TYPE);

        let verdict = self.evaluator.evaluate(&ctx).await?;
        if !verdict.allowed {
            debug!(
                device_id = %device.id(),
                resource,
                reason = verdict.denial_reason.as_deref().unwrap_or_default(),
                "credential denied by policy"
            );
            return Ok(IssueOutcome::Denied(verdict));
        }

        let ttl = effective_ttl_minutes(ttl_minutes, self.default_ttl_minutes);
        let expires_at = now + chrono::Duration::minutes(i64::from(ttl));
        let compliance = device.last_posture().map(score_posture);

        let claims = AccessClaims {
            sub: identity.user_id.to_string(),
            user_id: identity.user_id.to_string(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            device_id: device.id(),
            device_name: device.name().to_string(),
            posture_passed: compliance.as_ref().is_some_and(|c| c.is_compliant),
            is_compliant: device.is_compliant(),
            resource: resource.to_string(),
            posture_summary: compliance.as_ref().map(tg_core::ComplianceResult::summary),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            token_type: TOKEN_TYPE.to_string(),
            jti: Uuid::new_v4().to_string(),
        };

        let key = EncodingKey::from_secret(self.verifier.key().as_bytes());
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|err| TokenError::SigningFailed(err.to_string()))?;

        info!(
            device_id = %device.id(),
            user_id = %identity.user_id,
            resource,
            ttl_minutes = ttl,
            jti = %claims.jti,
            "access credential issued"
        );

        Ok(IssueOutcome::Issued(IssuedToken {
            token,
            claims,
            expires_at,
        }))
    }

    /// Verify `old_token` and issue a new credential for its resource.
    ///
    /// The new credential is decided from scratch; the old one's window is
    /// never extended.
    ///
    /// # Errors
    /// Returns the verification error for an invalid old credential,
    /// [`TokenError::SubjectMismatch`] or [`TokenError::DeviceMismatch`] if
    /// it belongs to someone else, or any error from [`Self::issue`].
    pub async fn refresh(
        &self,
        old_token: &str,
        identity: &Identity,
        device: &Device,
        ttl_minutes: Option<u32>,
    ) -> TokenResult<IssueOutcome> {
        let old = self.verifier.verify_detailed(old_token)?;
        if old.sub != identity.user_id.as_str() {
            return Err(TokenError::SubjectMismatch);
        }
        if old.device_id != device.id() {
            return Err(TokenError::DeviceMismatch);
        }
        debug!(jti = %old.jti, resource = %old.resource, "refreshing credential");
        self.issue(identity, device, &old.resource, ttl_minutes).await
    }
}
