//! Access decision pipeline.
//!
//! For every request the engine:
//!
//! 1. loads the device and checks ownership and enrollment
//! 2. verifies any supplied attestation (signed posture, signed challenge);
//!    a verified posture is rescored and persisted, anything else falls back
//!    to the stored posture
//! 3. evaluates policy against roles, device state, posture and time
//! 4. on allow, mints an access credential
//!
//! Each request ends in exactly one audit event. Storage failures abort the
//! request with an error instead.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tg_audit::{AttestationOutcome, AuditEvent, AuditSink, TracingSink};
use tg_core::{
    ChallengeManager, ChallengeStore, Clock, ComplianceResult, Device, DeviceId,
    EvaluationContext, Identity, IssuedChallenge, MemoryChallengeStore, PolicyEvaluation,
    PolicyEvaluator, PolicyRef, PolicySource, PostureReport, SystemClock, score_posture,
    spawn_sweeper,
};
use tg_crypto::{CredentialKey, challenge_record, verify_signature};
use tg_token::{
    AccessClaims, CredentialIssuer, IssueOutcome, IssuedToken, TOKEN_ACCESS_TYPE, TokenVerifier,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::store::DeviceRepository;
use crate::{EngineError, EngineResult};

/// Denial reason for an unknown device.
pub const DEVICE_NOT_FOUND: &str = "Device not found";
/// Denial reason for a device owned by someone else.
pub const DEVICE_NOT_OWNED: &str = "Device does not belong to user";
/// Denial reason for a device that is not active and enrolled.
pub const DEVICE_INACTIVE: &str = "Device is not active or not enrolled";
/// Denial reason when credential minting fails after an allow.
pub const CREDENTIAL_FAILED: &str = "Access credential could not be issued";
/// Denial reason for a rejected posture submission.
pub const POSTURE_ATTESTATION_FAILED: &str = "Posture attestation failed";

/// Access type recorded for credential refreshes.
pub const REFRESH_ACCESS_TYPE: &str = "refresh";
/// Access type recorded for posture submissions.
pub const POSTURE_ACCESS_TYPE: &str = "posture_report";
/// Resource recorded for posture submissions.
pub const POSTURE_RESOURCE: &str = "device_posture";

// ─────────────────────────────────────────────────────────────────────────────
// Requests and Decisions
// ─────────────────────────────────────────────────────────────────────────────

/// A signed challenge presented by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    /// Challenge token previously issued to the device.
    pub token: String,
    /// Base64 signature over `{"challenge": token}`.
    pub signature: String,
}

/// A resource access request.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    /// Authenticated caller.
    pub identity: Identity,
    /// Device making the request.
    pub device_id: DeviceId,
    /// Requested resource.
    pub resource: String,
    /// Requested access type.
    pub access_type: String,
    /// Fresh posture report, if supplied.
    pub posture: Option<PostureReport>,
    /// Base64 signature over the posture report.
    pub signature: Option<String>,
    /// Signed challenge, if supplied.
    pub challenge: Option<ChallengeResponse>,
    /// Requested credential lifetime.
    pub ttl_minutes: Option<u32>,
}

impl AccessRequest {
    /// A request without attestation.
    #[must_use]
    pub fn new(
        identity: Identity,
        device_id: DeviceId,
        resource: impl Into<String>,
        access_type: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            device_id,
            resource: resource.into(),
            access_type: access_type.into(),
            posture: None,
            signature: None,
            challenge: None,
            ttl_minutes: None,
        }
    }

    /// Attach a signed posture report.
    #[must_use]
    pub fn with_posture(mut self, posture: PostureReport, signature: impl Into<String>) -> Self {
        self.posture = Some(posture);
        self.signature = Some(signature.into());
        self
    }

    /// Attach a signed challenge.
    #[must_use]
    pub fn with_challenge(mut self, token: impl Into<String>, signature: impl Into<String>) -> Self {
        self.challenge = Some(ChallengeResponse {
            token: token.into(),
            signature: signature.into(),
        });
        self
    }

    /// Request a credential lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, minutes: Option<u32>) -> Self {
        self.ttl_minutes = minutes;
        self
    }
}

/// Outcome of an access, token or refresh request.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    /// Final verdict.
    pub allowed: bool,
    /// Denial reason.
    pub reason: Option<String>,
    /// Denying policy id.
    pub policy_id: Option<uuid::Uuid>,
    /// Denying policy name.
    pub policy_name: Option<String>,
    /// Credential minted on allow.
    pub token: Option<IssuedToken>,
    /// Attestation result.
    pub attestation: AttestationOutcome,
    /// Compliance of a freshly attested posture.
    pub compliance: Option<ComplianceResult>,
    /// Policy verdict, when evaluation ran.
    pub evaluation: Option<PolicyEvaluation>,
}

impl AccessDecision {
    fn denied(reason: String, attestation: AttestationOutcome) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            policy_id: None,
            policy_name: None,
            token: None,
            attestation,
            compliance: None,
            evaluation: None,
        }
    }

    fn with_policy(mut self, policy: Option<&PolicyRef>) -> Self {
        self.policy_id = policy.map(|p| p.id);
        self.policy_name = policy.map(|p| p.name.clone());
        self
    }
}

/// A signed posture report submitted outside an access request.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureSubmission {
    /// Authenticated caller.
    pub identity: Identity,
    /// Reporting device.
    pub device_id: DeviceId,
    /// Posture report.
    pub posture: PostureReport,
    /// Base64 signature over the report.
    pub signature: String,
    /// Signed challenge, if the device was challenged.
    pub challenge: Option<ChallengeResponse>,
}

/// Outcome of a posture submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureOutcome {
    /// The report was attested and stored.
    pub accepted: bool,
    /// Rejection reason.
    pub reason: Option<String>,
    /// Compliance of the accepted report.
    pub compliance: Option<ComplianceResult>,
}

struct Attestation {
    outcome: AttestationOutcome,
    fresh_posture: Option<PostureReport>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// The trust decision engine.
pub struct TrustEngine {
    devices: Arc<dyn DeviceRepository>,
    evaluator: PolicyEvaluator,
    challenges: Arc<ChallengeManager>,
    issuer: CredentialIssuer,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    sweep_interval: std::time::Duration,
}

impl fmt::Debug for TrustEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustEngine")
            .field("evaluator", &self.evaluator)
            .field("challenges", &self.challenges)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TrustEngine`].
pub struct TrustEngineBuilder {
    devices: Arc<dyn DeviceRepository>,
    policies: Arc<dyn PolicySource>,
    config: EngineConfig,
    audit: Option<Arc<dyn AuditSink>>,
    clock: Option<Arc<dyn Clock>>,
    challenge_store: Option<Arc<dyn ChallengeStore>>,
    signing_key: Option<Arc<CredentialKey>>,
}

impl TrustEngineBuilder {
    /// Use `config` (defaults otherwise).
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Send audit events to `sink` (defaults to [`TracingSink`]).
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Read time from `clock` (defaults to [`SystemClock`]).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Keep challenges in `store` (defaults to [`MemoryChallengeStore`]).
    #[must_use]
    pub fn with_challenge_store(mut self, store: Arc<dyn ChallengeStore>) -> Self {
        self.challenge_store = Some(store);
        self
    }

    /// Sign credentials with `key`, overriding the configured key.
    #[must_use]
    pub fn with_signing_key(mut self, key: Arc<CredentialKey>) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidConfig`] if the configuration fails
    /// validation and [`EngineError::Crypto`] if the configured key is bad.
    pub fn build(self) -> EngineResult<TrustEngine> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let key = match self.signing_key {
            Some(key) => key,
            None => Arc::new(self.config.credentials.signing_key()?),
        };
        let evaluator =
            PolicyEvaluator::new(self.policies).with_options(self.config.policy.evaluator_options());
        let store = self
            .challenge_store
            .unwrap_or_else(|| Arc::new(MemoryChallengeStore::new()));
        let challenges = ChallengeManager::new(store, Arc::clone(&clock))
            .with_ttl(self.config.challenges.ttl());
        let issuer = CredentialIssuer::new(key, evaluator.clone(), Arc::clone(&clock))
            .with_default_ttl(self.config.credentials.default_ttl_minutes);

        Ok(TrustEngine {
            devices: self.devices,
            evaluator,
            challenges: Arc::new(challenges),
            issuer,
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingSink)),
            clock,
            sweep_interval: self.config.challenges.sweep_interval(),
        })
    }
}

impl TrustEngine {
    /// Start building an engine over the given storage collaborators.
    #[must_use]
    pub fn builder(
        devices: Arc<dyn DeviceRepository>,
        policies: Arc<dyn PolicySource>,
    ) -> TrustEngineBuilder {
        TrustEngineBuilder {
            devices,
            policies,
            config: EngineConfig::default(),
            audit: None,
            clock: None,
            challenge_store: None,
            signing_key: None,
        }
    }

    /// The challenge manager.
    #[must_use]
    pub const fn challenges(&self) -> &Arc<ChallengeManager> {
        &self.challenges
    }

    /// The credential verifier.
    #[must_use]
    pub const fn verifier(&self) -> &TokenVerifier {
        self.issuer.verifier()
    }

    /// Start the periodic expired-challenge sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_challenge_sweeper(&self) -> JoinHandle<()> {
        spawn_sweeper(Arc::clone(&self.challenges), self.sweep_interval)
    }

    /// Decide a resource access request.
    ///
    /// # Errors
    /// Returns [`EngineError::Store`] if a storage collaborator fails and
    /// [`EngineError::Audit`] if the audit event cannot be recorded.
    pub async fn evaluate_access(&self, request: AccessRequest) -> EngineResult<AccessDecision> {
        let now = self.clock.now();

        let device = match self.admit(&request.identity, request.device_id).await? {
            Ok(device) => device,
            Err(reason) => {
                let decision =
                    AccessDecision::denied(reason.to_string(), AttestationOutcome::NotSupplied);
                return self.conclude(&request, now, decision).await;
            }
        };

        let attestation = self.attest(&device, &request);
        let mut device = device;
        let mut compliance = None;
        if let Some(posture) = attestation.fresh_posture {
            let result = score_posture(&posture);
            device = self
                .devices
                .record_posture(device.id(), posture, &result, now)
                .await?;
            debug!(
                device_id = %device.id(),
                score = result.score,
                compliant = result.is_compliant,
                "fresh posture recorded"
            );
            compliance = Some(result);
        }

        let ctx = EvaluationContext::new(now)
            .with_roles(request.identity.roles.iter().cloned())
            .with_device(device.state())
            .with_posture(device.last_posture().cloned())
            .with_resource(request.resource.clone())
            .with_access_type(request.access_type.clone());
        let verdict = self.evaluator.evaluate(&ctx).await?;

        if !verdict.allowed {
            let reason = verdict
                .denial_reason
                .clone()
                .unwrap_or_else(|| "Denied by policy".to_string());
            let mut decision = AccessDecision::denied(reason, attestation.outcome)
                .with_policy(verdict.denied_by.as_ref());
            decision.compliance = compliance;
            decision.evaluation = Some(verdict);
            return self.conclude(&request, now, decision).await;
        }

        let decision = match self
            .issuer
            .issue(&request.identity, &device, &request.resource, request.ttl_minutes)
            .await
        {
            Ok(IssueOutcome::Issued(token)) => AccessDecision {
                allowed: true,
                reason: None,
                policy_id: None,
                policy_name: None,
                token: Some(token),
                attestation: attestation.outcome,
                compliance,
                evaluation: Some(verdict),
            },
            Ok(IssueOutcome::Denied(reissued)) => {
                let reason = reissued
                    .denial_reason
                    .clone()
                    .unwrap_or_else(|| "Denied by policy".to_string());
                let mut decision = AccessDecision::denied(reason, attestation.outcome)
                    .with_policy(reissued.denied_by.as_ref());
                decision.compliance = compliance;
                decision.evaluation = Some(reissued);
                decision
            }
            Err(err) => {
                error!(device_id = %device.id(), error = %err, "credential issuance failed");
                let mut decision =
                    AccessDecision::denied(CREDENTIAL_FAILED.to_string(), attestation.outcome);
                decision.compliance = compliance;
                decision.evaluation = Some(verdict);
                decision
            }
        };
        self.conclude(&request, now, decision).await
    }

    /// Decide a credential request without fresh attestation.
    ///
    /// # Errors
    /// As [`Self::evaluate_access`].
    pub async fn issue_token(
        &self,
        identity: Identity,
        device_id: DeviceId,
        resource: impl Into<String>,
        ttl_minutes: Option<u32>,
    ) -> EngineResult<AccessDecision> {
        let request = AccessRequest::new(identity, device_id, resource, TOKEN_ACCESS_TYPE)
            .with_ttl(ttl_minutes);
        self.evaluate_access(request).await
    }

    /// Verify an access credential.
    #[must_use]
    pub fn verify_token(&self, token: &str) -> Option<AccessClaims> {
        self.issuer.verifier().verify(token)
    }

    /// Replace a still-valid credential with a freshly decided one.
    ///
    /// # Errors
    /// As [`Self::evaluate_access`].
    pub async fn refresh_token(
        &self,
        old_token: &str,
        identity: Identity,
        device_id: DeviceId,
        ttl_minutes: Option<u32>,
    ) -> EngineResult<AccessDecision> {
        let now = self.clock.now();
        let resource = match self.issuer.verifier().verify_detailed(old_token) {
            Ok(claims) => claims.resource,
            Err(err) => {
                let request = AccessRequest::new(identity, device_id, "unknown", REFRESH_ACCESS_TYPE);
                let decision = AccessDecision::denied(
                    format!("Invalid credential: {err}"),
                    AttestationOutcome::NotSupplied,
                );
                return self.conclude(&request, now, decision).await;
            }
        };
        let request = AccessRequest::new(identity, device_id, resource, REFRESH_ACCESS_TYPE)
            .with_ttl(ttl_minutes);

        let device = match self.admit(&request.identity, device_id).await? {
            Ok(device) => device,
            Err(reason) => {
                let decision =
                    AccessDecision::denied(reason.to_string(), AttestationOutcome::NotSupplied);
                return self.conclude(&request, now, decision).await;
            }
        };

        let decision = match self
            .issuer
            .refresh(old_token, &request.identity, &device, ttl_minutes)
            .await
        {
            Ok(IssueOutcome::Issued(token)) => AccessDecision {
                allowed: true,
                reason: None,
                policy_id: None,
                policy_name: None,
                token: Some(token),
                attestation: AttestationOutcome::NotSupplied,
                compliance: None,
                evaluation: None,
            },
            Ok(IssueOutcome::Denied(verdict)) => {
                let reason = verdict
                    .denial_reason
                    .clone()
                    .unwrap_or_else(|| "Denied by policy".to_string());
                let mut decision = AccessDecision::denied(reason, AttestationOutcome::NotSupplied)
                    .with_policy(verdict.denied_by.as_ref());
                decision.evaluation = Some(verdict);
                decision
            }
            Err(tg_token::TokenError::PolicyUnavailable(err)) => return Err(err.into()),
            Err(err) => AccessDecision::denied(
                format!("Invalid credential: {err}"),
                AttestationOutcome::NotSupplied,
            ),
        };
        self.conclude(&request, now, decision).await
    }

    /// Issue a challenge to an owned, active device.
    ///
    /// # Errors
    /// Returns [`EngineError::Rejected`] if the device is unknown, owned by
    /// someone else or not active, and [`EngineError::Store`] on storage
    /// failure.
    pub async fn issue_challenge(
        &self,
        identity: &Identity,
        device_id: DeviceId,
    ) -> EngineResult<IssuedChallenge> {
        match self.admit(identity, device_id).await? {
            Ok(device) => Ok(self.challenges.issue(device.id())),
            Err(reason) => {
                debug!(%device_id, reason, "challenge refused");
                Err(EngineError::Rejected(reason.to_string()))
            }
        }
    }

    /// Accept a signed posture report and update the device's compliance.
    ///
    /// # Errors
    /// Returns [`EngineError::Store`] if a storage collaborator fails and
    /// [`EngineError::Audit`] if the audit event cannot be recorded.
    pub async fn submit_posture(&self, submission: PostureSubmission) -> EngineResult<PostureOutcome> {
        let now = self.clock.now();
        let mut request = AccessRequest::new(
            submission.identity,
            submission.device_id,
            POSTURE_RESOURCE,
            POSTURE_ACCESS_TYPE,
        )
        .with_posture(submission.posture, submission.signature);
        request.challenge = submission.challenge;

        let device = match self.admit(&request.identity, request.device_id).await? {
            Ok(device) => device,
            Err(reason) => {
                let decision =
                    AccessDecision::denied(reason.to_string(), AttestationOutcome::NotSupplied);
                self.conclude(&request, now, decision).await?;
                return Ok(PostureOutcome {
                    accepted: false,
                    reason: Some(reason.to_string()),
                    compliance: None,
                });
            }
        };

        let attestation = self.attest(&device, &request);
        let Some(posture) = attestation.fresh_posture else {
            let decision = AccessDecision::denied(
                POSTURE_ATTESTATION_FAILED.to_string(),
                attestation.outcome,
            );
            self.conclude(&request, now, decision).await?;
            return Ok(PostureOutcome {
                accepted: false,
                reason: Some(POSTURE_ATTESTATION_FAILED.to_string()),
                compliance: None,
            });
        };

        let result = score_posture(&posture);
        self.devices
            .record_posture(device.id(), posture, &result, now)
            .await?;
        info!(
            device_id = %device.id(),
            score = result.score,
            compliant = result.is_compliant,
            "posture report accepted"
        );

        let decision = AccessDecision {
            allowed: true,
            reason: None,
            policy_id: None,
            policy_name: None,
            token: None,
            attestation: attestation.outcome,
            compliance: Some(result.clone()),
            evaluation: None,
        };
        self.conclude(&request, now, decision).await?;
        Ok(PostureOutcome {
            accepted: true,
            reason: None,
            compliance: Some(result),
        })
    }

    /// Load the device and check ownership and enrollment.
    async fn admit(
        &self,
        identity: &Identity,
        device_id: DeviceId,
    ) -> EngineResult<Result<Device, &'static str>> {
        let Some(device) = self.devices.load(device_id).await? else {
            return Ok(Err(DEVICE_NOT_FOUND));
        };
        if !device.is_owned_by(&identity.user_id) {
            return Ok(Err(DEVICE_NOT_OWNED));
        }
        if !device.is_usable() {
            return Ok(Err(DEVICE_INACTIVE));
        }
        Ok(Ok(device))
    }

    /// Verify whatever attestation the request carries.
    ///
    /// Any failed proof discards the fresh posture.
    fn attest(&self, device: &Device, request: &AccessRequest) -> Attestation {
        let key = device.public_key();
        let mut supplied = false;
        let mut failed = false;

        if let Some(challenge) = &request.challenge {
            supplied = true;
            let signed =
                verify_signature(&challenge_record(&challenge.token), &challenge.signature, key);
            if !signed {
                warn!(device_id = %device.id(), "challenge signature rejected");
                failed = true;
            } else if let Err(rejection) = self
                .challenges
                .verify_detailed(&challenge.token, device.id())
            {
                warn!(device_id = %device.id(), reason = %rejection, "challenge rejected");
                failed = true;
            }
        }

        let mut fresh_posture = None;
        match (&request.posture, &request.signature) {
            (Some(posture), Some(signature)) => {
                supplied = true;
                if verify_signature(&posture.to_value(), signature, key) {
                    fresh_posture = Some(posture.clone());
                } else {
                    warn!(
                        device_id = %device.id(),
                        "posture signature rejected, using stored posture"
                    );
                    failed = true;
                }
            }
            (Some(_), None) => debug!(device_id = %device.id(), "unsigned posture ignored"),
            (None, Some(_)) => debug!(device_id = %device.id(), "signature without posture ignored"),
            (None, None) => {}
        }

        let outcome = if failed {
            fresh_posture = None;
            AttestationOutcome::Failed
        } else if supplied {
            AttestationOutcome::Verified
        } else {
            AttestationOutcome::NotSupplied
        };
        Attestation {
            outcome,
            fresh_posture,
        }
    }

    /// Record the single audit event for `request` and return `decision`.
    async fn conclude(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
        decision: AccessDecision,
    ) -> EngineResult<AccessDecision> {
        let event = if decision.allowed {
            AuditEvent::granted(
                request.identity.user_id.clone(),
                request.device_id,
                request.resource.clone(),
                request.access_type.clone(),
                now,
            )
        } else {
            AuditEvent::denied(
                request.identity.user_id.clone(),
                request.device_id,
                request.resource.clone(),
                request.access_type.clone(),
                now,
                decision.reason.clone().unwrap_or_default(),
            )?
        };
        let policy = decision
            .policy_id
            .zip(decision.policy_name.clone())
            .map(|(id, name)| PolicyRef { id, name });
        let event = event
            .with_policy(policy.as_ref())
            .with_attestation(decision.attestation);
        self.audit.record(event).await?;

        if decision.allowed {
            debug!(
                device_id = %request.device_id,
                resource = %request.resource,
                access_type = %request.access_type,
                "access allowed"
            );
        } else {
            debug!(
                device_id = %request.device_id,
                resource = %request.resource,
                reason = decision.reason.as_deref().unwrap_or_default(),
                "access denied"
            );
        }
        Ok(decision)
    }
}
