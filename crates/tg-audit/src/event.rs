//! Audit event record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tg_core::{DeviceId, PolicyRef, UserId};
use uuid::Uuid;

use crate::{AuditError, AuditResult};

/// What happened to the device attestation on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationOutcome {
    /// A signature was supplied and verified.
    Verified,
    /// A signature or challenge was supplied and rejected.
    Failed,
    /// Nothing was supplied.
    #[default]
    NotSupplied,
}

impl AttestationOutcome {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::NotSupplied => "not_supplied",
        }
    }
}

impl fmt::Display for AttestationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub event_id: Uuid,
    /// Decision time.
    pub occurred_at: DateTime<Utc>,
    /// Caller.
    pub user_id: UserId,
    /// Device named in the request.
    pub device_id: DeviceId,
    /// Requested resource.
    pub resource: String,
    /// Requested access type.
    pub access_type: String,
    /// Final verdict.
    pub granted: bool,
    /// Why access was denied (always set on denials).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Deciding policy id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<Uuid>,
    /// Deciding policy name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    /// Attestation result for this request.
    #[serde(default)]
    pub attestation: AttestationOutcome,
}

impl AuditEvent {
    /// Record a granted request.
    #[must_use]
    pub fn granted(
        user_id: UserId,
        device_id: DeviceId,
        resource: impl Into<String>,
        access_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at,
            user_id,
            device_id,
            resource: resource.into(),
            access_type: access_type.into(),
            granted: true,
            reason: None,
            policy_id: None,
            policy_name: None,
            attestation: AttestationOutcome::NotSupplied,
        }
    }

    /// Record a denied request.
    ///
    /// # Errors
    /// Returns [`AuditError::MissingReason`] if `reason` is blank.
    pub fn denied(
        user_id: UserId,
        device_id: DeviceId,
        resource: impl Into<String>,
        access_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> AuditResult<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(AuditError::MissingReason);
        }
        let mut event = Self::granted(user_id, device_id, resource, access_type, occurred_at);
        event.granted = false;
        event.reason = Some(reason);
        Ok(event)
    }

    /// Attach the deciding policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Option<&PolicyRef>) -> Self {
        self.policy_id = policy.map(|p| p.id);
        self.policy_name = policy.map(|p| p.name.clone());
        self
    }

    /// Attach the attestation outcome.
    #[must_use]
    pub const fn with_attestation(mut self, attestation: AttestationOutcome) -> Self {
        self.attestation = attestation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> UserId {
        UserId::new("alice").unwrap()
    }

    #[test]
    fn denial_requires_reason() {
        let result = AuditEvent::denied(user(), DeviceId::new_v4(), "vpn", "read", Utc::now(), "  ");
        assert_eq!(result, Err(AuditError::MissingReason));
    }

    #[test]
    fn denial_carries_policy() {
        let policy = PolicyRef {
            id: Uuid::new_v4(),
            name: "admins-only".into(),
        };
        let event = AuditEvent::denied(
            user(),
            DeviceId::new_v4(),
            "vpn",
            "read",
            Utc::now(),
            "Denied by policy 'admins-only'",
        )
        .unwrap()
        .with_policy(Some(&policy))
        .with_attestation(AttestationOutcome::Failed);

        assert!(!event.granted);
        assert_eq!(event.policy_id, Some(policy.id));
        assert_eq!(event.policy_name.as_deref(), Some("admins-only"));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["attestation"], json!("failed"));
        assert_eq!(value["granted"], json!(false));
    }

    #[test]
    fn granted_event_omits_empty_fields() {
        let event = AuditEvent::granted(user(), DeviceId::new_v4(), "vpn", "read", Utc::now());
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("reason").is_none());
        assert!(value.get("policy_id").is_none());
        assert_eq!(value["attestation"], json!("not_supplied"));
    }
}
