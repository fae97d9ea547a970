//! Access credential claim set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tg_core::{DeviceId, PostureSummary};

/// Claims of a device access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user id.
    pub sub: String,
    /// User id (mirrors `sub`).
    pub user_id: String,
    /// Login name.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Device the credential is bound to.
    pub device_id: DeviceId,
    /// Device display name.
    pub device_name: String,
    /// Whether the latest posture on record scored as compliant.
    pub posture_passed: bool,
    /// Stored device compliance flag.
    pub is_compliant: bool,
    /// Resource the credential grants access to.
    pub resource: String,
    /// Compliance snapshot at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posture_summary: Option<PostureSummary>,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
    /// Always `device_access`.
    pub token_type: String,
    /// Unique credential id.
    pub jti: String,
}

impl AccessClaims {
    /// Issue time.
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    /// Expiry time.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Whether the credential is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims() -> AccessClaims {
        AccessClaims {
            sub: "u-1".into(),
            user_id: "u-1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            device_id: DeviceId::new_v4(),
            device_name: "laptop".into(),
            posture_passed: true,
            is_compliant: true,
            resource: "vpn".into(),
            posture_summary: None,
            iat: 1_700_000_000,
            exp: 1_700_000_900,
            iss: crate::ISSUER.into(),
            aud: crate::AUDIENCE.into(),
            token_type: crate::TOKEN_TYPE.into(),
            jti: "j".into(),
        }
    }

    #[test]
    fn absent_summary_is_omitted() {
        let value = serde_json::to_value(claims()).unwrap();
        assert!(value.get("posture_summary").is_none());
        assert_eq!(value["token_type"], json!("device_access"));
    }

    #[test]
    fn expiry_boundary() {
        let c = claims();
        let exp = c.expires_at().unwrap();
        assert!(c.is_expired_at(exp));
        assert!(!c.is_expired_at(exp - chrono::Duration::seconds(1)));
        assert_eq!(c.issued_at().unwrap().timestamp(), 1_700_000_000);
    }
}
