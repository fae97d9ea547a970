//! Enrolled devices and caller identities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compliance::{ComplianceResult, PostureReport};
use crate::{CoreError, CoreResult};

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Generate a random device id.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DeviceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|err| CoreError::InvalidIdentifier(format!("device id '{s}': {err}")))
    }
}

/// User identifier as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidIdentifier`] if `id` is blank.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidIdentifier("user id is empty".into()));
        }
        Ok(Self(id))
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Enrollment
// ─────────────────────────────────────────────────────────────────────────────

/// Enrollment status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Enrollment started, code not yet validated.
    #[default]
    Pending,
    /// Enrolled and allowed to request access.
    Active,
    /// Enrollment refused by an administrator.
    Rejected,
    /// Previously active, since disabled.
    Inactive,
}

impl EnrollmentStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────────

/// An enrolled endpoint.
///
/// Compliance and the posture snapshot only change together, through
/// [`Device::record_posture`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    id: DeviceId,
    owner_id: UserId,
    name: String,
    status: EnrollmentStatus,
    is_enrolled: bool,
    public_key: Option<String>,
    is_compliant: bool,
    last_posture: Option<PostureReport>,
    last_posture_at: Option<DateTime<Utc>>,
}

impl Device {
    /// Create a device at the start of enrollment.
    #[must_use]
    pub fn new(id: DeviceId, owner_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            status: EnrollmentStatus::Pending,
            is_enrolled: false,
            public_key: None,
            is_compliant: false,
            last_posture: None,
            last_posture_at: None,
        }
    }

    /// Complete enrollment, binding the device attestation key.
    #[must_use]
    pub fn enrolled(mut self, public_key: impl Into<String>) -> Self {
        self.status = EnrollmentStatus::Active;
        self.is_enrolled = true;
        self.public_key = Some(public_key.into());
        self
    }

    /// Override the enrollment status.
    #[must_use]
    pub const fn with_status(mut self, status: EnrollmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Device id.
    #[must_use]
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    /// Owning user.
    #[must_use]
    pub const fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enrollment status.
    #[must_use]
    pub const fn status(&self) -> EnrollmentStatus {
        self.status
    }

    /// Whether enrollment completed.
    #[must_use]
    pub const fn is_enrolled(&self) -> bool {
        self.is_enrolled
    }

    /// Stored attestation key (PEM or base64 DER).
    #[must_use]
    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    /// Last known compliance verdict.
    #[must_use]
    pub const fn is_compliant(&self) -> bool {
        self.is_compliant
    }

    /// Last posture report on record.
    #[must_use]
    pub const fn last_posture(&self) -> Option<&PostureReport> {
        self.last_posture.as_ref()
    }

    /// When the last posture report was recorded.
    #[must_use]
    pub const fn last_posture_at(&self) -> Option<DateTime<Utc>> {
        self.last_posture_at
    }

    /// Whether the device may request access at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.status == EnrollmentStatus::Active && self.is_enrolled
    }

    /// Whether `user` owns this device.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_id == user
    }

    /// Replace the latest posture and its compliance verdict.
    pub fn record_posture(
        &mut self,
        report: PostureReport,
        result: &ComplianceResult,
        at: DateTime<Utc>,
    ) {
        self.is_compliant = result.is_compliant;
        self.last_posture = Some(report);
        self.last_posture_at = Some(at);
    }

    /// The slice of device state the policy evaluator reads.
    #[must_use]
    pub const fn state(&self) -> DeviceState {
        DeviceState {
            is_compliant: self.is_compliant,
            status: self.status,
        }
    }
}

/// Device attributes consumed by policy conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    /// Last known compliance verdict.
    pub is_compliant: bool,
    /// Enrollment status.
    pub status: EnrollmentStatus,
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated caller, as resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id (token subject).
    pub user_id: UserId,
    /// Login name.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Realm roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Identity {
    /// Create an identity without roles.
    #[must_use]
    pub fn new(user_id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            email: email.into(),
            roles: Vec::new(),
        }
    }

    /// Attach roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::score_posture;
    use chrono::TimeZone;
    use serde_json::json;

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    #[test]
    fn new_device_is_pending_and_unusable() {
        let device = Device::new(DeviceId::new_v4(), alice(), "laptop");
        assert_eq!(device.status(), EnrollmentStatus::Pending);
        assert!(!device.is_enrolled());
        assert!(!device.is_usable());
        assert!(device.public_key().is_none());
    }

    #[test]
    fn enrolled_device_is_usable() {
        let device = Device::new(DeviceId::new_v4(), alice(), "laptop").enrolled("PEM");
        assert!(device.is_usable());
        assert_eq!(device.public_key(), Some("PEM"));
    }

    #[test]
    fn inactive_device_is_unusable() {
        let device = Device::new(DeviceId::new_v4(), alice(), "laptop")
            .enrolled("PEM")
            .with_status(EnrollmentStatus::Inactive);
        assert!(!device.is_usable());
    }

    #[test]
    fn ownership() {
        let device = Device::new(DeviceId::new_v4(), alice(), "laptop");
        assert!(device.is_owned_by(&alice()));
        assert!(!device.is_owned_by(&UserId::new("bob").unwrap()));
    }

    #[test]
    fn record_posture_updates_compliance_and_snapshot_together() {
        let mut device = Device::new(DeviceId::new_v4(), alice(), "laptop").enrolled("PEM");
        let report = PostureReport::from_value(json!({
            "antivirus": {"installed": true, "running": true},
            "firewall": {"firewall_enabled": true},
            "disk_encryption": {"encryption_enabled": true},
            "screen_lock": {"screen_lock_enabled": true}
        }))
        .unwrap();
        let result = score_posture(&report);
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();

        device.record_posture(report.clone(), &result, at);

        assert!(device.is_compliant());
        assert_eq!(device.last_posture(), Some(&report));
        assert_eq!(device.last_posture_at(), Some(at));
        assert!(device.state().is_compliant);
    }

    #[test]
    fn device_id_parse() {
        let id = DeviceId::new_v4();
        assert_eq!(id.to_string().parse::<DeviceId>().unwrap(), id);
        assert!(matches!(
            "nope".parse::<DeviceId>(),
            Err(CoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn blank_user_id_rejected() {
        assert!(UserId::new("  ").is_err());
    }

    #[test]
    fn status_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&EnrollmentStatus::Inactive).unwrap(),
            "\"inactive\""
        );
        let parsed: EnrollmentStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(parsed, EnrollmentStatus::Active);
    }

    #[test]
    fn identity_with_roles() {
        let identity = Identity::new(alice(), "alice", "alice@example.com")
            .with_roles(["engineering", "vpn-users"]);
        assert_eq!(identity.roles, vec!["engineering", "vpn-users"]);
    }
}
