//! Prioritized access policies and their evaluation.
//!
//! A policy document looks like:
//!
//! ```json
//! {
//!   "name": "engineering-compliant",
//!   "priority": 200,
//!   "enforce_mode": "enforce",
//!   "is_active": true,
//!   "rules": {
//!     "action": "allow",
//!     "conditions": {
//!       "user_roles": ["engineering"],
//!       "device_compliant": true,
//!       "time_restrictions": {"allowed_hours": [8, 9, 10], "allowed_days": [0, 1, 2, 3, 4]}
//!     }
//!   }
//! }
//! ```
//!
//! Policies run highest priority first. Any violated condition fails the
//! policy; `action` only changes the wording of the reason. A failing
//! `enforce` policy ends evaluation with a denial, a failing `monitor` policy
//! is recorded and ignored, and `disabled` policies never run.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::compliance::PostureReport;
use crate::device::DeviceState;
use crate::{CoreError, CoreResult, StoreResult};

// ─────────────────────────────────────────────────────────────────────────────
// Rule Document
// ─────────────────────────────────────────────────────────────────────────────

/// Declared intent of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    /// Grant when every condition holds.
    #[default]
    Allow,
    /// Deny when any condition is violated.
    Deny,
}

/// How a failing policy affects the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforceMode {
    /// Failure denies the request.
    #[default]
    Enforce,
    /// Failure is recorded only.
    Monitor,
    /// Never evaluated.
    Disabled,
}

impl EnforceMode {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Monitor => "monitor",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for EnforceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A weekday given either as an index (0 = Monday) or an English name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaySpec {
    /// 0 = Monday ... 6 = Sunday.
    Index(u8),
    /// `"monday"`, `"Mon"`, ...
    Name(String),
}

impl DaySpec {
    /// Resolve to a weekday, if valid.
    #[must_use]
    pub fn weekday(&self) -> Option<Weekday> {
        match self {
            Self::Index(i) => Weekday::try_from(*i).ok(),
            Self::Name(name) => Weekday::from_str(name.trim()).ok(),
        }
    }
}

impl fmt::Display for DaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Allowed UTC hours and weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRestrictions {
    /// Hours of day (0..=23) during which access is allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_hours: Option<Vec<u32>>,
    /// Days on which access is allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_days: Option<Vec<DaySpec>>,
}

/// Conditions of a policy. Absent conditions are not checked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyConditions {
    /// Caller must hold at least one of these roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_roles: Option<Vec<String>>,
    /// Required device compliance state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_compliant: Option<bool>,
    /// Required device enrollment status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_status: Option<String>,
    /// Expected posture values, keyed by check name or dotted path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posture_checks: Option<Map<String, Value>>,
    /// UTC time windows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_restrictions: Option<TimeRestrictions>,
    /// Condition kinds this evaluator does not understand.
    #[serde(flatten)]
    pub unrecognized: Map<String, Value>,
}

/// The `rules` document of a policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyRules {
    /// Conditions to check.
    #[serde(default)]
    pub conditions: PolicyConditions,
    /// Declared action.
    #[serde(default)]
    pub action: PolicyAction,
}

impl PolicyRules {
    /// Rules with the given conditions and action.
    #[must_use]
    pub const fn new(conditions: PolicyConditions, action: PolicyAction) -> Self {
        Self { conditions, action }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// A named, prioritized access rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolicyDocument")]
pub struct Policy {
    id: Uuid,
    name: String,
    priority: i64,
    rules: PolicyRules,
    enforce_mode: EnforceMode,
    is_active: bool,
}

#[derive(Deserialize)]
struct PolicyDocument {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    name: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    rules: PolicyRules,
    #[serde(default)]
    enforce_mode: EnforceMode,
    #[serde(default = "default_active")]
    is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl TryFrom<PolicyDocument> for Policy {
    type Error = CoreError;

    fn try_from(doc: PolicyDocument) -> Result<Self, Self::Error> {
        Ok(Self::new(doc.name, doc.priority, doc.rules)?
            .with_id(doc.id)
            .with_enforce_mode(doc.enforce_mode)
            .with_active(doc.is_active))
    }
}

impl Policy {
    /// Create an active, enforcing policy.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPolicy`] if the name is blank, an hour is
    /// outside 0..=23, or a day is not a weekday index or name.
    pub fn new(name: impl Into<String>, priority: i64, rules: PolicyRules) -> CoreResult<Self> {
        let name = name.into();
        let invalid = |message: String| CoreError::InvalidPolicy {
            name: name.clone(),
            message,
        };

        if name.trim().is_empty() {
            return Err(invalid("name is empty".into()));
        }
        if let Some(window) = &rules.conditions.time_restrictions {
            if let Some(hour) = window.allowed_hours.iter().flatten().find(|h| **h > 23) {
                return Err(invalid(format!("hour {hour} out of range")));
            }
            if let Some(day) = window
                .allowed_days
                .iter()
                .flatten()
                .find(|d| d.weekday().is_none())
            {
                return Err(invalid(format!("'{day}' is not a weekday")));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            priority,
            rules,
            enforce_mode: EnforceMode::Enforce,
            is_active: true,
        })
    }

    /// Parse a policy from its JSON document.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPolicy`] if the document is malformed or
    /// fails validation.
    pub fn from_json(value: Value) -> CoreResult<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();
        serde_json::from_value(value).map_err(|err| CoreError::InvalidPolicy {
            name,
            message: err.to_string(),
        })
    }

    /// Set the id.
    #[must_use]
    pub const fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set the enforce mode.
    #[must_use]
    pub const fn with_enforce_mode(mut self, mode: EnforceMode) -> Self {
        self.enforce_mode = mode;
        self
    }

    /// Set the active flag.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Policy id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Priority; higher runs first.
    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }

    /// Rule document.
    #[must_use]
    pub const fn rules(&self) -> &PolicyRules {
        &self.rules
    }

    /// Enforce mode.
    #[must_use]
    pub const fn enforce_mode(&self) -> EnforceMode {
        self.enforce_mode
    }

    /// Active flag.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether the evaluator considers this policy at all.
    #[must_use]
    pub fn is_applicable(&self) -> bool {
        self.is_active && self.enforce_mode != EnforceMode::Disabled
    }

    /// Reference used in decisions and audit records.
    #[must_use]
    pub fn reference(&self) -> PolicyRef {
        PolicyRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Check every condition against `ctx` and collect violations.
    #[must_use]
    pub fn violations(&self, ctx: &EvaluationContext) -> Vec<String> {
        let conditions = &self.rules.conditions;
        let mut violations = Vec::new();

        if !conditions.unrecognized.is_empty() {
            let kinds: Vec<&str> = conditions.unrecognized.keys().map(String::as_str).collect();
            debug!(policy = %self.name, ?kinds, "ignoring unrecognized policy conditions");
        }

        if let Some(required) = &conditions.user_roles {
            if !required.iter().any(|role| ctx.user_roles.contains(role)) {
                violations.push(format!(
                    "User lacks a required role (one of: {})",
                    required.join(", ")
                ));
            }
        }

        if let Some(expected) = conditions.device_compliant {
            match &ctx.device {
                None => violations.push("No device supplied for compliance check".into()),
                Some(device) if device.is_compliant != expected => violations.push(format!(
                    "Device compliance is {}, required {expected}",
                    device.is_compliant
                )),
                Some(_) => {}
            }
        }

        if let Some(expected) = &conditions.device_status {
            match &ctx.device {
                None => violations.push("No device supplied for status check".into()),
                Some(device) if device.status.as_str() != expected => violations.push(format!(
                    "Device status is '{}', required '{expected}'",
                    device.status
                )),
                Some(_) => {}
            }
        }

        if let (Some(checks), Some(posture)) = (&conditions.posture_checks, &ctx.posture) {
            for (key, expected) in checks {
                match posture.lookup(key) {
                    Some(actual) if actual == expected => {}
                    Some(actual) => violations.push(format!(
                        "Posture check '{key}' failed: expected {expected}, got {actual}"
                    )),
                    None => violations.push(format!(
                        "Posture check '{key}' failed: expected {expected}, got nothing"
                    )),
                }
            }
        }

        if let Some(window) = &conditions.time_restrictions {
            if let Some(hours) = &window.allowed_hours {
                let hour = ctx.now.hour();
                if !hours.contains(&hour) {
                    violations.push(format!("Access not allowed at hour {hour} UTC"));
                }
            }
            if let Some(days) = &window.allowed_days {
                let today = ctx.now.weekday();
                if !days.iter().any(|d| d.weekday() == Some(today)) {
                    violations.push(format!("Access not allowed on {}", weekday_name(today)));
                }
            }
        }

        violations
    }

    /// Evaluate this policy against `ctx`.
    #[must_use]
    pub fn evaluate(&self, ctx: &EvaluationContext) -> PolicyEvaluationResult {
        let violations = self.violations(ctx);
        let allowed = violations.is_empty();
        let reason = if allowed {
            format!("Policy '{}' conditions satisfied", self.name)
        } else {
            match self.rules.action {
                PolicyAction::Allow => format!(
                    "Policy '{}' requirements not met: {}",
                    self.name,
                    violations.join("; ")
                ),
                PolicyAction::Deny => {
                    format!("Denied by policy '{}': {}", self.name, violations.join("; "))
                }
            }
        };
        PolicyEvaluationResult {
            allowed,
            policy_id: self.id,
            policy_name: self.name.clone(),
            enforce_mode: self.enforce_mode,
            reason,
            violations,
        }
    }
}

const fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluation
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a policy may look at.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    /// Roles held by the caller.
    pub user_roles: Vec<String>,
    /// Device state, if a device is involved.
    pub device: Option<DeviceState>,
    /// Posture used for `posture_checks`.
    pub posture: Option<PostureReport>,
    /// Requested resource.
    pub resource: Option<String>,
    /// Requested access type.
    pub access_type: Option<String>,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    /// Context with only a timestamp.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            user_roles: Vec::new(),
            device: None,
            posture: None,
            resource: None,
            access_type: None,
            now,
        }
    }

    /// Set the caller's roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Set the device state.
    #[must_use]
    pub const fn with_device(mut self, device: DeviceState) -> Self {
        self.device = Some(device);
        self
    }

    /// Set the posture report.
    #[must_use]
    pub fn with_posture(mut self, posture: Option<PostureReport>) -> Self {
        self.posture = posture;
        self
    }

    /// Set the resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the access type.
    #[must_use]
    pub fn with_access_type(mut self, access_type: impl Into<String>) -> Self {
        self.access_type = Some(access_type.into());
        self
    }
}

/// Outcome of one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluationResult {
    /// No condition was violated.
    pub allowed: bool,
    /// Policy id.
    pub policy_id: Uuid,
    /// Policy name.
    pub policy_name: String,
    /// Mode the policy ran in.
    pub enforce_mode: EnforceMode,
    /// Human-readable outcome.
    pub reason: String,
    /// Violated conditions.
    pub violations: Vec<String>,
}

/// Identity of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRef {
    /// Policy id.
    pub id: Uuid,
    /// Policy name.
    pub name: String,
}

/// Overall verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    /// Final verdict.
    pub allowed: bool,
    /// Per-policy outcomes, in evaluation order.
    pub results: Vec<PolicyEvaluationResult>,
    /// Reason for a denial.
    pub denial_reason: Option<String>,
    /// Policy that denied, if any.
    pub denied_by: Option<PolicyRef>,
}

impl PolicyEvaluation {
    fn allow(results: Vec<PolicyEvaluationResult>) -> Self {
        Self {
            allowed: true,
            results,
            denial_reason: None,
            denied_by: None,
        }
    }
}

/// Verdict when no applicable policy exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultVerdict {
    /// Fail open.
    #[default]
    Allow,
    /// Fail closed.
    Deny,
}

/// Evaluator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvaluatorOptions {
    /// Verdict when no applicable policy exists.
    #[serde(default)]
    pub default_verdict: DefaultVerdict,
}

/// Reason given when the default verdict is deny.
pub const NO_POLICY_REASON: &str = "No active policy permits access";

/// Evaluate `policies` against `ctx`.
///
/// Inactive and disabled policies are skipped. The rest run by descending
/// priority (ties by name). The first failing `enforce` policy stops
/// evaluation and denies.
#[must_use]
pub fn evaluate_policies(
    policies: &[Policy],
    ctx: &EvaluationContext,
    options: EvaluatorOptions,
) -> PolicyEvaluation {
    let mut applicable: Vec<&Policy> = policies.iter().filter(|p| p.is_applicable()).collect();

    if applicable.is_empty() {
        return match options.default_verdict {
            DefaultVerdict::Allow => {
                debug!("no applicable policies, allowing by default");
                PolicyEvaluation::allow(Vec::new())
            }
            DefaultVerdict::Deny => {
                debug!("no applicable policies, denying by default");
                PolicyEvaluation {
                    allowed: false,
                    results: Vec::new(),
                    denial_reason: Some(NO_POLICY_REASON.to_string()),
                    denied_by: None,
                }
            }
        };
    }

    applicable.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut results = Vec::with_capacity(applicable.len());
    for policy in applicable {
        let result = policy.evaluate(ctx);
        let allowed = result.allowed;
        let reason = result.reason.clone();
        results.push(result);

        if allowed {
            continue;
        }
        match policy.enforce_mode {
            EnforceMode::Enforce => {
                debug!(policy = %policy.name, %reason, "policy denied request");
                return PolicyEvaluation {
                    allowed: false,
                    results,
                    denial_reason: Some(reason),
                    denied_by: Some(policy.reference()),
                };
            }
            EnforceMode::Monitor => {
                info!(policy = %policy.name, %reason, "monitor-mode policy would deny");
            }
            EnforceMode::Disabled => {}
        }
    }

    PolicyEvaluation::allow(results)
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy Source
// ─────────────────────────────────────────────────────────────────────────────

/// Supplies a consistent snapshot of policies.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// All active policies.
    async fn active_policies(&self) -> StoreResult<Vec<Policy>>;
}

/// In-memory policy set.
#[derive(Debug, Default)]
pub struct StaticPolicySource {
    policies: RwLock<Vec<Policy>>,
}

impl StaticPolicySource {
    /// Create a source holding `policies`.
    #[must_use]
    pub fn new(policies: Vec<Policy>) -> Self {
        Self {
            policies: RwLock::new(policies),
        }
    }

    /// Replace the whole set.
    pub fn replace(&self, policies: Vec<Policy>) {
        *self.policies.write() = policies;
    }

    /// Add or replace (by name) one policy.
    pub fn upsert(&self, policy: Policy) {
        let mut policies = self.policies.write();
        policies.retain(|p| p.name != policy.name);
        policies.push(policy);
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn active_policies(&self) -> StoreResult<Vec<Policy>> {
        Ok(self
            .policies
            .read()
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }
}

/// Evaluates requests against a [`PolicySource`].
#[derive(Clone)]
pub struct PolicyEvaluator {
    source: Arc<dyn PolicySource>,
    options: EvaluatorOptions,
}

impl fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PolicyEvaluator {
    /// Create an evaluator with default options.
    #[must_use]
    pub fn new(source: Arc<dyn PolicySource>) -> Self {
        Self {
            source,
            options: EvaluatorOptions::default(),
        }
    }

    /// Set evaluator options.
    #[must_use]
    pub const fn with_options(mut self, options: EvaluatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options.
    #[must_use]
    pub const fn options(&self) -> EvaluatorOptions {
        self.options
    }

    /// Evaluate `ctx` against the current policy snapshot.
    ///
    /// # Errors
    /// Returns the source's error if the snapshot cannot be loaded.
    pub async fn evaluate(&self, ctx: &EvaluationContext) -> StoreResult<PolicyEvaluation> {
        let policies = self.source.active_policies().await?;
        Ok(evaluate_policies(&policies, ctx, self.options))
    }
}
