//! Device posture reports and compliance scoring.
//!
//! The endpoint agent reports a record of named checks:
//!
//! ```json
//! {
//!   "antivirus": {"installed": true, "running": true},
//!   "firewall": {"firewall_enabled": true},
//!   "disk_encryption": {"encryption_enabled": true},
//!   "screen_lock": {"screen_lock_enabled": true},
//!   "os_info": {"pending_updates": 0, "name": "macOS"}
//! }
//! ```
//!
//! Scoring starts at 100 and subtracts a fixed weight per failed check, in a
//! fixed order. A device is compliant at [`COMPLIANCE_THRESHOLD`] or above.
//! A missing or mistyped boolean check counts as failed; a missing update
//! count counts as zero pending updates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CoreError, CoreResult};

/// Minimum score for a compliant device.
pub const COMPLIANCE_THRESHOLD: u8 = 70;

/// Penalty when antivirus is not both installed and running.
pub const ANTIVIRUS_WEIGHT: u8 = 30;
/// Penalty when the firewall is off.
pub const FIREWALL_WEIGHT: u8 = 25;
/// Penalty when the disk is not encrypted.
pub const DISK_ENCRYPTION_WEIGHT: u8 = 25;
/// Penalty when too many OS updates are pending.
pub const UPDATES_WEIGHT: u8 = 10;
/// Penalty when screen lock is off.
pub const SCREEN_LOCK_WEIGHT: u8 = 10;

/// Pending OS updates tolerated before the updates check fails.
pub const MAX_PENDING_UPDATES: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Posture Report
// ─────────────────────────────────────────────────────────────────────────────

/// A posture report exactly as the device sent (and signed) it.
///
/// The raw record is kept so its canonical form can be re-derived for
/// signature checks; extra keys are preserved and ignored by scoring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostureReport(Map<String, Value>);

impl PostureReport {
    /// Wrap a JSON object.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPosture`] if `value` is not an object.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::InvalidPosture(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Wrap an already-decoded map.
    #[must_use]
    pub const fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// The raw record.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The raw record as a JSON value (for canonicalization).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Resolve a key or dotted path (`firewall.firewall_enabled`).
    ///
    /// An exact top-level key match wins over path traversal.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    fn flag(&self, section: &str, field: &str) -> bool {
        self.0
            .get(section)
            .and_then(|s| s.get(field))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Antivirus installed and running.
    #[must_use]
    pub fn antivirus_active(&self) -> bool {
        self.flag("antivirus", "installed") && self.flag("antivirus", "running")
    }

    /// Firewall enabled.
    #[must_use]
    pub fn firewall_enabled(&self) -> bool {
        self.flag("firewall", "firewall_enabled")
    }

    /// Disk encryption enabled.
    #[must_use]
    pub fn disk_encryption_enabled(&self) -> bool {
        self.flag("disk_encryption", "encryption_enabled")
    }

    /// Screen lock enabled.
    #[must_use]
    pub fn screen_lock_enabled(&self) -> bool {
        self.flag("screen_lock", "screen_lock_enabled")
    }

    /// Number of pending OS updates (zero when not reported).
    #[must_use]
    pub fn pending_updates(&self) -> u64 {
        let Some(value) = self.0.get("os_info").and_then(|os| os.get("pending_updates")) else {
            return 0;
        };
        value.as_u64().unwrap_or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map_or(0, |f| {
                    // Saturating float-to-int conversion.
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let n = f.ceil() as u64;
                    n
                })
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoring
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of scoring one posture report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// `score >= COMPLIANCE_THRESHOLD`.
    pub is_compliant: bool,
    /// 0..=100.
    pub score: u8,
    /// One entry per failed check, in check order.
    pub violations: Vec<String>,
}

impl ComplianceResult {
    /// Compact summary embedded in access credentials.
    #[must_use]
    pub fn summary(&self) -> PostureSummary {
        PostureSummary {
            score: self.score,
            violations: self.violations.clone(),
        }
    }
}

/// Posture summary carried in access credential claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureSummary {
    /// Compliance score at issuance.
    pub score: u8,
    /// Failed checks at issuance.
    pub violations: Vec<String>,
}

/// Score a posture report.
#[must_use]
pub fn score_posture(report: &PostureReport) -> ComplianceResult {
    let mut score: u8 = 100;
    let mut violations = Vec::new();
    let mut fail = |weight: u8, reason: String| {
        score = score.saturating_sub(weight);
        violations.push(reason);
    };

    if !report.antivirus_active() {
        fail(
            ANTIVIRUS_WEIGHT,
            "Antivirus not installed or not running".to_string(),
        );
    }
    if !report.firewall_enabled() {
        fail(FIREWALL_WEIGHT, "Firewall not enabled".to_string());
    }
    if !report.disk_encryption_enabled() {
        fail(DISK_ENCRYPTION_WEIGHT, "Disk encryption not enabled".to_string());
    }
    let pending = report.pending_updates();
    if pending > MAX_PENDING_UPDATES {
        fail(
            UPDATES_WEIGHT,
            format!("Too many pending OS updates ({pending})"),
        );
    }
    if !report.screen_lock_enabled() {
        fail(SCREEN_LOCK_WEIGHT, "Screen lock not enabled".to_string());
    }

    ComplianceResult {
        is_compliant: score >= COMPLIANCE_THRESHOLD,
        score,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn report(value: Value) -> PostureReport {
        PostureReport::from_value(value).unwrap()
    }

    fn healthy() -> Value {
        json!({
            "antivirus": {"installed": true, "running": true},
            "firewall": {"firewall_enabled": true},
            "disk_encryption": {"encryption_enabled": true},
            "screen_lock": {"screen_lock_enabled": true}
        })
    }

    #[test]
    fn full_compliance() {
        let result = score_posture(&report(healthy()));
        assert_eq!(
            result,
            ComplianceResult {
                is_compliant: true,
                score: 100,
                violations: vec![],
            }
        );
    }

    #[test]
    fn disk_encryption_only_is_still_compliant() {
        let mut value = healthy();
        value["disk_encryption"]["encryption_enabled"] = json!(false);
        let result = score_posture(&report(value));
        assert_eq!(result.score, 75);
        assert!(result.is_compliant);
        assert_eq!(result.violations, vec!["Disk encryption not enabled"]);
    }

    #[test]
    fn antivirus_and_firewall_drop_below_threshold() {
        let mut value = healthy();
        value["antivirus"]["running"] = json!(false);
        value["firewall"]["firewall_enabled"] = json!(false);
        let result = score_posture(&report(value));
        assert_eq!(result.score, 45);
        assert!(!result.is_compliant);
        assert_eq!(
            result.violations,
            vec!["Antivirus not installed or not running", "Firewall not enabled"]
        );
    }

    #[test]
    fn empty_report_fails_closed() {
        let result = score_posture(&report(json!({})));
        // 100 - 30 - 25 - 25 - 10; updates are not reported so not penalized.
        assert_eq!(result.score, 10);
        assert!(!result.is_compliant);
        assert_eq!(
            result.violations,
            vec![
                "Antivirus not installed or not running",
                "Firewall not enabled",
                "Disk encryption not enabled",
                "Screen lock not enabled",
            ]
        );
    }

    #[test]
    fn every_check_failing_clamps_at_zero() {
        let result = score_posture(&report(json!({
            "antivirus": {"installed": false},
            "firewall": {"firewall_enabled": false},
            "disk_encryption": {"encryption_enabled": false},
            "screen_lock": {"screen_lock_enabled": false},
            "os_info": {"pending_updates": 42}
        })));
        assert_eq!(result.score, 0);
        assert_eq!(result.violations.len(), 5);
        assert_eq!(result.violations[3], "Too many pending OS updates (42)");
    }

    #[test]
    fn ten_pending_updates_is_tolerated() {
        let mut value = healthy();
        value["os_info"] = json!({"pending_updates": 10});
        assert_eq!(score_posture(&report(value.clone())).score, 100);

        value["os_info"] = json!({"pending_updates": 11});
        let result = score_posture(&report(value));
        assert_eq!(result.score, 90);
        assert!(result.is_compliant);
    }

    #[test]
    fn exactly_threshold_is_compliant() {
        let mut value = healthy();
        value["antivirus"]["installed"] = json!(false);
        let result = score_posture(&report(value));
        assert_eq!(result.score, COMPLIANCE_THRESHOLD);
        assert!(result.is_compliant);
    }

    #[test]
    fn mistyped_flag_counts_as_failed() {
        let mut value = healthy();
        value["firewall"]["firewall_enabled"] = json!("yes");
        let result = score_posture(&report(value));
        assert_eq!(result.violations, vec!["Firewall not enabled"]);
    }

    #[test]
    fn extra_keys_are_ignored() {
        let mut value = healthy();
        value["usb_storage"] = json!({"blocked": false});
        value["os_info"] = json!({"name": "Ubuntu", "version": "24.04"});
        assert_eq!(score_posture(&report(value)).score, 100);
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            PostureReport::from_value(json!([1, 2])),
            Err(CoreError::InvalidPosture(_))
        ));
    }

    #[test]
    fn lookup_paths() {
        let r = report(json!({
            "firewall": {"firewall_enabled": true},
            "os.version": "flat-key"
        }));
        assert_eq!(r.lookup("firewall.firewall_enabled"), Some(&json!(true)));
        assert_eq!(r.lookup("firewall"), Some(&json!({"firewall_enabled": true})));
        assert_eq!(r.lookup("os.version"), Some(&json!("flat-key")));
        assert_eq!(r.lookup("firewall.missing"), None);
        assert_eq!(r.lookup("nothing"), None);
    }

    #[test]
    fn summary_mirrors_result() {
        let result = score_posture(&report(json!({})));
        let summary = result.summary();
        assert_eq!(summary.score, result.score);
        assert_eq!(summary.violations, result.violations);
    }

    fn arb_posture() -> impl Strategy<Value = Value> {
        (
            any::<Option<(bool, bool)>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<u16>>(),
        )
            .prop_map(|(av, fw, disk, lock, updates)| {
                let mut map = Map::new();
                if let Some((installed, running)) = av {
                    map.insert(
                        "antivirus".into(),
                        json!({"installed": installed, "running": running}),
                    );
                }
                if let Some(fw) = fw {
                    map.insert("firewall".into(), json!({"firewall_enabled": fw}));
                }
                if let Some(disk) = disk {
                    map.insert(
                        "disk_encryption".into(),
                        json!({"encryption_enabled": disk}),
                    );
                }
                if let Some(lock) = lock {
                    map.insert("screen_lock".into(), json!({"screen_lock_enabled": lock}));
                }
                if let Some(updates) = updates {
                    map.insert("os_info".into(), json!({"pending_updates": updates}));
                }
                Value::Object(map)
            })
    }

    proptest! {
        #[test]
        fn scoring_is_deterministic(value in arb_posture()) {
            let r = report(value);
            prop_assert_eq!(score_posture(&r), score_posture(&r));
        }

        #[test]
        fn score_matches_violation_weights(value in arb_posture()) {
            let result = score_posture(&report(value));
            prop_assert_eq!(result.is_compliant, result.score >= COMPLIANCE_THRESHOLD);
            prop_assert!(result.violations.len() <= 5);
            if result.violations.is_empty() {
                prop_assert_eq!(result.score, 100);
            } else {
                prop_assert!(result.score < 100);
            }
        }
    }
}
