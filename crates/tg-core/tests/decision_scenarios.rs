//! Scoring, challenges and policy evaluation working together.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tg_core::{
    ChallengeManager, ChallengeStore, Clock, DeviceId, DeviceState, EnforceMode, EnrollmentStatus,
    EvaluationContext, ManualClock, MemoryChallengeStore, Policy, PolicyEvaluator, PostureReport,
    StaticPolicySource, score_posture,
};

fn report(value: Value) -> PostureReport {
    PostureReport::from_value(value).unwrap()
}

fn policy(doc: Value) -> Policy {
    Policy::from_json(doc).unwrap()
}

/// A tiered policy set: a strict gate for production, a monitored nudge
/// about updates, and a broad baseline.
fn tiered_policies() -> Vec<Policy> {
    vec![
        policy(json!({
            "name": "prod-needs-disk-encryption",
            "priority": 200,
            "rules": {
                "action": "deny",
                "conditions": {
                    "posture_checks": {"disk_encryption.encryption_enabled": true}
                }
            }
        })),
        policy(json!({
            "name": "updates-nudge",
            "priority": 150,
            "enforce_mode": "monitor",
            "rules": {"conditions": {"posture_checks": {"os_info.pending_updates": 0}}}
        })),
        policy(json!({
            "name": "baseline",
            "priority": 100,
            "rules": {
                "conditions": {
                    "user_roles": ["engineering", "sre"],
                    "device_status": "active",
                    "time_restrictions": {"allowed_hours": [8, 9, 10, 11, 12, 13, 14, 15, 16, 17]}
                }
            }
        })),
    ]
}

fn context_for(posture: &PostureReport, hour: u32) -> EvaluationContext {
    let result = score_posture(posture);
    EvaluationContext::new(Utc.with_ymd_and_hms(2025, 1, 7, hour, 30, 0).unwrap())
        .with_roles(["sre"])
        .with_device(DeviceState {
            is_compliant: result.is_compliant,
            status: EnrollmentStatus::Active,
        })
        .with_posture(Some(posture.clone()))
        .with_resource("prod-db")
        .with_access_type("read")
}

#[tokio::test]
async fn unencrypted_disk_stops_at_the_highest_priority_gate() {
    let evaluator = PolicyEvaluator::new(Arc::new(StaticPolicySource::new(tiered_policies())));
    let posture = report(json!({
        "antivirus": {"installed": true, "running": true},
        "firewall": {"firewall_enabled": true},
        "disk_encryption": {"encryption_enabled": false},
        "screen_lock": {"screen_lock_enabled": true},
        "os_info": {"pending_updates": 0}
    }));
    // Still compliant overall (75), but the gate looks at the raw check.
    assert!(score_posture(&posture).is_compliant);

    let verdict = evaluator.evaluate(&context_for(&posture, 10)).await.unwrap();

    assert!(!verdict.allowed);
    assert_eq!(verdict.results.len(), 1);
    assert_eq!(
        verdict.denied_by.as_ref().map(|p| p.name.as_str()),
        Some("prod-needs-disk-encryption")
    );
    assert_eq!(
        verdict.denial_reason.as_deref(),
        Some(
            "Denied by policy 'prod-needs-disk-encryption': \
             Posture check 'disk_encryption.encryption_enabled' failed: expected true, got false"
        )
    );
}

#[tokio::test]
async fn monitored_failure_is_recorded_but_does_not_block() {
    let evaluator = PolicyEvaluator::new(Arc::new(StaticPolicySource::new(tiered_policies())));
    let posture = report(json!({
        "antivirus": {"installed": true, "running": true},
        "firewall": {"firewall_enabled": true},
        "disk_encryption": {"encryption_enabled": true},
        "screen_lock": {"screen_lock_enabled": true},
        "os_info": {"pending_updates": 4}
    }));

    let verdict = evaluator.evaluate(&context_for(&posture, 9)).await.unwrap();

    assert!(verdict.allowed);
    let names: Vec<_> = verdict
        .results
        .iter()
        .map(|r| (r.policy_name.as_str(), r.allowed, r.enforce_mode))
        .collect();
    assert_eq!(
        names,
        vec![
            ("prod-needs-disk-encryption", true, EnforceMode::Enforce),
            ("updates-nudge", false, EnforceMode::Monitor),
            ("baseline", true, EnforceMode::Enforce),
        ]
    );
}

#[tokio::test]
async fn after_hours_denied_by_baseline() {
    let evaluator = PolicyEvaluator::new(Arc::new(StaticPolicySource::new(tiered_policies())));
    let posture = report(json!({
        "disk_encryption": {"encryption_enabled": true},
        "os_info": {"pending_updates": 0}
    }));

    let verdict = evaluator.evaluate(&context_for(&posture, 22)).await.unwrap();

    assert!(!verdict.allowed);
    assert_eq!(
        verdict.denied_by.map(|p| p.name),
        Some("baseline".to_string())
    );
    assert!(
        verdict
            .denial_reason
            .unwrap()
            .contains("Access not allowed at hour 22 UTC")
    );
}

#[tokio::test]
async fn policy_updates_apply_to_the_next_evaluation() {
    let source = Arc::new(StaticPolicySource::default());
    let evaluator = PolicyEvaluator::new(source.clone());
    let posture = report(json!({}));
    let ctx = context_for(&posture, 10);

    assert!(evaluator.evaluate(&ctx).await.unwrap().allowed);

    source.upsert(policy(json!({
        "name": "compliant-only",
        "rules": {"conditions": {"device_compliant": true}}
    })));
    assert!(!evaluator.evaluate(&ctx).await.unwrap().allowed);

    source.replace(vec![
        policy(json!({
            "name": "compliant-only",
            "rules": {"conditions": {"device_compliant": true}}
        }))
        .with_enforce_mode(EnforceMode::Disabled),
    ]);
    assert!(evaluator.evaluate(&ctx).await.unwrap().allowed);
}

#[test]
fn challenge_round_trip_with_shared_clock() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 7, 9, 0, 0).unwrap());
    let manager = ChallengeManager::new(
        Arc::new(MemoryChallengeStore::new()),
        Arc::new(clock.clone()),
    );
    let laptop = DeviceId::new_v4();
    let phone = DeviceId::new_v4();

    let first = manager.issue(laptop);
    let second = manager.issue(laptop);
    let stale = manager.issue(laptop);
    assert_ne!(first.token, second.token);
    assert_eq!(first.expires_at, clock.now() + chrono::Duration::seconds(300));

    // A different device cannot spend the laptop's challenge.
    assert!(!manager.verify(&first.token, phone));
    assert!(manager.verify(&first.token, laptop));
    assert!(!manager.verify(&first.token, laptop));

    // Still valid exactly at expiry.
    clock.advance(chrono::Duration::seconds(300));
    assert!(manager.verify(&second.token, laptop));
    let third = manager.issue(laptop);

    clock.advance(chrono::Duration::seconds(1));
    assert!(!manager.verify(&stale.token, laptop));
    assert!(manager.verify(&third.token, laptop));
    assert_eq!(manager.sweep(), 3);
    assert_eq!(manager.store().len(), 1);
}
