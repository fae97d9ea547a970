//! Credential issue/verify/refresh behavior.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pretty_assertions::assert_eq;
use serde_json::json;
use tg_core::{
    Clock, Device, DeviceId, Identity, ManualClock, Policy, PolicyEvaluator, PostureReport,
    StaticPolicySource, UserId, score_posture,
};
use tg_crypto::CredentialKey;
use tg_token::{
    AUDIENCE, CredentialIssuer, ISSUER, IssueOutcome, TOKEN_TYPE, TokenError, TokenVerifier,
};

struct Fixture {
    issuer: CredentialIssuer,
    policies: Arc<StaticPolicySource>,
    clock: ManualClock,
    key: Arc<CredentialKey>,
    identity: Identity,
    device: Device,
}

fn fixture() -> Fixture {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 4, 9, 15, 0).unwrap());
    let policies = Arc::new(StaticPolicySource::default());
    let key = Arc::new(CredentialKey::generate());
    let issuer = CredentialIssuer::new(
        Arc::clone(&key),
        PolicyEvaluator::new(policies.clone()),
        Arc::new(clock.clone()),
    );

    let user = UserId::new("5d7c1c1e-user").unwrap();
    let identity = Identity::new(user.clone(), "alice", "alice@example.com")
        .with_roles(["engineering"]);

    let posture = PostureReport::from_value(json!({
        "antivirus": {"installed": true, "running": true},
        "firewall": {"firewall_enabled": true},
        "disk_encryption": {"encryption_enabled": false},
        "screen_lock": {"screen_lock_enabled": true}
    }))
    .unwrap();
    let result = score_posture(&posture);
    let mut device = Device::new(DeviceId::new_v4(), user, "alice-laptop").enrolled("PEM");
    device.record_posture(posture, &result, clock.now());

    Fixture {
        issuer,
        policies,
        clock,
        key,
        identity,
        device,
    }
}

fn engineering_only() -> Policy {
    Policy::from_json(json!({
        "name": "engineering-only",
        "priority": 100,
        "rules": {"action": "allow", "conditions": {"user_roles": ["engineering"], "device_compliant": true}}
    }))
    .unwrap()
}

async fn issue_token(f: &Fixture, ttl: Option<u32>) -> tg_token::IssuedToken {
    match f.issuer.issue(&f.identity, &f.device, "vpn", ttl).await.unwrap() {
        IssueOutcome::Issued(issued) => issued,
        IssueOutcome::Denied(verdict) => panic!("unexpected denial: {verdict:?}"),
    }
}

#[tokio::test]
async fn issued_token_verifies_with_expected_claims() {
    let f = fixture();
    f.policies.upsert(engineering_only());

    let issued = issue_token(&f, None).await;
    let claims = f.issuer.verifier().verify(&issued.token).expect("valid token");

    assert_eq!(claims, issued.claims);
    assert_eq!(claims.sub, "5d7c1c1e-user");
    assert_eq!(claims.user_id, claims.sub);
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.device_id, f.device.id());
    assert_eq!(claims.device_name, "alice-laptop");
    assert_eq!(claims.resource, "vpn");
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.aud, AUDIENCE);
    assert_eq!(claims.token_type, TOKEN_TYPE);
    assert!(claims.posture_passed);
    assert!(claims.is_compliant);
    assert_eq!(claims.exp - claims.iat, 15 * 60);

    let summary = claims.posture_summary.expect("posture on record");
    assert_eq!(summary.score, 75);
    assert_eq!(summary.violations, vec!["Disk encryption not enabled"]);
}

#[tokio::test]
async fn denied_decision_mints_nothing() {
    let f = fixture();
    f.policies.upsert(
        Policy::from_json(json!({
            "name": "admins-only",
            "rules": {"conditions": {"user_roles": ["admin"]}}
        }))
        .unwrap(),
    );

    let outcome = f.issuer.issue(&f.identity, &f.device, "vpn", None).await.unwrap();

    assert!(outcome.issued().is_none());
    match outcome {
        IssueOutcome::Denied(verdict) => {
            assert!(!verdict.allowed);
            assert_eq!(verdict.denied_by.unwrap().name, "admins-only");
        }
        IssueOutcome::Issued(_) => panic!("token minted for a denied decision"),
    }
}

#[tokio::test]
async fn device_without_posture_has_no_summary() {
    let f = fixture();
    let bare = Device::new(DeviceId::new_v4(), f.identity.user_id.clone(), "phone").enrolled("PEM");

    let outcome = f.issuer.issue(&f.identity, &bare, "mail", None).await.unwrap();
    let issued = outcome.issued().unwrap();

    assert!(issued.claims.posture_summary.is_none());
    assert!(!issued.claims.posture_passed);
    assert!(!issued.claims.is_compliant);
}

#[tokio::test]
async fn ttl_is_clamped_to_a_day() {
    let f = fixture();
    let issued = issue_token(&f, Some(10_000)).await;
    assert_eq!(issued.claims.exp - issued.claims.iat, 1440 * 60);

    let short = issue_token(&f, Some(0)).await;
    assert_eq!(short.claims.exp - short.claims.iat, 60);
}

#[tokio::test]
async fn token_expires_without_leeway() {
    let f = fixture();
    let issued = issue_token(&f, Some(5)).await;

    f.clock.advance(chrono::Duration::minutes(5) - chrono::Duration::seconds(1));
    assert!(f.issuer.verifier().verify(&issued.token).is_some());

    f.clock.advance(chrono::Duration::seconds(1));
    assert!(matches!(
        f.issuer.verifier().verify_detailed(&issued.token),
        Err(TokenError::Expired)
    ));
    assert!(f.issuer.verifier().verify(&issued.token).is_none());
}

#[tokio::test]
async fn other_key_rejected() {
    let f = fixture();
    let issued = issue_token(&f, None).await;

    let stranger = TokenVerifier::new(
        Arc::new(CredentialKey::generate()),
        Arc::new(f.clock.clone()),
    );
    assert!(matches!(
        stranger.verify_detailed(&issued.token),
        Err(TokenError::InvalidSignature)
    ));
}

#[tokio::test]
async fn tampered_token_rejected() {
    let f = fixture();
    let issued = issue_token(&f, None).await;

    let mut parts: Vec<String> = issued.token.split('.').map(str::to_string).collect();
    let mut payload: Vec<char> = parts[1].chars().collect();
    payload[10] = if payload[10] == 'A' { 'B' } else { 'A' };
    parts[1] = payload.into_iter().collect();
    let tampered = parts.join(".");

    assert!(f.issuer.verifier().verify(&tampered).is_none());
    assert!(f.issuer.verifier().verify("not-a-jwt").is_none());
    assert!(f.issuer.verifier().verify("").is_none());
}

#[tokio::test]
async fn foreign_issuer_audience_and_type_rejected() {
    let f = fixture();
    let issued = issue_token(&f, None).await;
    let key = EncodingKey::from_secret(f.key.as_bytes());
    let header = Header::new(Algorithm::HS256);

    let mut claims = issued.claims.clone();
    claims.iss = "someone-else".into();
    let token = jsonwebtoken::encode(&header, &claims, &key).unwrap();
    assert!(matches!(
        f.issuer.verifier().verify_detailed(&token),
        Err(TokenError::InvalidIssuer)
    ));

    let mut claims = issued.claims.clone();
    claims.aud = "other-audience".into();
    let token = jsonwebtoken::encode(&header, &claims, &key).unwrap();
    assert!(matches!(
        f.issuer.verifier().verify_detailed(&token),
        Err(TokenError::InvalidAudience)
    ));

    let mut claims = issued.claims;
    claims.token_type = "refresh".into();
    let token = jsonwebtoken::encode(&header, &claims, &key).unwrap();
    assert!(matches!(
        f.issuer.verifier().verify_detailed(&token),
        Err(TokenError::WrongTokenType(t)) if t == "refresh"
    ));
}

#[tokio::test]
async fn refresh_mints_a_new_credential_for_the_same_resource() {
    let f = fixture();
    f.policies.upsert(engineering_only());
    let first = issue_token(&f, None).await;

    f.clock.advance(chrono::Duration::minutes(10));
    let refreshed = f
        .issuer
        .refresh(&first.token, &f.identity, &f.device, None)
        .await
        .unwrap();
    let second = refreshed.issued().unwrap();

    assert_ne!(second.claims.jti, first.claims.jti);
    assert_eq!(second.claims.resource, "vpn");
    assert_eq!(second.claims.iat, first.claims.iat + 600);
}

#[tokio::test]
async fn refresh_re_evaluates_policy() {
    let f = fixture();
    let first = issue_token(&f, None).await;

    f.policies.upsert(
        Policy::from_json(json!({
            "name": "lockdown",
            "rules": {"action": "deny", "conditions": {"user_roles": ["security"]}}
        }))
        .unwrap(),
    );

    let outcome = f
        .issuer
        .refresh(&first.token, &f.identity, &f.device, None)
        .await
        .unwrap();
    assert!(matches!(outcome, IssueOutcome::Denied(_)));
}

#[tokio::test]
async fn refresh_rejects_expired_or_foreign_tokens() {
    let f = fixture();
    let first = issue_token(&f, Some(1)).await;

    let mallory = Identity::new(UserId::new("mallory").unwrap(), "mallory", "m@example.com");
    assert!(matches!(
        f.issuer.refresh(&first.token, &mallory, &f.device, None).await,
        Err(TokenError::SubjectMismatch)
    ));

    let other_device =
        Device::new(DeviceId::new_v4(), f.identity.user_id.clone(), "desktop").enrolled("PEM");
    assert!(matches!(
        f.issuer.refresh(&first.token, &f.identity, &other_device, None).await,
        Err(TokenError::DeviceMismatch)
    ));

    f.clock.advance(chrono::Duration::minutes(2));
    assert!(matches!(
        f.issuer.refresh(&first.token, &f.identity, &f.device, None).await,
        Err(TokenError::Expired)
    ));
}
