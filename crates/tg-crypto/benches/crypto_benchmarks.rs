//! Benchmarks for tg-crypto hot paths.
//!
//! Every access request with fresh posture canonicalizes and verifies once:
//! - Canonical JSON encoding of a posture report
//! - RSA PKCS#1 v1.5 / SHA-256 verification (PEM and base64-DER keys)

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use tg_crypto::{AttestationSigner, canonical_json, parse_public_key, verify_signature};

fn posture() -> Value {
    json!({
        "antivirus": {"installed": true, "running": true, "product": "Defender"},
        "firewall": {"firewall_enabled": true},
        "disk_encryption": {"encryption_enabled": true, "method": "BitLocker"},
        "screen_lock": {"screen_lock_enabled": true, "timeout_secs": 300},
        "os_info": {"pending_updates": 2, "name": "Windows 11", "build": "22631"}
    })
}

fn bench_canonicalize(c: &mut Criterion) {
    let record = posture();
    c.bench_function("canonical_json_posture", |b| {
        b.iter(|| canonical_json(black_box(&record)));
    });
}

fn bench_parse_key(c: &mut Criterion) {
    let signer = AttestationSigner::generate(2048).expect("key");
    let pem = signer.public_key_pem().expect("pem");
    let der = signer.public_key_der_base64().expect("der");

    c.bench_function("parse_public_key_pem", |b| {
        b.iter(|| parse_public_key(black_box(&pem)));
    });
    c.bench_function("parse_public_key_der_fallback", |b| {
        b.iter(|| parse_public_key(black_box(&der)));
    });
}

fn bench_verify(c: &mut Criterion) {
    let signer = AttestationSigner::generate(2048).expect("key");
    let pem = signer.public_key_pem().expect("pem");
    let record = posture();
    let signature = signer.sign(&record).expect("sign");

    c.bench_function("verify_posture_signature_rsa2048", |b| {
        b.iter(|| verify_signature(black_box(&record), black_box(&signature), Some(&pem)));
    });
}

criterion_group!(benches, bench_canonicalize, bench_parse_key, bench_verify);
criterion_main!(benches);
