//! Posture and attestation commands: `score`, `canonicalize`, `sign`, `verify`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::Value;
use tg_core::{PostureReport, score_posture};
use tg_crypto::{
    AttestationSigner, canonical_string, challenge_record, key_fingerprint, parse_public_key,
    verify_signature_detailed,
};
use tracing::debug;

use crate::input::{print_json, read_input, read_json};

/// Arguments for `trustgate score`.
#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Posture report (JSON object). Use "-" for stdin.
    #[arg(long)]
    pub posture: PathBuf,

    /// Output the compliance result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Arguments for `trustgate canonicalize`.
#[derive(Args, Debug)]
pub struct CanonicalizeArgs {
    /// JSON record. Use "-" for stdin.
    #[arg(long)]
    pub input: PathBuf,
}

/// Arguments for `trustgate sign`.
#[derive(Args, Debug)]
pub struct SignArgs {
    /// JSON record to sign. Use "-" for stdin.
    #[arg(long, required_unless_present = "challenge", conflicts_with = "challenge")]
    pub record: Option<PathBuf>,

    /// Sign the challenge record for this token instead of a file.
    #[arg(long)]
    pub challenge: Option<String>,

    /// PKCS#8 PEM private key.
    #[arg(long)]
    pub private_key: PathBuf,
}

/// Arguments for `trustgate verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signed JSON record. Use "-" for stdin.
    #[arg(long, required_unless_present = "challenge", conflicts_with = "challenge")]
    pub record: Option<PathBuf>,

    /// Verify against the challenge record for this token.
    #[arg(long)]
    pub challenge: Option<String>,

    /// Base64 signature.
    #[arg(long)]
    pub signature: String,

    /// Device public key file (PEM or base64 DER).
    #[arg(long)]
    pub public_key: PathBuf,
}

pub fn run_score(args: &ScoreArgs) -> Result<()> {
    let value: Value = read_json(&args.posture)?;
    let report = PostureReport::from_value(value).context("posture report must be an object")?;
    let result = score_posture(&report);

    if args.json {
        return print_json(&result);
    }

    println!("Score: {}/100", result.score);
    println!(
        "Compliant: {}",
        if result.is_compliant { "yes" } else { "no" }
    );
    if !result.violations.is_empty() {
        println!("Violations:");
        for violation in &result.violations {
            println!("  - {violation}");
        }
    }
    Ok(())
}

pub fn run_canonicalize(args: &CanonicalizeArgs) -> Result<()> {
    let value: Value = read_json(&args.input)?;
    println!("{}", canonical_string(&value));
    Ok(())
}

pub fn run_sign(args: &SignArgs) -> Result<()> {
    let record = load_record(args.record.as_ref(), args.challenge.as_deref())?;
    let pem = fs::read_to_string(&args.private_key)
        .with_context(|| format!("failed to read key {}", args.private_key.display()))?;
    let signer = AttestationSigner::from_pkcs8_pem(&pem)?;
    debug!(?signer, "signing record");
    println!("{}", signer.sign(&record)?);
    Ok(())
}

pub fn run_verify(args: &VerifyArgs) -> Result<()> {
    let record = load_record(args.record.as_ref(), args.challenge.as_deref())?;
    let key_text = read_input(&args.public_key)?;
    let fingerprint = key_fingerprint(&parse_public_key(&key_text)?);

    if let Err(err) = verify_signature_detailed(&record, args.signature.trim(), Some(&key_text)) {
        bail!("signature invalid ({err}), key {fingerprint}");
    }
    println!("Signature valid (key {fingerprint})");
    Ok(())
}

fn load_record(path: Option<&PathBuf>, challenge: Option<&str>) -> Result<Value> {
    match (path, challenge) {
        (_, Some(token)) => Ok(challenge_record(token)),
        (Some(path), None) => read_json(path),
        (None, None) => bail!("either --record or --challenge is required"),
    }
}
