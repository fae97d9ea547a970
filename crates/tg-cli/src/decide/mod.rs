//! `trustgate decide` - run one access request through the full pipeline.
//!
//! Devices and policies are loaded into the in-memory stores, so the
//! outcome matches what a server with the same state and configuration
//! would decide. Audit events are emitted through `tracing` under the
//! `trustgate::audit` target.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Value, json};
use tg_core::{Device, DeviceId, Identity, PostureReport, StaticPolicySource};
use tg_engine::{AccessDecision, AccessRequest, EngineConfig, MemoryDeviceRepository, TrustEngine};
use tracing::info;

use crate::input::{print_json, read_json};

/// Arguments for `trustgate decide`.
#[derive(Args, Debug)]
pub struct DecideArgs {
    /// Engine configuration (TOML). Defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Known devices (JSON array).
    #[arg(long)]
    pub devices: PathBuf,

    /// Caller identity (JSON).
    #[arg(long)]
    pub identity: PathBuf,

    /// Device making the request.
    #[arg(long)]
    pub device_id: DeviceId,

    /// Requested resource.
    #[arg(long)]
    pub resource: String,

    /// Requested access type.
    #[arg(long, default_value = "read")]
    pub access_type: String,

    /// Fresh posture report (JSON object).
    #[arg(long, requires = "signature")]
    pub posture: Option<PathBuf>,

    /// Base64 signature over the posture report.
    #[arg(long, requires = "posture")]
    pub signature: Option<String>,

    /// Requested credential lifetime in minutes.
    #[arg(long)]
    pub ttl_minutes: Option<u32>,
}

pub fn run(args: &DecideArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let policies = config.load_policies()?;
    let devices: Vec<Device> = read_json(&args.devices).context("invalid device list")?;
    let identity: Identity = read_json(&args.identity).context("invalid identity")?;

    let mut request = AccessRequest::new(
        identity,
        args.device_id,
        args.resource.clone(),
        args.access_type.clone(),
    )
    .with_ttl(args.ttl_minutes);
    if let (Some(path), Some(signature)) = (&args.posture, &args.signature) {
        let value: Value = read_json(path)?;
        let report = PostureReport::from_value(value).context("posture report must be an object")?;
        request = request.with_posture(report, signature.trim());
    }

    let repository = Arc::new(MemoryDeviceRepository::new());
    for device in devices {
        repository.insert(device);
    }
    info!(policies = policies.len(), "loaded policy set");
    let engine = TrustEngine::builder(repository, Arc::new(StaticPolicySource::new(policies)))
        .with_config(config)
        .build()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let decision = runtime.block_on(engine.evaluate_access(request))?;

    print_json(&render(&decision))
}

fn render(decision: &AccessDecision) -> Value {
    let token = decision.token.as_ref().map(|issued| {
        json!({
            "token": issued.token,
            "expires_at": issued.expires_at,
            "claims": issued.claims,
        })
    });
    json!({
        "allowed": decision.allowed,
        "reason": decision.reason,
        "policy_id": decision.policy_id,
        "policy_name": decision.policy_name,
        "attestation": decision.attestation,
        "compliance": decision.compliance,
        "token": token,
    })
}
