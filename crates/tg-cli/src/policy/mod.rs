//! `trustgate evaluate` - dry-run a policy set against an access context.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use serde::Deserialize;
use tg_core::{
    DefaultVerdict, DeviceState, EnrollmentStatus, EvaluationContext, EvaluatorOptions,
    PolicyEvaluation, PostureReport, evaluate_policies,
};

use crate::input::{print_json, read_json};

/// Verdict when no active policy applies.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum VerdictArg {
    /// Fail open.
    #[default]
    Allow,
    /// Fail closed.
    Deny,
}

impl From<VerdictArg> for DefaultVerdict {
    fn from(arg: VerdictArg) -> Self {
        match arg {
            VerdictArg::Allow => Self::Allow,
            VerdictArg::Deny => Self::Deny,
        }
    }
}

/// Arguments for `trustgate evaluate`.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Policy documents (JSON array).
    #[arg(long)]
    pub policies: PathBuf,

    /// Access context (JSON). Use "-" for stdin.
    #[arg(long)]
    pub context: PathBuf,

    /// Verdict when no active policy applies.
    #[arg(long, value_enum, default_value_t = VerdictArg::Allow)]
    pub default_verdict: VerdictArg,

    /// Output the full evaluation as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Access context as read from disk.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContextInput {
    #[serde(default)]
    user_roles: Vec<String>,
    #[serde(default)]
    device: Option<DeviceInput>,
    #[serde(default)]
    posture: Option<PostureReport>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    access_type: Option<String>,
    /// Defaults to the current time.
    #[serde(default)]
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceInput {
    is_compliant: bool,
    #[serde(default = "default_status")]
    status: EnrollmentStatus,
}

const fn default_status() -> EnrollmentStatus {
    EnrollmentStatus::Active
}

impl ContextInput {
    fn into_context(self) -> EvaluationContext {
        let mut ctx = EvaluationContext::new(self.now.unwrap_or_else(Utc::now))
            .with_roles(self.user_roles)
            .with_posture(self.posture);
        if let Some(device) = self.device {
            ctx = ctx.with_device(DeviceState {
                is_compliant: device.is_compliant,
                status: device.status,
            });
        }
        if let Some(resource) = self.resource {
            ctx = ctx.with_resource(resource);
        }
        if let Some(access_type) = self.access_type {
            ctx = ctx.with_access_type(access_type);
        }
        ctx
    }
}

pub fn run(args: &EvaluateArgs) -> Result<()> {
    let policies = tg_engine::load_policy_file(&args.policies)?;
    let input: ContextInput = read_json(&args.context).context("invalid access context")?;
    let options = EvaluatorOptions {
        default_verdict: args.default_verdict.into(),
    };

    let evaluation = evaluate_policies(&policies, &input.into_context(), options);

    if args.json {
        return print_json(&evaluation);
    }
    print_summary(&evaluation);
    Ok(())
}

fn print_summary(evaluation: &PolicyEvaluation) {
    println!(
        "Decision: {}",
        if evaluation.allowed { "allow" } else { "deny" }
    );
    if let Some(reason) = &evaluation.denial_reason {
        println!("Reason: {reason}");
    }
    if let Some(policy) = &evaluation.denied_by {
        println!("Denied by: {} ({})", policy.name, policy.id);
    }
    for result in &evaluation.results {
        println!(
            "  [{}] {} ({}): {}",
            if result.allowed { "pass" } else { "fail" },
            result.policy_name,
            result.enforce_mode,
            result.reason
        );
    }
}
