//! `trustgate` - operator CLI for the TrustGate trust decision engine.
//!
//! ```text
//! trustgate score --posture posture.json
//! trustgate canonicalize --input record.json
//! trustgate verify --record posture.json --signature <b64> --public-key device.pub.pem
//! trustgate evaluate --policies policies.json --context context.json
//! trustgate keygen credential
//! trustgate token verify --token <jwt> --key <b64>
//! trustgate decide --devices devices.json --identity alice.json --device-id <uuid> --resource git
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

mod decide;
mod input;
mod keygen;
mod policy;
mod posture;
mod token;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tg_engine::{LogFormat, LoggingConfig};

/// TrustGate trust decision tooling.
#[derive(Parser, Debug)]
#[command(name = "trustgate", version, about, propagate_version = true)]
struct Cli {
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a posture report.
    Score(posture::ScoreArgs),
    /// Print the canonical signing form of a JSON record.
    Canonicalize(posture::CanonicalizeArgs),
    /// Sign a record with a device attestation key.
    Sign(posture::SignArgs),
    /// Verify a device attestation signature.
    Verify(posture::VerifyArgs),
    /// Evaluate a policy set against an access context.
    Evaluate(policy::EvaluateArgs),
    /// Generate key material.
    Keygen(keygen::KeygenArgs),
    /// Access credential tools.
    Token(token::TokenArgs),
    /// Run a full access decision against in-memory state.
    Decide(decide::DecideArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tg_engine::telemetry::init_tracing(&LoggingConfig {
        level: cli.log_level.clone(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Plain
        },
    })?;

    match &cli.command {
        Commands::Score(args) => posture::run_score(args),
        Commands::Canonicalize(args) => posture::run_canonicalize(args),
        Commands::Sign(args) => posture::run_sign(args),
        Commands::Verify(args) => posture::run_verify(args),
        Commands::Evaluate(args) => policy::run(args),
        Commands::Keygen(args) => keygen::run(args),
        Commands::Token(args) => token::run(args),
        Commands::Decide(args) => decide::run(args),
    }
}
