//! `trustgate token` - inspect access credentials.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use tg_core::SystemClock;
use tg_crypto::CredentialKey;
use tg_token::TokenVerifier;

use crate::input::print_json;

/// Arguments for `trustgate token`.
#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommands,
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// Verify a credential and print its claims.
    Verify(TokenVerifyArgs),
}

/// Arguments for `trustgate token verify`.
#[derive(Args, Debug)]
pub struct TokenVerifyArgs {
    /// The credential.
    #[arg(long)]
    pub token: String,

    /// Base64 credential signing secret.
    #[arg(long)]
    pub key: String,
}

pub fn run(args: &TokenArgs) -> Result<()> {
    match &args.command {
        TokenCommands::Verify(verify_args) => run_verify(verify_args),
    }
}

fn run_verify(args: &TokenVerifyArgs) -> Result<()> {
    let key = CredentialKey::from_base64(args.key.trim())?;
    let verifier = TokenVerifier::new(Arc::new(key), Arc::new(SystemClock));
    match verifier.verify_detailed(args.token.trim()) {
        Ok(claims) => print_json(&claims),
        Err(err) => bail!("credential rejected: {err}"),
    }
}
