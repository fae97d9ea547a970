//! `trustgate keygen` - credential secrets and device attestation keys.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tg_crypto::{AttestationSigner, CredentialKey, key_fingerprint};
use tracing::info;

/// File name of the generated device private key.
pub const DEVICE_PRIVATE_KEY_FILE: &str = "device.key.pem";
/// File name of the generated device public key.
pub const DEVICE_PUBLIC_KEY_FILE: &str = "device.pub.pem";

/// Arguments for `trustgate keygen`.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    #[command(subcommand)]
    pub command: KeygenCommands,
}

/// Key kinds.
#[derive(Subcommand, Debug)]
pub enum KeygenCommands {
    /// Print a fresh base64 credential signing secret.
    Credential,
    /// Write an RSA device attestation key pair.
    Device(DeviceKeyArgs),
}

/// Arguments for `trustgate keygen device`.
#[derive(Args, Debug)]
pub struct DeviceKeyArgs {
    /// Directory to write the key pair into.
    #[arg(long)]
    pub out_dir: PathBuf,

    /// RSA modulus size.
    #[arg(long, default_value_t = 2048, value_parser = clap::value_parser!(u16).range(1024..=8192))]
    pub bits: u16,

    /// Overwrite existing key files.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

pub fn run(args: &KeygenArgs) -> Result<()> {
    match &args.command {
        KeygenCommands::Credential => {
            println!("{}", CredentialKey::generate().to_base64());
            Ok(())
        }
        KeygenCommands::Device(device_args) => run_device(device_args),
    }
}

fn run_device(args: &DeviceKeyArgs) -> Result<()> {
    let private_path = args.out_dir.join(DEVICE_PRIVATE_KEY_FILE);
    let public_path = args.out_dir.join(DEVICE_PUBLIC_KEY_FILE);
    if !args.force {
        for path in [&private_path, &public_path] {
            anyhow::ensure!(
                !path.exists(),
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let signer = AttestationSigner::generate(usize::from(args.bits))?;
    write_private(&private_path, &signer.private_key_pem()?)?;
    fs::write(&public_path, signer.public_key_pem()?)
        .with_context(|| format!("failed to write {}", public_path.display()))?;

    let fingerprint = key_fingerprint(&signer.public_key());
    info!(%fingerprint, bits = args.bits, "device key pair generated");
    println!("Wrote {} and {}", private_path.display(), public_path.display());
    println!("Fingerprint: {fingerprint}");
    Ok(())
}

fn write_private(path: &Path, pem: &str) -> Result<()> {
    fs::write(path, pem).with_context(|| format!("failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict {}", path.display()))?;
    }
    Ok(())
}
