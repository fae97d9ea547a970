//! TrustGate crypto primitives.
//!
//! This crate provides the cryptographic building blocks of the trust
//! decision engine:
//!
//! - **Canonical encoding**: key-order independent JSON bytes that both the
//!   device and the server sign/verify over
//! - **Attestation verification**: RSA PKCS#1 v1.5 / SHA-256 signatures made
//!   by an enrolled device's attestation key (PEM or base64-DER SPKI)
//! - **Credential keys**: the symmetric secret used to sign access credentials
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tg_crypto::{canonical_json, verify_signature};
//!
//! let record = json!({"challenge": "abc"});
//! let bytes = canonical_json(&record);
//! assert_eq!(bytes, br#"{"challenge": "abc"}"#);
//!
//! let ok = verify_signature(&record, signature_b64, Some(device_public_key));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod attestation;
pub mod canonical;
mod error;
pub mod secret;

pub use attestation::{
    AttestationSigner, key_fingerprint, parse_public_key, verify_signature,
    verify_signature_detailed,
};
pub use canonical::{canonical_json, canonical_string, challenge_record};
pub use error::{CryptoError, CryptoResult};
pub use secret::CredentialKey;
