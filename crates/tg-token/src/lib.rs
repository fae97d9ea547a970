//! TrustGate access credentials.
//!
//! Access credentials are short-lived HS256 JWTs minted only after the policy
//! evaluator allows the exact identity/device/resource combination:
//!
//! - **Issue**: re-run policy evaluation, then sign a claim set carrying the
//!   caller, the device and a compliance snapshot
//! - **Verify**: signature, expiry (no leeway), issuer, audience and token type
//! - **Refresh**: verify the old credential, then issue a brand new one from
//!   scratch for the same resource
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tg_token::{CredentialIssuer, IssueOutcome};
//!
//! let issuer = CredentialIssuer::new(key, evaluator, clock);
//! match issuer.issue(&identity, &device, "vpn", None).await? {
//!     IssueOutcome::Issued(issued) => send(issued.token),
//!     IssueOutcome::Denied(verdict) => reject(verdict.denial_reason),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod claims;
mod error;
mod issuer;
mod verifier;

pub use claims::*;
pub use error::*;
pub use issuer::*;
pub use verifier::*;

/// `iss` claim of every credential.
pub const ISSUER: &str = "trustgate";

/// `aud` claim of every credential.
pub const AUDIENCE: &str = "trustgate-resources";

/// `token_type` claim of device access credentials.
pub const TOKEN_TYPE: &str = "device_access";

/// Default credential lifetime in minutes.
pub const DEFAULT_TTL_MINUTES: u32 = 15;

/// Longest credential lifetime a caller may request, in minutes.
pub const MAX_TTL_MINUTES: u32 = 24 * 60;

/// Clamp a requested lifetime to `1..=MAX_TTL_MINUTES`, falling back to
/// `default` when none is requested.
#[must_use]
pub fn effective_ttl_minutes(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, MAX_TTL_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_defaults_and_clamps() {
        assert_eq!(effective_ttl_minutes(None, DEFAULT_TTL_MINUTES), 15);
        assert_eq!(effective_ttl_minutes(Some(60), DEFAULT_TTL_MINUTES), 60);
        assert_eq!(effective_ttl_minutes(Some(0), DEFAULT_TTL_MINUTES), 1);
        assert_eq!(effective_ttl_minutes(Some(10_000), DEFAULT_TTL_MINUTES), 1440);
    }
}
