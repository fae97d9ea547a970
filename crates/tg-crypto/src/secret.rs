//! Symmetric key material for access credential signing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, CryptoResult};

/// Minimum accepted secret length in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// HMAC secret used to sign and verify access credentials.
///
/// The bytes are wiped when the key is dropped and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialKey {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl CredentialKey {
    /// Generate a random 32-byte key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0_u8; MIN_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Wrap raw secret bytes.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] if fewer than [`MIN_KEY_LEN`] bytes
    /// are supplied.
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() < MIN_KEY_LEN {
            let len = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "expected at least {MIN_KEY_LEN} bytes, got {len}"
            )));
        }
        Ok(Self { bytes })
    }

    /// Decode a base64 secret as provisioned in configuration.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] on bad base64 or a short key.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded.trim().as_bytes())
            .map_err(|err| CryptoError::InvalidKey(format!("invalid base64: {err}")))?;
        Self::from_bytes(bytes)
    }

    /// Encode the secret as base64 for provisioning.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    /// Borrow the secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
