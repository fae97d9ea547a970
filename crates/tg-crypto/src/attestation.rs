//! Device attestation signatures.
//!
//! An enrolled device holds an RSA key pair in its hardware signer and hands
//! the server the public half at enrollment. Posture reports and challenge
//! answers arrive signed with RSA PKCS#1 v1.5 over SHA-256 of the record's
//! canonical form (see [`crate::canonical`]).
//!
//! Stored public keys come in two encodings: PEM `SubjectPublicKeyInfo`, or
//! the bare base64 of the DER `SubjectPublicKeyInfo`. PEM is tried first.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rsa::pkcs1v15;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::canonical::canonical_json;
use crate::{CryptoError, CryptoResult};

/// Parse a device attestation key from PEM or base64-encoded DER SPKI.
///
/// # Errors
/// Returns [`CryptoError::MissingPublicKey`] for an empty string and
/// [`CryptoError::MalformedPublicKey`] when neither encoding parses.
pub fn parse_public_key(encoded: &str) -> CryptoResult<RsaPublicKey> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(CryptoError::MissingPublicKey);
    }

    let pem_error = match RsaPublicKey::from_public_key_pem(trimmed) {
        Ok(key) => return Ok(key),
        Err(err) => err,
    };

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let der = BASE64_STANDARD.decode(compact.as_bytes()).map_err(|err| {
        CryptoError::MalformedPublicKey(format!("not PEM ({pem_error}) and not base64 ({err})"))
    })?;

    RsaPublicKey::from_public_key_der(&der).map_err(|err| {
        CryptoError::MalformedPublicKey(format!("not PEM ({pem_error}) and not DER SPKI ({err})"))
    })
}

/// Verify a device signature over the canonical form of `record`.
///
/// # Errors
/// Returns the specific [`CryptoError`] describing why verification failed.
pub fn verify_signature_detailed(
    record: &Value,
    signature_b64: &str,
    public_key: Option<&str>,
) -> CryptoResult<()> {
    let encoded_key = public_key
        .filter(|key| !key.trim().is_empty())
        .ok_or(CryptoError::MissingPublicKey)?;
    let key = parse_public_key(encoded_key)?;

    let raw_signature = BASE64_STANDARD
        .decode(signature_b64.trim().as_bytes())
        .map_err(|err| CryptoError::MalformedSignature(err.to_string()))?;
    let signature = pkcs1v15::Signature::try_from(raw_signature.as_slice())
        .map_err(|err| CryptoError::MalformedSignature(err.to_string()))?;

    let verifying_key = pkcs1v15::VerifyingKey::<Sha256>::new(key);
    verifying_key
        .verify(&canonical_json(record), &signature)
        .map_err(|_| CryptoError::SignatureMismatch)
}

/// Verify a device signature, collapsing every failure to `false`.
///
/// This is the boundary used by the decision pipeline: a bad key, a garbled
/// signature and a mismatch all read as "not attested".
#[must_use]
pub fn verify_signature(record: &Value, signature_b64: &str, public_key: Option<&str>) -> bool {
    match verify_signature_detailed(record, signature_b64, public_key) {
        Ok(()) => true,
        Err(err) => {
            debug!(error = %err, "attestation signature rejected");
            false
        }
    }
}

/// Short, log-safe identifier for a public key (hex SHA-256 of the DER SPKI).
#[must_use]
pub fn key_fingerprint(key: &RsaPublicKey) -> String {
    key.to_public_key_der().map_or_else(
        |_| "unknown".to_string(),
        |der| {
            let digest = hex::encode(Sha256::digest(der.as_bytes()));
            digest[..16].to_string()
        },
    )
}

/// Device-side signer producing attestation signatures.
///
/// Real devices sign inside their hardware backend; this software signer is
/// used for provisioning tooling and tests.
pub struct AttestationSigner {
    private_key: RsaPrivateKey,
}

impl std::fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("fingerprint", &key_fingerprint(&self.public_key()))
            .finish_non_exhaustive()
    }
}

impl AttestationSigner {
    /// Generate a fresh RSA key pair.
    ///
    /// # Errors
    /// Returns [`CryptoError::SigningFailed`] if key generation fails.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|err| CryptoError::SigningFailed(format!("key generation: {err}")))?;
        Ok(Self { private_key })
    }

    /// Load a PKCS#8 PEM private key.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] if the PEM does not hold an RSA key.
    pub fn from_pkcs8_pem(pem: &str) -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem.trim())
            .map_err(|err| CryptoError::InvalidKey(err.to_string()))?;
        Ok(Self { private_key })
    }

    /// Private key as PKCS#8 PEM, for provisioning a device.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] if encoding fails.
    pub fn private_key_pem(&self) -> CryptoResult<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| CryptoError::InvalidKey(err.to_string()))
    }

    /// The matching public key.
    #[must_use]
    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// Public key as PEM `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] if encoding fails.
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| CryptoError::InvalidKey(err.to_string()))
    }

    /// Public key as base64 of the DER `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] if encoding fails.
    pub fn public_key_der_base64(&self) -> CryptoResult<String> {
        let der = self
            .public_key()
            .to_public_key_der()
            .map_err(|err| CryptoError::InvalidKey(err.to_string()))?;
        Ok(BASE64_STANDARD.encode(der.as_bytes()))
    }

    /// Sign the canonical form of `record`, returning base64 signature bytes.
    ///
    /// # Errors
    /// Returns [`CryptoError::SigningFailed`] if the RSA operation fails.
    pub fn sign(&self, record: &Value) -> CryptoResult<String> {
        let signing_key = pkcs1v15::SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key
            .try_sign(&canonical_json(record))
            .map_err(|err| CryptoError::SigningFailed(err.to_string()))?;
        Ok(BASE64_STANDARD.encode(signature.to_bytes()))
    }
}
