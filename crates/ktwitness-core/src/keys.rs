//! Ed25519 key and signature wrappers
//!
//! Thin newtypes over raw key material. Keys are held as the raw 32-byte
//! Ed25519 values; DER-wrapped encodings are unwrapped at construction time.

use ed25519_dalek::Signer;

use crate::error::{Error, Result};

/// An Ed25519 signature in raw 64-byte form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::invalid_key("signature must be exactly 64 bytes"))?;
        Ok(Self(arr))
    }
}

/// An Ed25519 private signing key.
///
/// The raw seed is kept and a dalek key is rebuilt on use; the auditor signs
/// rarely enough that key expansion cost is irrelevant.
#[derive(Debug, Clone, Copy)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Unwrap a PKCS#8-encoded Ed25519 private key.
    ///
    /// The trailing 32 bytes of the v1 PKCS#8 DER encoding are the raw seed.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let raw = trailing_key_bytes(der, "PKCS#8 private key")?;
        Ok(Self(raw))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        VerifyingKey(key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        Signature(key.sign(message).to_bytes())
    }
}

/// An Ed25519 public key in raw 32-byte form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyingKey([u8; 32]);

impl VerifyingKey {
    /// Construct from raw bytes, rejecting values that are not a valid
    /// curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(|_| Self(bytes))
            .map_err(|e| Error::invalid_key(e.to_string()))
    }

    /// Unwrap an X.509/SPKI-encoded Ed25519 public key.
    ///
    /// The trailing 32 bytes of the SPKI DER encoding are the raw key.
    pub fn from_x509_der(der: &[u8]) -> Result<Self> {
        Self::from_bytes(trailing_key_bytes(der, "X.509 public key")?)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a signature over `message`, surfacing a mismatch as
    /// [`Error::InvalidAuditorSignature`].
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| Error::invalid_key(e.to_string()))?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify_strict(message, &sig)
            .map_err(|_| Error::InvalidAuditorSignature)
    }
}

fn trailing_key_bytes(der: &[u8], what: &str) -> Result<[u8; 32]> {
    if der.len() < 32 {
        return Err(Error::invalid_key(format!(
            "{what} encoding too short: {} bytes",
            der.len()
        )));
    }
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&der[der.len() - 32..]);
    Ok(raw)
}
