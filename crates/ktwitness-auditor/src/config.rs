//! Configuration loading
//!
//! The auditor is configured from a single TOML file. Key material arrives
//! base64-encoded in the usual DER wrappings (PKCS#8 for the private key,
//! X.509/SPKI for public keys) and is unwrapped to raw 32-byte Ed25519
//! values at load time; a malformed key aborts startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;

use ktwitness_core::{SigningKey, VerifyingKey};

use crate::client::MAX_BATCH_SIZE;
use crate::error::{Error, Result};

const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_SIGNATURE_INTERVAL_SECS: u64 = 3600;
const DEFAULT_SIGNATURE_PAGE_SIZE: u64 = 1_000_000;

/// Top-level configuration file contents.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub auditor: AuditorSection,
    pub transport: TransportSection,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditorSection {
    /// Base64 PKCS#8 Ed25519 private key; signs tree heads and persisted
    /// state.
    pub private_key: String,
    /// Base64 X.509 Ed25519 public key; embedded in the tree-head payload
    /// and used to verify persisted state.
    pub public_key: String,
    /// Key transparency service's signing public key, embedded in the
    /// tree-head payload.
    pub kt_signing_public_key: String,
    /// Key transparency service's VRF public key, embedded in the tree-head
    /// payload.
    pub kt_vrf_public_key: String,
    /// Page size for `Audit` requests, 1..=1000.
    pub batch_size: u64,
    /// Tick period of the audit loop.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub signature: SignatureSection,
}

/// Thresholds that trigger signing a tree head.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureSection {
    /// Sign when this much time has passed since the last signed head.
    #[serde(default = "default_signature_interval_secs")]
    pub interval_secs: u64,
    /// Sign when this many updates have been processed since the last
    /// signed head.
    #[serde(default = "default_signature_page_size")]
    pub page_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    /// `host:port` of the key transparency service.
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub file: FileSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSection {
    /// Path of the state blob; parent directories are created as needed.
    pub path: PathBuf,
}

/// The auditor's parsed key material.
#[derive(Debug, Clone)]
pub struct AuditorKeys {
    pub private_key: SigningKey,
    pub public_key: VerifyingKey,
    pub kt_signing_public_key: VerifyingKey,
    pub kt_vrf_public_key: VerifyingKey,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::config(format!("invalid TOML in {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auditor.batch_size == 0 || self.auditor.batch_size > MAX_BATCH_SIZE {
            return Err(Error::config(format!(
                "auditor.batch_size must be in 1..={MAX_BATCH_SIZE}, got {}",
                self.auditor.batch_size
            )));
        }
        if self.auditor.interval_secs == 0 {
            return Err(Error::config("auditor.interval_secs must be positive"));
        }
        self.auditor_keys()?;
        Ok(())
    }

    /// Decode and validate the configured key material.
    pub fn auditor_keys(&self) -> Result<AuditorKeys> {
        let private_key = SigningKey::from_pkcs8_der(&decode_base64(
            &self.auditor.private_key,
            "auditor.private_key",
        )?)
        .map_err(|e| Error::config(format!("auditor.private_key: {e}")))?;

        Ok(AuditorKeys {
            private_key,
            public_key: decode_verifying_key(&self.auditor.public_key, "auditor.public_key")?,
            kt_signing_public_key: decode_verifying_key(
                &self.auditor.kt_signing_public_key,
                "auditor.kt_signing_public_key",
            )?,
            kt_vrf_public_key: decode_verifying_key(
                &self.auditor.kt_vrf_public_key,
                "auditor.kt_vrf_public_key",
            )?,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.auditor.interval_secs)
    }

    pub fn signature_interval(&self) -> Duration {
        Duration::from_secs(self.auditor.signature.interval_secs)
    }
}

impl Default for SignatureSection {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SIGNATURE_INTERVAL_SECS,
            page_size: DEFAULT_SIGNATURE_PAGE_SIZE,
        }
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_signature_interval_secs() -> u64 {
    DEFAULT_SIGNATURE_INTERVAL_SECS
}

fn default_signature_page_size() -> u64 {
    DEFAULT_SIGNATURE_PAGE_SIZE
}

fn decode_base64(value: &str, option: &str) -> Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(value)
        .map_err(|e| Error::config(format!("{option} is not valid base64: {e}")))
}

fn decode_verifying_key(value: &str, option: &str) -> Result<VerifyingKey> {
    VerifyingKey::from_x509_der(&decode_base64(value, option)?)
        .map_err(|e| Error::config(format!("{option}: {e}")))
}
