//! Error types for the audit core

use thiserror::Error;

/// Error types for audit-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The key transparency service provided a proof that is inconsistent
    /// with the auditor's view of the prefix tree.
    ///
    /// Fatal: once raised, the auditor stops countersigning tree heads until
    /// an operator intervenes.
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    /// A persisted auditor state's self-signature did not verify under the
    /// auditor's public key.
    #[error("auditor state signature did not match")]
    InvalidAuditorSignature,

    /// Key material could not be parsed into a usable Ed25519 key.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Serializing or deserializing a state record failed.
    #[error("state codec failed: {0}")]
    Codec(String),
}

/// Result type for audit-core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid-proof error
    pub fn invalid_proof(msg: impl Into<String>) -> Self {
        Self::InvalidProof(msg.into())
    }

    /// Create an invalid-key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }
}
