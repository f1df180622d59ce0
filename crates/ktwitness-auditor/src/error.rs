//! Error types for the auditor service

use thiserror::Error;

/// Error types for the audit loop and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// An audit-core failure: an invalid proof, a bad self-signature, or a
    /// codec error.
    #[error(transparent)]
    Core(#[from] ktwitness_core::Error),

    /// Talking to the key transparency service failed.
    ///
    /// Recoverable: the tick ends and the next one retries from the same
    /// update index.
    #[error("transport failed: {0}")]
    Transport(String),

    /// Reading or writing the state repository failed.
    #[error("storage failed: {0}")]
    Storage(#[from] std::io::Error),

    /// A wire message could not be decoded into a usable update.
    #[error("wire decoding failed: {0}")]
    Decode(String),

    /// The configuration file is missing, malformed, or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for auditor-service operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error must halt the audit loop rather than be retried.
    ///
    /// Proof and self-signature failures mean the auditor's view has
    /// diverged from the service's; no further tree heads may be signed
    /// until an operator intervenes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Core(
                ktwitness_core::Error::InvalidProof(_)
                    | ktwitness_core::Error::InvalidAuditorSignature
            )
        )
    }
}
