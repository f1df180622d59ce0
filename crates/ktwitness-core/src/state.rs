//! Auditor state codec
//!
//! On each successful attestation the auditor snapshots the minimum state
//! needed to resume after a restart, signs the serialized bytes with its own
//! private key, and persists snapshot and signature as one blob. On startup
//! the self-signature is verified before any of the state is trusted.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::{Signature, SigningKey, VerifyingKey};
use crate::log_tree::LogTreeNode;

/// The auditor's resumable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorState {
    pub total_updates_processed: u64,
    pub current_prefix_tree_root_hash: [u8; 32],
    pub log_tree_nodes: Vec<LogTreeNode>,
}

/// The persisted record: serialized state plus the auditor's signature over
/// those exact bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorStateAndSignature {
    pub serialized_auditor_state: Vec<u8>,
    pub signature: Vec<u8>,
}

impl AuditorState {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}

impl AuditorStateAndSignature {
    /// Serialize `state` and sign the serialized bytes.
    pub fn seal(state: &AuditorState, auditor_private_key: &SigningKey) -> Result<Self> {
        let serialized_auditor_state = state.encode()?;
        let signature = auditor_private_key.sign(&serialized_auditor_state);
        Ok(Self {
            serialized_auditor_state,
            signature: signature.as_bytes().to_vec(),
        })
    }

    /// Verify the self-signature and decode the inner state.
    pub fn verify_and_decode(&self, auditor_public_key: &VerifyingKey) -> Result<AuditorState> {
        let signature = Signature::try_from_slice(&self.signature)
            .map_err(|_| Error::InvalidAuditorSignature)?;
        auditor_public_key.verify(&self.serialized_auditor_state, &signature)?;
        AuditorState::decode(&self.serialized_auditor_state)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}
