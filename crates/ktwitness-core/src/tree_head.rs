//! Tree-head payload assembly and signing
//!
//! The auditor periodically countersigns the log-tree head. The signed
//! payload is a fixed 153-byte buffer binding the long-term log
//! configuration (the three deployment public keys) to the current log size,
//! wall-clock time, and log-tree root hash.

use crate::keys::{Signature, SigningKey, VerifyingKey};

/// Total length of the signed payload.
pub const TREE_HEAD_BYTE_LENGTH: usize = 153;

const CIPHER_SUITE_IDENTIFIER: [u8; 2] = [0x00, 0x00];
const THIRD_PARTY_AUDITING_MODE: u8 = 0x03;

/// A signed tree head as sent back to the key transparency service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditorTreeHead {
    /// Number of updates in the auditor's view of the log tree.
    pub tree_size: u64,
    /// Signing time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Ed25519 signature over the [`tree_head_payload`] bytes.
    pub signature: Signature,
}

/// Assemble the fixed-layout payload the auditor signs.
///
/// Layout (big-endian): 2-byte cipher suite, 1-byte deployment mode, then
/// the three raw public keys each preceded by a u16 length, then the tree
/// size, timestamp, and log-tree root hash.
pub fn tree_head_payload(
    kt_signing_public_key: &VerifyingKey,
    kt_vrf_public_key: &VerifyingKey,
    auditor_public_key: &VerifyingKey,
    tree_size: u64,
    timestamp_ms: i64,
    log_tree_root_hash: &[u8; 32],
) -> [u8; TREE_HEAD_BYTE_LENGTH] {
    let mut payload = [0u8; TREE_HEAD_BYTE_LENGTH];
    payload[0..2].copy_from_slice(&CIPHER_SUITE_IDENTIFIER);
    payload[2] = THIRD_PARTY_AUDITING_MODE;

    let mut offset = 3;
    for key in [kt_signing_public_key, kt_vrf_public_key, auditor_public_key] {
        let raw = key.to_bytes();
        payload[offset..offset + 2].copy_from_slice(&(raw.len() as u16).to_be_bytes());
        payload[offset + 2..offset + 2 + raw.len()].copy_from_slice(&raw);
        offset += 2 + raw.len();
    }

    payload[offset..offset + 8].copy_from_slice(&tree_size.to_be_bytes());
    payload[offset + 8..offset + 16].copy_from_slice(&timestamp_ms.to_be_bytes());
    payload[offset + 16..].copy_from_slice(log_tree_root_hash);
    payload
}

/// Sign a tree head with the auditor's private key.
#[allow(clippy::too_many_arguments)]
pub fn sign_tree_head(
    kt_signing_public_key: &VerifyingKey,
    kt_vrf_public_key: &VerifyingKey,
    auditor_public_key: &VerifyingKey,
    tree_size: u64,
    timestamp_ms: i64,
    log_tree_root_hash: &[u8; 32],
    auditor_private_key: &SigningKey,
) -> Signature {
    let payload = tree_head_payload(
        kt_signing_public_key,
        kt_vrf_public_key,
        auditor_public_key,
        tree_size,
        timestamp_ms,
        log_tree_root_hash,
    );
    auditor_private_key.sign(&payload)
}
