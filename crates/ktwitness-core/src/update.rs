//! Update and proof types delivered by the key transparency service

use std::fmt;

use serde::{Deserialize, Serialize};

/// One update to the key transparency log, together with the data the
/// auditor needs to verify and accept it.
///
/// A *fake* update carries randomly generated index and commitment values;
/// the service inserts them so that observers cannot distinguish traffic
/// patterns. Fake updates still advance both trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorUpdate {
    /// Whether the update is real or fake.
    pub real: bool,
    /// VRF output of the search key that was updated; navigates the prefix
    /// tree and feeds the prefix-tree leaf hash. Random for fake updates.
    pub commitment_index: [u8; 32],
    /// Pseudo-random value hashed with a prefix-tree level index to produce
    /// stand-in hashes for unexplored subtrees.
    pub stand_in_seed: [u8; 16],
    /// Cryptographic hash of the update; feeds the log-tree leaf hash.
    /// Random for fake updates.
    pub commitment: [u8; 32],
    /// Proof that the update extends the auditor's current prefix tree root.
    pub proof: AuditorProof,
}

/// Proof of the service's starting prefix-tree state before the update.
///
/// The set of variants is closed; the wire decoder rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditorProof {
    /// The very first update in the log. Only legal for a real update
    /// against an empty auditor.
    NewTree,
    /// The search for the commitment index ended in a stand-in hash, i.e.
    /// the update does not touch an existing leaf. Legal for real and fake
    /// updates.
    DifferentKey {
        /// Seed for the stand-in hash where the search ended. Used only to
        /// derive the starting hash at the bottom of the copath.
        old_seed: [u8; 16],
        /// Sibling hashes up to and including the sibling of the stand-in,
        /// in root-to-leaf order.
        copath: Vec<[u8; 32]>,
    },
    /// The update touches an existing leaf, so verification starts from the
    /// leaf hash itself. Only legal for real updates.
    SameKey {
        /// How many times the search key's value has been updated so far.
        counter: u32,
        /// Log-tree position of the key's first occurrence.
        first_log_position: u64,
        /// Sibling hashes in the explored part of the prefix tree, in
        /// root-to-leaf order; levels beyond it use stand-ins from the
        /// update's own seed.
        copath: Vec<[u8; 32]>,
    },
}

impl fmt::Display for AuditorUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuditorUpdate{{real={}, commitment_index={}, stand_in_seed={}, commitment={}, proof={}}}",
            self.real,
            hex::encode(self.commitment_index),
            hex::encode(self.stand_in_seed),
            hex::encode(self.commitment),
            self.proof,
        )
    }
}

impl fmt::Display for AuditorProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditorProof::NewTree => write!(f, "NewTree"),
            AuditorProof::DifferentKey { old_seed, copath } => write!(
                f,
                "DifferentKey{{old_seed={}, copath_len={}}}",
                hex::encode(old_seed),
                copath.len()
            ),
            AuditorProof::SameKey {
                counter,
                first_log_position,
                copath,
            } => write!(
                f,
                "SameKey{{counter={counter}, first_log_position={first_log_position}, copath_len={}}}",
                copath.len()
            ),
        }
    }
}
