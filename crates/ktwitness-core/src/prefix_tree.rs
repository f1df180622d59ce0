//! Condensed prefix tree
//!
//! The prefix tree is a 256-level binary Merkle tree whose leaves carry the
//! data the key transparency service uses to locate entries in the log tree.
//! It is traversed with a commitment index, a 256-bit VRF output of the
//! original search key. Unlike the log tree, the prefix tree counts the root
//! as level 0 and the leaves as level 256.
//!
//! The auditor stores exactly one value about prefix trees: the most recent
//! root hash. Every incoming update is first proved against that hash, then
//! folded into a new root.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::update::{AuditorProof, AuditorUpdate};

const LEAF_NODE_DOMAIN: u8 = 0x00;
const INTERMEDIATE_NODE_DOMAIN: u8 = 0x01;
const STAND_IN_NODE_DOMAIN: u8 = 0x02;

const ROOT_LEVEL: usize = 0;
const LEAF_LEVEL: usize = 256;

/// The auditor's view of the service's prefix tree: just the current root.
#[derive(Debug, Clone, Default)]
pub struct CondensedPrefixTree {
    root_hash: Option<[u8; 32]>,
}

impl CondensedPrefixTree {
    /// An empty tree, as before any real update has been applied.
    pub fn new() -> Self {
        Self { root_hash: None }
    }

    /// Rebuild the view from a persisted root hash.
    pub fn with_root(root_hash: [u8; 32]) -> Self {
        Self {
            root_hash: Some(root_hash),
        }
    }

    pub fn root_hash(&self) -> Option<[u8; 32]> {
        self.root_hash
    }

    /// Apply `update`: verify that the service started from the auditor's
    /// root hash, then compute and store the new root.
    ///
    /// `total_updates_processed` is the number of updates the auditor has
    /// accepted so far; it doubles as the log-tree position of this update.
    pub fn apply_update(
        &mut self,
        update: &AuditorUpdate,
        total_updates_processed: u64,
    ) -> Result<()> {
        self.verify_starting_root_hash(update, total_updates_processed)?;

        let new_root = if update.real {
            new_root_for_real_update(update, total_updates_processed)
        } else {
            new_root_for_fake_update(update)?
        };
        self.root_hash = Some(new_root);
        Ok(())
    }

    /// Check that the proof's implied starting root matches the stored one.
    fn verify_starting_root_hash(
        &self,
        update: &AuditorUpdate,
        total_updates_processed: u64,
    ) -> Result<()> {
        if matches!(update.proof, AuditorProof::NewTree) {
            if total_updates_processed != 0 || self.root_hash.is_some() {
                return Err(Error::invalid_proof(
                    "auditor must have zero log entries and no root hash for a new tree proof",
                ));
            }
            return Ok(());
        }

        let Some(root_hash) = self.root_hash else {
            if total_updates_processed == 0 {
                return Err(Error::invalid_proof("first proof type must be NewTree"));
            }
            // Unreachable unless apply_update failed to store a root.
            return Err(Error::invalid_proof("no root hash present for proof"));
        };

        let root_hash_from_proof = match &update.proof {
            AuditorProof::DifferentKey { old_seed, copath } => {
                // The old seed produces the stand-in hash where the search
                // ended; it plays no further part in the ascent.
                let starting_hash = stand_in_hash(old_seed, copath.len());
                calculate_root_hash(
                    starting_hash,
                    &update.stand_in_seed,
                    &update.commitment_index,
                    copath,
                    copath.len(),
                )
            }
            AuditorProof::SameKey {
                counter,
                first_log_position,
                copath,
            } => {
                let starting_hash =
                    leaf_hash(&update.commitment_index, *counter, *first_log_position);
                calculate_root_hash(
                    starting_hash,
                    &update.stand_in_seed,
                    &update.commitment_index,
                    copath,
                    LEAF_LEVEL,
                )
            }
            AuditorProof::NewTree => unreachable!("handled above"),
        };

        if root_hash_from_proof != root_hash {
            return Err(Error::invalid_proof(format!(
                "starting prefix tree root hash for update {total_updates_processed} does not \
                 match the one provided by the key transparency service: expected {}, got {} \
                 ({update})",
                hex::encode(root_hash),
                hex::encode(root_hash_from_proof),
            )));
        }

        Ok(())
    }
}

/// New root for a real update: a fresh leaf hash folded up through the
/// proof's copath and stand-ins from the update's seed.
fn new_root_for_real_update(update: &AuditorUpdate, total_updates_processed: u64) -> [u8; 32] {
    let (starting_hash, copath): (_, &[[u8; 32]]) = match &update.proof {
        AuditorProof::NewTree => (
            leaf_hash(&update.commitment_index, 0, total_updates_processed),
            &[],
        ),
        AuditorProof::DifferentKey { copath, .. } => (
            leaf_hash(&update.commitment_index, 0, total_updates_processed),
            copath.as_slice(),
        ),
        AuditorProof::SameKey {
            counter,
            first_log_position,
            copath,
        } => (
            leaf_hash(&update.commitment_index, counter + 1, *first_log_position),
            copath.as_slice(),
        ),
    };

    calculate_root_hash(
        starting_hash,
        &update.stand_in_seed,
        &update.commitment_index,
        copath,
        LEAF_LEVEL,
    )
}

/// New root for a fake update: a fresh stand-in hash at the bottom of the
/// copath folded up to the root. Only `DifferentKey` is legal here.
fn new_root_for_fake_update(update: &AuditorUpdate) -> Result<[u8; 32]> {
    let copath = match &update.proof {
        AuditorProof::NewTree => {
            return Err(Error::invalid_proof(
                "NewTree proof cannot be given for a fake update",
            ))
        }
        AuditorProof::SameKey { .. } => {
            return Err(Error::invalid_proof(
                "SameKey proof cannot be given for a fake update",
            ))
        }
        AuditorProof::DifferentKey { copath, .. } => copath,
    };

    let starting_hash = stand_in_hash(&update.stand_in_seed, copath.len());
    Ok(calculate_root_hash(
        starting_hash,
        &update.stand_in_seed,
        &update.commitment_index,
        copath,
        copath.len(),
    ))
}

/// Fold a starting hash up to the root.
///
/// The "dense" part of the tree — levels at or below `copath.len()` — uses
/// the service-provided sibling hashes; above it, siblings are stand-ins
/// derived from `seed`. At each level the commitment-index bit decides which
/// side the ascending hash sits on.
///
/// Panics if the copath or starting level is out of range; those are
/// programming errors, not proof failures.
fn calculate_root_hash(
    starting_hash: [u8; 32],
    seed: &[u8; 16],
    commitment_index: &[u8; 32],
    copath: &[[u8; 32]],
    starting_level: usize,
) -> [u8; 32] {
    assert!(
        copath.len() <= LEAF_LEVEL && starting_level > ROOT_LEVEL && starting_level <= LEAF_LEVEL,
        "invalid copath size or starting level"
    );

    let mut hash = starting_hash;
    for level in (ROOT_LEVEL + 1..=starting_level).rev() {
        let sibling_hash = if level <= copath.len() {
            copath[level - 1]
        } else {
            stand_in_hash(seed, level)
        };

        hash = if bit_set(commitment_index, level) {
            parent_hash(&sibling_hash, &hash)
        } else {
            parent_hash(&hash, &sibling_hash)
        };
    }
    hash
}

/// Whether the commitment-index bit for `level` is 1.
///
/// Bits are numbered MSB-first: level 1 reads the top bit of byte 0.
pub fn bit_set(commitment_index: &[u8; 32], level: usize) -> bool {
    assert!(
        level > ROOT_LEVEL && level <= LEAF_LEVEL,
        "level must be in 1..=256"
    );
    let bit_index = level - 1;
    let byte = commitment_index[bit_index / 8];
    (byte >> (7 - bit_index % 8)) & 1 == 1
}

/// `H(0x00 ‖ commitment_index ‖ counter_be ‖ position_be)`
pub fn leaf_hash(commitment_index: &[u8; 32], update_count: u32, log_tree_position: u64) -> [u8; 32] {
    let mut digest = Sha256::new();
    digest.update([LEAF_NODE_DOMAIN]);
    digest.update(commitment_index);
    digest.update(update_count.to_be_bytes());
    digest.update(log_tree_position.to_be_bytes());
    digest.finalize().into()
}

/// `H(0x01 ‖ left ‖ right)`
pub fn parent_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut digest = Sha256::new();
    digest.update([INTERMEDIATE_NODE_DOMAIN]);
    digest.update(left);
    digest.update(right);
    digest.finalize().into()
}

/// `H(0x02 ‖ seed ‖ (level − 1))`
///
/// The level is shifted down by one so it fits in a byte; a stand-in is
/// never computed for the root level.
pub fn stand_in_hash(seed: &[u8; 16], level: usize) -> [u8; 32] {
    assert!(
        level > ROOT_LEVEL && level <= LEAF_LEVEL,
        "level must be in 1..=256"
    );
    let mut digest = Sha256::new();
    digest.update([STAND_IN_NODE_DOMAIN]);
    digest.update(seed);
    digest.update([(level - 1) as u8]);
    digest.finalize().into()
}
