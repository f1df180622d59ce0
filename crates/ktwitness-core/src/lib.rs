//! ktwitness-core: the audit core of a third-party key-transparency auditor
//!
//! The key transparency service maintains two append-only Merkle structures:
//! a prefix tree indexed by per-key commitment values and a log tree
//! chronicling every update. This crate holds everything needed to replay
//! both trees in condensed form and to countersign log-tree heads:
//!
//! - [`CondensedPrefixTree`]: verifies each update's starting-root proof and
//!   folds the update into a new root.
//! - [`CondensedLogTree`]: O(log n) append and root reconstruction over the
//!   minimum retained node set.
//! - [`tree_head`]: the fixed-layout signed tree head.
//! - [`state`]: the self-signed persisted snapshot.
//!
//! The service loop, transport, storage, and configuration live in the
//! `ktwitness-auditor` crate.

pub mod error;
pub mod keys;
pub mod log_tree;
pub mod prefix_tree;
pub mod state;
pub mod tree_head;
pub mod update;

pub use error::{Error, Result};
pub use keys::{Signature, SigningKey, VerifyingKey};
pub use log_tree::{CondensedLogTree, LogTreeNode};
pub use prefix_tree::CondensedPrefixTree;
pub use state::{AuditorState, AuditorStateAndSignature};
pub use tree_head::{sign_tree_head, tree_head_payload, AuditorTreeHead};
pub use update::{AuditorProof, AuditorUpdate};
