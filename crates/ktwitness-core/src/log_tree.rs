//! Condensed log tree
//!
//! A condensed form of the key transparency service's left-balanced binary
//! Merkle log tree that stores only enough nodes to reconstruct the root
//! hash and append new leaves.
//!
//! Nodes are numbered with leaves at even ids (0, 2, 4, …) and intermediate
//! nodes at odd ids; for `n` leaves the right-most leaf has id `2·(n−1)`.
//! The stored set is exactly the roots of the full subtrees on the tree's
//! right spine, kept in ascending id order.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const LEAF_NODE_DOMAIN: u8 = 0x00;
const INTERMEDIATE_NODE_DOMAIN: u8 = 0x01;

/// A leaf or intermediate node in the log tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTreeNode {
    pub id: u64,
    pub hash: [u8; 32],
}

/// The auditor's condensed view of the log tree.
#[derive(Debug, Clone, Default)]
pub struct CondensedLogTree {
    nodes: VecDeque<LogTreeNode>,
}

impl CondensedLogTree {
    /// An empty tree with zero log entries.
    pub fn new() -> Self {
        Self {
            nodes: VecDeque::new(),
        }
    }

    /// Rebuild the tree from persisted nodes.
    ///
    /// Panics if the node ids are not exactly the full-subtree roots for a
    /// log of `num_log_entries` entries; persisted state is self-signed, so
    /// a mismatch is a bug rather than hostile input.
    pub fn from_nodes(mut log_tree_nodes: Vec<LogTreeNode>, num_log_entries: u64) -> Self {
        log_tree_nodes.sort_by_key(|node| node.id);
        verify_consistent_state(&log_tree_nodes, max_leaf_node_id(num_log_entries));
        Self {
            nodes: log_tree_nodes.into(),
        }
    }

    /// Add a leaf for the next log entry.
    ///
    /// Collapses completed full subtrees as it goes: whenever the newest
    /// stored node sits at the same level as the hash being inserted, the
    /// two are folded into their parent and the stored node is discarded.
    ///
    /// `num_log_entries` is the number of entries *before* this append.
    pub fn append_leaf(
        &mut self,
        commitment: &[u8; 32],
        prefix_tree_root_hash: &[u8; 32],
        num_log_entries: u64,
    ) {
        // The new leaf becomes the right-most node in the tree.
        let max_leaf_node_id = num_log_entries * 2;
        let mut current_hash = log_leaf_hash(prefix_tree_root_hash, commitment);
        let mut current_node_id = max_leaf_node_id;
        let mut current_level = 0;

        while self
            .nodes
            .back()
            .is_some_and(|node| level(node.id) == current_level)
        {
            let Some(node) = self.nodes.pop_back() else {
                break;
            };

            let domain = if current_level == 0 {
                LEAF_NODE_DOMAIN
            } else {
                INTERMEDIATE_NODE_DOMAIN
            };
            let mut digest = Sha256::new();
            digest.update([domain]);
            digest.update(node.hash);
            digest.update([domain]);
            digest.update(current_hash);
            current_hash = digest.finalize().into();

            current_node_id = parent(node.id, max_leaf_node_id);
            current_level += 1;
        }

        self.nodes.push_back(LogTreeNode {
            id: current_node_id,
            hash: current_hash,
        });
    }

    /// Reconstruct the root hash of the log tree.
    ///
    /// Returns `None` for an empty tree. With one stored node that node is
    /// the root; otherwise the stored nodes are folded newest-to-oldest,
    /// each fold hashing an older subtree root on the left against the
    /// accumulated right side. Only the newest node can be a leaf, which is
    /// what the first fold's domain tag reflects.
    pub fn root_hash(&self) -> Option<[u8; 32]> {
        let newest = self.nodes.back()?;
        let mut root_hash = newest.hash;
        let mut right_is_leaf = is_leaf(newest.id);

        for node in self.nodes.iter().rev().skip(1) {
            let mut digest = Sha256::new();
            digest.update([INTERMEDIATE_NODE_DOMAIN]);
            digest.update(node.hash);
            digest.update([if right_is_leaf {
                LEAF_NODE_DOMAIN
            } else {
                INTERMEDIATE_NODE_DOMAIN
            }]);
            digest.update(root_hash);
            root_hash = digest.finalize().into();
            right_is_leaf = false;
        }

        Some(root_hash)
    }

    /// Snapshot of the stored nodes in ascending id order, for persistence.
    pub fn nodes(&self) -> Vec<LogTreeNode> {
        self.nodes.iter().copied().collect()
    }
}

/// `H(prefix_tree_root_hash ‖ commitment)` — the log-tree leaf hash for an
/// update. No domain byte here; the domain tags are applied when leaves are
/// combined upward.
pub fn log_leaf_hash(prefix_tree_root_hash: &[u8; 32], commitment: &[u8; 32]) -> [u8; 32] {
    let mut digest = Sha256::new();
    digest.update(prefix_tree_root_hash);
    digest.update(commitment);
    digest.finalize().into()
}

/// The right-most leaf id for a log of `num_log_entries` entries.
pub fn max_leaf_node_id(num_log_entries: u64) -> u64 {
    assert!(
        num_log_entries > 0,
        "number of log entries must be greater than 0"
    );
    (num_log_entries - 1) * 2
}

/// Whether the node ids match the expected full-subtree roots for a tree
/// with the given right-most leaf. Panics otherwise.
fn verify_consistent_state(nodes: &[LogTreeNode], max_leaf_node_id: u64) {
    let expected = full_subtree_root_ids(max_leaf_node_id);
    let actual: Vec<u64> = nodes.iter().map(|node| node.id).collect();
    assert_eq!(
        expected, actual,
        "stored node ids do not match the expected node ids for a tree of the given size"
    );
}

/// Whether `node_id` roots a full subtree (one whose leaf count is a power
/// of two) in a tree with the given right-most leaf.
pub fn is_full_subtree(node_id: u64, max_leaf_node_id: u64) -> bool {
    assert!(
        node_id <= max_leaf_node_id,
        "the given node does not exist in the tree"
    );

    // Right-most leaf id the subtree would have if it were full.
    let expected_max_leaf_node_id = node_id + (1 << level(node_id)) - 1;
    expected_max_leaf_node_id <= max_leaf_node_id
}

/// Ids of the full-subtree roots, walking the right spine from the tree
/// root. The log tree is left-balanced, so whenever a right child exists the
/// left subtree is full.
pub fn full_subtree_root_ids(max_leaf_node_id: u64) -> Vec<u64> {
    let mut root_node_id = root(max_leaf_node_id);
    let mut subtree_root_ids = Vec::new();
    while !is_full_subtree(root_node_id, max_leaf_node_id) {
        subtree_root_ids.push(left_child(root_node_id));
        root_node_id = right_child(root_node_id, max_leaf_node_id);
    }
    subtree_root_ids.push(root_node_id);
    subtree_root_ids
}

/// Whether the id belongs to a leaf (even ids are leaves).
pub fn is_leaf(node_id: u64) -> bool {
    node_id % 2 == 0
}

/// The node's level: leaves sit at level 0 and each parent is one above its
/// children. Equal to the number of trailing one-bits of the id.
pub fn level(node_id: u64) -> u32 {
    if is_leaf(node_id) {
        0
    } else {
        (!node_id).trailing_zeros()
    }
}

/// Left child of an intermediate node. The caller guarantees the node is in
/// the tree.
pub fn left_child(node_id: u64) -> u64 {
    assert!(!is_leaf(node_id), "leaf nodes do not have children");
    node_id - (1 << (level(node_id) - 1))
}

/// Right child of an intermediate node in a tree with the given right-most
/// leaf.
pub fn right_child(node_id: u64, max_leaf_node_id: u64) -> u64 {
    assert!(!is_leaf(node_id), "leaf nodes do not have children");
    assert!(
        node_id <= max_leaf_node_id,
        "tree does not contain given intermediate node"
    );

    // Start where the right child would sit in a full subtree, then walk
    // left until the node actually exists in a tree of this size.
    let mut right_node_id = node_id + (1 << (level(node_id) - 1));
    while right_node_id > max_leaf_node_id {
        right_node_id = left_child(right_node_id);
    }
    right_node_id
}

/// Root id of a tree with the given right-most leaf.
pub fn root(max_leaf_node_id: u64) -> u64 {
    if max_leaf_node_id == 0 {
        return 0;
    }
    // Highest power of two at or below the max leaf id, minus one.
    (1 << (u64::BITS - 1 - max_leaf_node_id.leading_zeros())) - 1
}

/// Parent of `node_id` in a tree with the given right-most leaf.
///
/// Descends from the root choosing left or right until the next step would
/// land on `node_id`. Panics for the root itself and for nodes outside the
/// tree.
pub fn parent(node_id: u64, max_leaf_node_id: u64) -> u64 {
    assert!(
        node_id <= max_leaf_node_id,
        "the given node does not exist in the tree"
    );

    let root_node_id = root(max_leaf_node_id);
    assert!(
        node_id != root_node_id,
        "root nodes do not have parent nodes"
    );

    let mut parent_node_id = root_node_id;
    loop {
        let child_node_id = if node_id < parent_node_id {
            left_child(parent_node_id)
        } else {
            right_child(parent_node_id, max_leaf_node_id)
        };

        if child_node_id == node_id {
            return parent_node_id;
        }
        parent_node_id = child_node_id;
    }
}
