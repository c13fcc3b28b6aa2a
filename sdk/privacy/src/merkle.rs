//! Merkle Tree for Note Commitments
//!
//! Fixed-depth sparse Merkle tree over note commitments. Only set leaves and
//! the interior nodes above them are stored; every other node is the
//! precomputed hash of an empty subtree at its level.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2   C3  (Note Commitments)
//! ```
//!
//! Mutations (`insert`, `insert_at`, `import`) take `&mut self`, so a tree
//! instance has exactly one writer. Proof generation and verification only
//! borrow the tree and can run concurrently against a stable root.

use ark_bn254::Fr;
use ark_ff::Zero;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::error::{PrivacyError, Result};
use crate::field::{fr_from_decimal, fr_to_decimal, serde_decimal, serde_decimal_vec};
use crate::poseidon::PoseidonHasher;

pub use makora_config::DEFAULT_TREE_DEPTH;

/// Largest supported depth (2^32 leaves)
pub const MAX_TREE_DEPTH: usize = 32;

/// A Merkle path proving inclusion of a leaf under `root`
///
/// Only meaningful against the root it was generated from. Detecting a
/// stale root is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Sibling hashes from leaf to root
    #[serde(with = "serde_decimal_vec")]
    pub path: Vec<Fr>,
    /// Position bits (0 = current node is the left child, 1 = right)
    pub path_indices: Vec<u8>,
    #[serde(with = "serde_decimal")]
    pub root: Fr,
    #[serde(with = "serde_decimal")]
    pub leaf: Fr,
    pub leaf_index: u64,
}

impl MerkleProof {
    /// Verify against the root carried in the proof
    pub fn verify(&self) -> bool {
        verify_merkle_proof(self)
    }
}

/// Stateless verification: folds `path`/`path_indices` over `leaf` and
/// compares the result with `root`. Never panics; malformed proofs are false.
///
/// `path_indices` must spell out the bits of `leaf_index`, low bit first.
pub fn verify_merkle_proof(proof: &MerkleProof) -> bool {
    if proof.path.is_empty()
        || proof.path.len() > MAX_TREE_DEPTH
        || proof.path.len() != proof.path_indices.len()
    {
        return false;
    }
    if !indices_match_leaf_index(&proof.path_indices, proof.leaf_index) {
        return false;
    }

    let hasher = PoseidonHasher::new();
    match compute_root_from_path(&hasher, proof.leaf, &proof.path, &proof.path_indices) {
        Some(root) => root == proof.root,
        None => false,
    }
}

fn indices_match_leaf_index(path_indices: &[u8], leaf_index: u64) -> bool {
    if path_indices.len() < 64 && leaf_index >> path_indices.len() != 0 {
        return false;
    }
    path_indices
        .iter()
        .enumerate()
        .all(|(level, bit)| u64::from(*bit) == (leaf_index >> level) & 1)
}

fn compute_root_from_path(
    hasher: &PoseidonHasher,
    leaf: Fr,
    path: &[Fr],
    path_indices: &[u8],
) -> Option<Fr> {
    let mut current = leaf;
    for (sibling, bit) in path.iter().zip(path_indices) {
        current = match bit {
            0 => hasher.hash_pair(&current, sibling),
            1 => hasher.hash_pair(sibling, &current),
            _ => return None,
        };
    }
    Some(current)
}

/// JSON-serializable tree export: `(index, decimal value)` pairs plus depth
///
/// `roots` carries the owner's recent root history (decimal, most recent
/// first). A bare tree export leaves it empty and omits it from the JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub leaves: Vec<(u64, String)>,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<String>,
}

/// Sparse Merkle tree for note commitments
#[derive(Debug, Clone)]
pub struct MerkleTree {
    depth: usize,
    /// Set leaves: index -> commitment
    leaves: BTreeMap<u64, Fr>,
    /// Interior nodes above set leaves: (level, index) -> hash
    nodes: HashMap<(usize, u64), Fr>,
    /// Empty subtree roots, `zero_values[level]` for level 0..=depth
    zero_values: Vec<Fr>,
    /// Next append position
    next_index: u64,
    root: Fr,
    hasher: PoseidonHasher,
}

impl MerkleTree {
    /// Create an empty tree of the given depth
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(PrivacyError::InvalidTreeDepth(depth));
        }

        let hasher = PoseidonHasher::new();
        let zero_values = Self::compute_zero_values(&hasher, depth);
        let root = zero_values[depth];

        Ok(Self {
            depth,
            leaves: BTreeMap::new(),
            nodes: HashMap::new(),
            zero_values,
            next_index: 0,
            root,
            hasher,
        })
    }

    fn compute_zero_values(hasher: &PoseidonHasher, depth: usize) -> Vec<Fr> {
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(Fr::zero());
        for level in 0..depth {
            let prev = zeros[level];
            zeros.push(hasher.hash_pair(&prev, &prev));
        }
        zeros
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum number of leaves (2^depth)
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn root(&self) -> Fr {
        self.root
    }

    /// Hash of an empty subtree at `level` (0 = empty leaf)
    pub fn zero_value(&self, level: usize) -> Option<Fr> {
        self.zero_values.get(level).copied()
    }

    pub fn get_leaf(&self, index: u64) -> Option<Fr> {
        self.leaves.get(&index).copied()
    }

    /// Append a leaf at the next free index and return that index
    pub fn insert(&mut self, leaf: Fr) -> Result<u64> {
        let index = self.next_index;
        if index >= self.capacity() {
            return Err(PrivacyError::TreeFull {
                capacity: self.capacity(),
            });
        }
        self.update_path(index, leaf);
        debug!("Inserted leaf {} (tree now holds {})", index, self.leaf_count());
        Ok(index)
    }

    /// Place a leaf at a caller-chosen index.
    ///
    /// Meant for replaying an exported tree; fresh commitments go through
    /// [`MerkleTree::insert`].
    pub fn insert_at(&mut self, index: u64, leaf: Fr) -> Result<()> {
        if index >= self.capacity() {
            return Err(PrivacyError::LeafIndexOutOfRange {
                index,
                depth: self.depth,
            });
        }
        self.update_path(index, leaf);
        Ok(())
    }

    fn node(&self, level: usize, index: u64) -> Fr {
        let stored = if level == 0 {
            self.leaves.get(&index)
        } else {
            self.nodes.get(&(level, index))
        };
        stored.copied().unwrap_or(self.zero_values[level])
    }

    fn update_path(&mut self, index: u64, leaf: Fr) {
        self.leaves.insert(index, leaf);
        self.next_index = self.next_index.max(index + 1);

        let mut current_index = index;
        let mut current_hash = leaf;

        for level in 0..self.depth {
            let is_right = current_index & 1 == 1;
            let sibling = self.node(level, current_index ^ 1);

            current_hash = if is_right {
                self.hasher.hash_pair(&sibling, &current_hash)
            } else {
                self.hasher.hash_pair(&current_hash, &sibling)
            };
            current_index >>= 1;

            self.nodes.insert((level + 1, current_index), current_hash);
        }

        self.root = current_hash;
    }

    /// Build an inclusion proof for a set leaf against the current root
    pub fn generate_proof(&self, leaf_index: u64) -> Result<MerkleProof> {
        let leaf = self
            .leaves
            .get(&leaf_index)
            .copied()
            .ok_or(PrivacyError::LeafNotFound(leaf_index))?;

        let mut path = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut current_index = leaf_index;

        for level in 0..self.depth {
            path_indices.push((current_index & 1) as u8);
            path.push(self.node(level, current_index ^ 1));
            current_index >>= 1;
        }

        Ok(MerkleProof {
            path,
            path_indices,
            root: self.root,
            leaf,
            leaf_index,
        })
    }

    /// Verify a proof produced for a tree of this depth
    pub fn verify_proof(&self, proof: &MerkleProof) -> bool {
        proof.path.len() == self.depth && verify_merkle_proof(proof)
    }

    /// Recompute the root level by level from the leaf set alone, ignoring
    /// the cached interior nodes
    pub fn recompute_root(&self) -> Fr {
        let mut layer: BTreeMap<u64, Fr> = self.leaves.clone();

        for level in 0..self.depth {
            let zero = self.zero_values[level];
            let mut next = BTreeMap::new();
            for &index in layer.keys() {
                let parent = index >> 1;
                if next.contains_key(&parent) {
                    continue;
                }
                let left = layer.get(&(parent << 1)).copied().unwrap_or(zero);
                let right = layer.get(&((parent << 1) | 1)).copied().unwrap_or(zero);
                next.insert(parent, self.hasher.hash_pair(&left, &right));
            }
            layer = next;
        }

        layer
            .get(&0)
            .copied()
            .unwrap_or(self.zero_values[self.depth])
    }

    pub fn export(&self) -> TreeSnapshot {
        TreeSnapshot {
            leaves: self
                .leaves
                .iter()
                .map(|(index, value)| (*index, fr_to_decimal(value)))
                .collect(),
            depth: self.depth,
            roots: Vec::new(),
        }
    }

    /// Replace this tree's contents with a snapshot.
    ///
    /// The whole snapshot is validated before anything is touched; on error
    /// the tree is left exactly as it was.
    pub fn import(&mut self, snapshot: &TreeSnapshot) -> Result<()> {
        let mut fresh = Self::new(snapshot.depth)?;

        let mut entries = snapshot
            .leaves
            .iter()
            .map(|(index, value)| Ok((*index, fr_from_decimal(value)?)))
            .collect::<Result<Vec<(u64, Fr)>>>()?;
        entries.sort_by_key(|(index, _)| *index);

        for (index, value) in entries {
            fresh.insert_at(index, value)?;
        }

        debug_assert_eq!(fresh.root, fresh.recompute_root());
        debug!(
            "Imported tree snapshot: depth {}, {} leaves",
            fresh.depth,
            fresh.leaf_count()
        );

        *self = fresh;
        Ok(())
    }

    pub fn from_snapshot(snapshot: &TreeSnapshot) -> Result<Self> {
        let mut tree = Self::new(snapshot.depth)?;
        tree.import(snapshot)?;
        Ok(tree)
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        match Self::new(DEFAULT_TREE_DEPTH) {
            Ok(tree) => tree,
            Err(_) => unreachable!("default depth is within 1..=MAX_TREE_DEPTH"),
        }
    }
}

/// Root history for the commitment tree
///
/// Stores recent roots so a proof built a few inserts ago can still be
/// recognised as referring to a real tree state.
#[derive(Debug, Clone, Default)]
pub struct RootHistory {
    /// Recent roots (most recent first)
    roots: VecDeque<Fr>,
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Add a new root
    pub fn push(&mut self, root: Fr) {
        if self.roots.front() == Some(&root) {
            return;
        }
        self.roots.push_front(root);
        self.roots.truncate(self.max_size);
    }

    /// Check if a root is the current one or a recent one
    pub fn contains(&self, root: &Fr) -> bool {
        self.roots.contains(root)
    }

    /// Get the most recent root
    pub fn current(&self) -> Option<&Fr> {
        self.roots.front()
    }

    /// Roots from most recent to oldest
    pub fn iter(&self) -> impl Iterator<Item = &Fr> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Replace the contents with `roots` (most recent first), keeping at
    /// most `max_size` of them
    pub fn restore(&mut self, roots: impl IntoIterator<Item = Fr>) {
        self.roots.clear();
        for root in roots.into_iter().take(self.max_size) {
            if !self.roots.contains(&root) {
                self.roots.push_back(root);
            }
        }
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }
}
