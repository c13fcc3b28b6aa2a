//! Nullifiers
//!
//! ```text
//! Nullifier = Poseidon(commitment, leaf_index, spending_key)
//! ```
//!
//! Published when a note is spent; a second spend of the same note would
//! publish the same value and be rejected on-chain. The transfer circuit
//! recomputes it from the private inputs.

use ark_bn254::Fr;

use crate::field::fr_to_bytes_be;
use crate::note::Note;
use crate::poseidon::PoseidonHasher;

/// Derive the nullifier for a note at a given tree position
pub fn derive_nullifier(commitment: &Fr, leaf_index: u64, spending_key: &Fr) -> Fr {
    PoseidonHasher::new().hash(&[*commitment, Fr::from(leaf_index), *spending_key])
}

impl Note {
    /// Nullifier for spending this note.
    ///
    /// `None` until the note has been inserted into the tree.
    pub fn nullifier(&self, spending_key: &Fr) -> Option<Fr> {
        let leaf_index = self.leaf_index?;
        Some(derive_nullifier(&self.commitment, leaf_index, spending_key))
    }

    pub fn nullifier_bytes(&self, spending_key: &Fr) -> Option<[u8; 32]> {
        self.nullifier(spending_key).map(|n| fr_to_bytes_be(&n))
    }
}
