//! Shielded Notes
//!
//! A Note represents value held privately in the shielded pool.
//!
//! ```text
//! Note = {
//!     amount: u64,        // Amount in the token's smallest unit
//!     owner_pubkey: Fr,   // Owner's public key mapped into the field
//!     randomness: Fr,     // Blinding factor
//!     token_mint: Fr,     // Token mint mapped into the field
//!     leaf_index: u64?,   // Position in commitment tree (set on insertion)
//! }
//!
//! Commitment = Poseidon(amount, owner_pubkey, randomness, token_mint)
//! ```
//!
//! Only the commitment is ever published. It hides the note contents
//! (fresh randomness per note) and binds them (any field change changes the
//! commitment).

use ark_bn254::Fr;
use ark_std::rand::Rng;
use serde::{Deserialize, Serialize};

use crate::field::{bytes_to_field, fr_to_bytes_be, random_field, serde_decimal};
use crate::poseidon::PoseidonHasher;

/// A shielded note representing privately held value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub amount: u64,
    #[serde(with = "serde_decimal")]
    pub owner_pubkey: Fr,
    /// Random blinding factor for hiding the commitment
    #[serde(with = "serde_decimal")]
    pub randomness: Fr,
    #[serde(with = "serde_decimal")]
    pub token_mint: Fr,
    #[serde(with = "serde_decimal")]
    pub commitment: Fr,
    /// Position in the commitment Merkle tree (None if not yet inserted)
    pub leaf_index: Option<u64>,
}

/// Compute a note commitment from its four field inputs
pub fn compute_commitment(amount: u64, owner_pubkey: &Fr, randomness: &Fr, token_mint: &Fr) -> Fr {
    PoseidonHasher::new().hash(&[Fr::from(amount), *owner_pubkey, *randomness, *token_mint])
}

impl Note {
    /// Create a new note with fresh random blinding
    pub fn new<R: Rng>(amount: u64, owner_pubkey: Fr, token_mint: Fr, rng: &mut R) -> Self {
        Self::with_randomness(amount, owner_pubkey, token_mint, random_field(rng))
    }

    /// Create a note with explicit randomness (for recovery after decryption)
    pub fn with_randomness(amount: u64, owner_pubkey: Fr, token_mint: Fr, randomness: Fr) -> Self {
        let commitment = compute_commitment(amount, &owner_pubkey, &randomness, &token_mint);
        Self {
            amount,
            owner_pubkey,
            randomness,
            token_mint,
            commitment,
            leaf_index: None,
        }
    }

    /// Create a note from raw 32-byte owner and mint keys. Fresh randomness
    /// is drawn when none is given.
    pub fn from_keys(
        amount: u64,
        owner_pubkey: &[u8; 32],
        token_mint: &[u8; 32],
        randomness: Option<Fr>,
    ) -> Self {
        let owner = bytes_to_field(owner_pubkey);
        let mint = bytes_to_field(token_mint);
        match randomness {
            Some(r) => Self::with_randomness(amount, owner, mint, r),
            None => Self::new(amount, owner, mint, &mut rand::thread_rng()),
        }
    }

    /// Recompute the commitment from the note fields and compare
    pub fn verify_commitment(&self) -> bool {
        compute_commitment(
            self.amount,
            &self.owner_pubkey,
            &self.randomness,
            &self.token_mint,
        ) == self.commitment
    }

    pub fn commitment_bytes(&self) -> [u8; 32] {
        fr_to_bytes_be(&self.commitment)
    }

    /// Set the Merkle tree position (called after insertion)
    pub fn with_leaf_index(mut self, leaf_index: u64) -> Self {
        self.leaf_index = Some(leaf_index);
        self
    }

    /// Check if this note has been inserted into the tree
    pub fn is_inserted(&self) -> bool {
        self.leaf_index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_deterministic_in_randomness() {
        let owner = Fr::from(11u64);
        let mint = Fr::from(22u64);
        let r = Fr::from(33u64);

        let n1 = Note::with_randomness(100, owner, mint, r);
        let n2 = Note::with_randomness(100, owner, mint, r);
        assert_eq!(n1.commitment, n2.commitment);
        assert!(n1.verify_commitment());
    }

    #[test]
    fn test_commitment_hiding() {
        let mut rng = rand::thread_rng();
        let owner = Fr::from(11u64);
        let mint = Fr::from(22u64);

        let commitments: std::collections::HashSet<[u8; 32]> = (0..32)
            .map(|_| Note::new(100, owner, mint, &mut rng).commitment_bytes())
            .collect();
        assert_eq!(commitments.len(), 32);
    }

    #[test]
    fn test_commitment_binds_every_field() {
        let base = Note::with_randomness(100, Fr::from(1u64), Fr::from(2u64), Fr::from(3u64));

        let variants = [
            Note::with_randomness(101, Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)),
            Note::with_randomness(100, Fr::from(9u64), Fr::from(2u64), Fr::from(3u64)),
            Note::with_randomness(100, Fr::from(1u64), Fr::from(9u64), Fr::from(3u64)),
            Note::with_randomness(100, Fr::from(1u64), Fr::from(2u64), Fr::from(9u64)),
        ];
        for v in variants {
            assert_ne!(v.commitment, base.commitment);
        }
    }

    #[test]
    fn test_tampered_note_fails_commitment_check() {
        let mut note = Note::from_keys(5, &[1u8; 32], &[2u8; 32], None);
        assert!(note.verify_commitment());
        note.amount += 1;
        assert!(!note.verify_commitment());
    }

    #[test]
    fn test_leaf_index() {
        let note = Note::from_keys(5, &[1u8; 32], &[2u8; 32], Some(Fr::from(7u64)));
        assert!(!note.is_inserted());
        let note = note.with_leaf_index(3);
        assert_eq!(note.leaf_index, Some(3));
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let note = Note::with_randomness(5, Fr::from(1u64), Fr::from(2u64), Fr::from(3u64));
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["owner_pubkey"], "1");
        assert_eq!(json["token_mint"], "2");
        let back: Note = serde_json::from_value(json).unwrap();
        assert_eq!(back, note);
    }
}
