//! Makora Privacy SDK
//!
//! Stealth payments and shielded notes for the Makora trading agent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        PrivacyManager                           │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌───────────────┐ │
//! │  │ Stealth addresses│  │  Notes + Merkle  │  │ Proof pipeline│ │
//! │  │ (meta, derive,   │  │  (commitments,   │  │ (inputs ->    │ │
//! │  │  scan, recover)  │  │   nullifiers)    │  │  Groth16)     │ │
//! │  └──────────────────┘  └──────────────────┘  └───────────────┘ │
//! │         │                      │                     │          │
//! │         ▼                      ▼                     ▼          │
//! │  65-byte announcement    root + MerkleProof    256-byte proof   │
//! │  (on-chain log)          (circuit witness)     (on-chain verify)│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stealth keys live on Curve25519 (Ed25519 spending, X25519 viewing). Notes,
//! the tree and the circuit work over the BN254 scalar field with Poseidon.

pub mod encryption;
pub mod error;
pub mod field;
pub mod manager;
pub mod merkle;
pub mod note;
pub mod nullifier;
pub mod poseidon;
pub mod prover;
pub mod rpc;
pub mod stealth;

pub use encryption::{EncryptedNoteData, decrypt_note, decrypt_note_with, encrypt_note, encrypt_note_for};
pub use error::{PrivacyError, Result};
pub use manager::{PrivacyManager, PrivacyStatus, ROOT_HISTORY_SIZE, ShieldProof};
pub use merkle::{
    DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH, MerkleProof, MerkleTree, RootHistory, TreeSnapshot,
    verify_merkle_proof,
};
pub use note::{Note, compute_commitment};
pub use nullifier::derive_nullifier;
pub use poseidon::PoseidonHasher;
pub use prover::{
    Groth16Proof, ProofPipeline, ProverCapability, ProverError, TransferPrivateInputs,
    TransferPublicInputs, build_circuit_inputs, verify_proof,
};
pub use rpc::RpcAnnouncementSource;
pub use stealth::{
    GeneratedStealthAddress, ScanError, ScanOptions, StealthAnnouncement, StealthKeypair,
    StealthKeys, StealthMetaAddress, StealthPayment, StealthScanner, derive_stealth_private_key,
    generate_stealth_address, generate_stealth_meta_address, verify_stealth_ownership,
};

pub use makora_config::PrivacyConfig;
