//! Error types for the privacy layer.
//!
//! Precondition failures (misuse by the caller) are errors. Verification
//! outcomes over untrusted input are plain `bool`/`Option` values and never
//! show up here.

use thiserror::Error;

use crate::prover::ProverError;
use crate::stealth::ScanError;

#[derive(Error, Debug)]
pub enum PrivacyError {
    #[error("Privacy features are disabled")]
    Disabled,

    #[error("Stealth scanner not initialized")]
    ScannerNotInitialized,

    #[error("Tree is full (capacity {capacity})")]
    TreeFull { capacity: u64 },

    #[error("Leaf not found: {0}")]
    LeafNotFound(u64),

    #[error("Leaf index {index} out of range for tree of depth {depth}")]
    LeafIndexOutOfRange { index: u64, depth: usize },

    #[error("Invalid tree depth: {0} (must be between 1 and 32)")]
    InvalidTreeDepth(usize),

    #[error("Invalid meta-address: {0}")]
    InvalidMetaAddress(String),

    #[error("Invalid announcement length: expected 65 bytes, got {0}")]
    InvalidAnnouncementLength(usize),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid field element length: expected 32 bytes, got {0}")]
    InvalidFieldLength(usize),

    #[error("Invalid field element: {0}")]
    InvalidFieldElement(String),

    #[error("Invalid note: {0}")]
    InvalidNote(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub type Result<T> = std::result::Result<T, PrivacyError>;
