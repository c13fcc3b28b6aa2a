//! Zero-Knowledge Proof Pipeline
//!
//! ```text
//! TransferPublicInputs ─┐
//!                       ├─ build_circuit_inputs ─> CircuitInputs (signal name -> decimal)
//! TransferPrivateInputs ┘                               │
//!                                                       ▼
//!                                   ProofPipeline ─> ProvingBackend::prove
//!                                                       │
//!                                                       ▼
//!                               RawProof (snarkjs proof.json + public signals)
//!                                                       │
//!                                                       ▼
//!                        Groth16Proof { pi_a: 64B, pi_b: 128B, pi_c: 64B }
//! ```
//!
//! The signal names in [`CircuitInputs`] are the contract with the transfer
//! circuit. Renaming a field here produces a wrong witness, not an error.

mod backend;
mod inputs;
mod pipeline;
mod proof;

pub use backend::{ProverCapability, ProvingBackend, SnarkjsBackend, UnavailableBackend};
pub use inputs::{
    CircuitInputs, OutputSpec, SpendInput, TransferPrivateInputs, TransferPublicInputs,
    build_circuit_inputs,
};
pub use pipeline::{PipelineState, ProofPipeline, ProofResult};
pub use proof::{
    Groth16Proof, RawProof, SnarkjsProof, public_signal_bytes, verify_proof,
    verifying_key_to_snarkjs,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProverError {
    #[error("Proving backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Circuit artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Invalid circuit inputs: {0}")]
    InvalidInputs(String),

    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
