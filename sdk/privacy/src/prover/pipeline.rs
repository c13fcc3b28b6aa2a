//! Proof pipeline
//!
//! ```text
//! Uninitialized ──ensure_initialized──> Initializing ──load ok──> Ready
//!       ^                                    │
//!       └──────────── load failed ───────────┘
//! ```
//!
//! Loading runs under a mutex, so concurrent first calls wait for one load
//! instead of each loading the artifacts. A failed load is retried by the
//! next call.

use log::{info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use makora_config::ProverConfig;

use super::ProverError;
use super::backend::{ProverCapability, ProvingBackend};
use super::inputs::{CircuitInputs, TransferPrivateInputs, TransferPublicInputs, build_circuit_inputs};
use super::proof::Groth16Proof;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            2 => Self::Ready,
            1 => Self::Initializing,
            _ => Self::Uninitialized,
        }
    }
}

/// A proof in on-chain encoding plus its public signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofResult {
    pub proof: Groth16Proof,
    pub public_signals: Vec<String>,
}

pub struct ProofPipeline {
    backend: Arc<dyn ProvingBackend>,
    state: AtomicU8,
    init_lock: Mutex<()>,
}

impl ProofPipeline {
    pub fn new(backend: Arc<dyn ProvingBackend>) -> Self {
        Self {
            backend,
            state: AtomicU8::new(PipelineState::Uninitialized as u8),
            init_lock: Mutex::new(()),
        }
    }

    pub fn from_capability(capability: &ProverCapability) -> Self {
        Self::new(capability.backend())
    }

    pub fn from_config(config: &ProverConfig) -> Self {
        Self::from_capability(&ProverCapability::detect(config))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == PipelineState::Ready
    }

    /// Load the backend once. No-op when already ready.
    pub fn ensure_initialized(&self) -> Result<(), ProverError> {
        if self.is_ready() {
            return Ok(());
        }

        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // another caller may have finished while we waited
        if self.is_ready() {
            return Ok(());
        }

        self.state
            .store(PipelineState::Initializing as u8, Ordering::Release);

        match self.backend.load() {
            Ok(()) => {
                self.state.store(PipelineState::Ready as u8, Ordering::Release);
                info!("Proof pipeline ready ({} backend)", self.backend.name());
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(PipelineState::Uninitialized as u8, Ordering::Release);
                warn!("Proving backend failed to load: {e}");
                Err(e)
            }
        }
    }

    /// Prove already-built circuit inputs
    pub fn generate_proof(&self, inputs: &CircuitInputs) -> Result<ProofResult, ProverError> {
        self.ensure_initialized()?;

        let raw = self.backend.prove(inputs)?;
        let proof = Groth16Proof::from_snarkjs(&raw.proof)?;

        Ok(ProofResult {
            proof,
            public_signals: raw.public_signals,
        })
    }

    pub fn generate_transfer_proof(
        &self,
        public: &TransferPublicInputs,
        private: &TransferPrivateInputs,
    ) -> Result<ProofResult, ProverError> {
        self.generate_proof(&build_circuit_inputs(public, private))
    }
}

impl std::fmt::Debug for ProofPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofPipeline")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .finish()
    }
}
