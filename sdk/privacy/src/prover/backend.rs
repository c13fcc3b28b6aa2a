//! Proving backends
//!
//! Wraps the snarkjs CLI (`groth16 fullprove`) to compute the witness and the
//! proof from circuit inputs in one step.

use log::{debug, error, info};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use makora_config::ProverConfig;

use super::ProverError;
use super::inputs::CircuitInputs;
use super::proof::{RawProof, SnarkjsProof};

/// Something that turns circuit inputs into a Groth16 proof
pub trait ProvingBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Check or load circuit artifacts. Called once before the first proof.
    fn load(&self) -> Result<(), ProverError>;

    fn prove(&self, inputs: &CircuitInputs) -> Result<RawProof, ProverError>;
}

/// Check that the snarkjs binary can be spawned
fn probe_snarkjs(bin: &str) -> Result<(), ProverError> {
    Command::new(bin)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|_| ())
        .map_err(|e| {
            ProverError::BackendUnavailable(format!(
                "cannot run `{bin}` ({e}); install it with `npm install -g snarkjs` or set MK_SNARKJS_BIN"
            ))
        })
}

fn require_artifact(path: &Path) -> Result<(), ProverError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProverError::ArtifactNotFound(path.to_path_buf()))
    }
}

/// snarkjs subprocess backend
#[derive(Debug, Clone)]
pub struct SnarkjsBackend {
    snarkjs_bin: String,
    wasm_path: PathBuf,
    zkey_path: PathBuf,
}

impl SnarkjsBackend {
    pub fn new(
        snarkjs_bin: impl Into<String>,
        wasm_path: impl Into<PathBuf>,
        zkey_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            snarkjs_bin: snarkjs_bin.into(),
            wasm_path: wasm_path.into(),
            zkey_path: zkey_path.into(),
        }
    }

    pub fn from_config(config: &ProverConfig) -> Self {
        Self::new(
            config.snarkjs_bin.clone(),
            config.wasm_path.clone(),
            config.zkey_path.clone(),
        )
    }
}

impl ProvingBackend for SnarkjsBackend {
    fn name(&self) -> &str {
        "snarkjs"
    }

    fn load(&self) -> Result<(), ProverError> {
        require_artifact(&self.wasm_path)?;
        require_artifact(&self.zkey_path)?;
        probe_snarkjs(&self.snarkjs_bin)?;
        info!(
            "snarkjs backend ready (wasm: {}, zkey: {})",
            self.wasm_path.display(),
            self.zkey_path.display()
        );
        Ok(())
    }

    fn prove(&self, inputs: &CircuitInputs) -> Result<RawProof, ProverError> {
        let workdir = tempfile::tempdir()?;
        let input_path = workdir.path().join("input.json");
        let proof_path = workdir.path().join("proof.json");
        let public_path = workdir.path().join("public.json");

        let input_json = serde_json::to_vec(inputs)
            .map_err(|e| ProverError::Serialization(e.to_string()))?;
        std::fs::write(&input_path, input_json)?;

        debug!("Running snarkjs groth16 fullprove in {}", workdir.path().display());
        let output = Command::new(&self.snarkjs_bin)
            .arg("groth16")
            .arg("fullprove")
            .arg(&input_path)
            .arg(&self.wasm_path)
            .arg(&self.zkey_path)
            .arg(&proof_path)
            .arg(&public_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ProverError::BackendUnavailable(format!("cannot run snarkjs: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("snarkjs failed: {}", stderr);
            return Err(ProverError::ProofGenerationFailed(stderr.to_string()));
        }

        let proof: SnarkjsProof = serde_json::from_slice(&std::fs::read(&proof_path)?)
            .map_err(|e| ProverError::Serialization(format!("proof.json: {e}")))?;
        let public_signals: Vec<String> = serde_json::from_slice(&std::fs::read(&public_path)?)
            .map_err(|e| ProverError::Serialization(format!("public.json: {e}")))?;

        Ok(RawProof {
            proof,
            public_signals,
        })
    }
}

/// Placeholder for a backend that could not be set up. Every call fails
/// with the reason and how to fix it.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl ProvingBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn load(&self) -> Result<(), ProverError> {
        Err(ProverError::BackendUnavailable(self.reason.clone()))
    }

    fn prove(&self, _inputs: &CircuitInputs) -> Result<RawProof, ProverError> {
        Err(ProverError::BackendUnavailable(self.reason.clone()))
    }
}

/// Whether proving is possible in this process, decided once at startup
#[derive(Clone)]
pub enum ProverCapability {
    Available(Arc<dyn ProvingBackend>),
    Unavailable(UnavailableBackend),
}

impl ProverCapability {
    /// Probe the configured snarkjs setup
    pub fn detect(config: &ProverConfig) -> Self {
        let backend = SnarkjsBackend::from_config(config);
        let probe = require_artifact(&backend.wasm_path)
            .and_then(|_| require_artifact(&backend.zkey_path))
            .and_then(|_| probe_snarkjs(&backend.snarkjs_bin));

        match probe {
            Ok(()) => Self::Available(Arc::new(backend)),
            Err(e) => {
                let reason = match e {
                    ProverError::ArtifactNotFound(path) => format!(
                        "circuit artifact {} is missing; build the transfer circuit or set MK_CIRCUIT_WASM / MK_CIRCUIT_ZKEY",
                        path.display()
                    ),
                    other => other.to_string(),
                };
                info!("Proving disabled: {reason}");
                Self::Unavailable(UnavailableBackend::new(reason))
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn backend(&self) -> Arc<dyn ProvingBackend> {
        match self {
            Self::Available(backend) => Arc::clone(backend),
            Self::Unavailable(unavailable) => Arc::new(unavailable.clone()),
        }
    }
}

impl fmt::Debug for ProverCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(backend) => f.debug_tuple("Available").field(&backend.name()).finish(),
            Self::Unavailable(u) => f.debug_tuple("Unavailable").field(&u.reason).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_config() -> ProverConfig {
        ProverConfig {
            snarkjs_bin: "snarkjs".into(),
            wasm_path: PathBuf::from("/nonexistent/transfer.wasm"),
            zkey_path: PathBuf::from("/nonexistent/transfer.zkey"),
            vkey_path: PathBuf::from("/nonexistent/verification_key.json"),
        }
    }

    #[test]
    fn test_detect_missing_artifacts() {
        let capability = ProverCapability::detect(&missing_config());
        assert!(!capability.is_available());

        let err = capability.backend().load().unwrap_err();
        match err {
            ProverError::BackendUnavailable(reason) => {
                assert!(reason.contains("transfer.wasm"));
                assert!(reason.contains("MK_CIRCUIT_WASM"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_snarkjs_backend_load_requires_artifacts() {
        let backend = SnarkjsBackend::from_config(&missing_config());
        assert!(matches!(
            backend.load(),
            Err(ProverError::ArtifactNotFound(p)) if p.ends_with("transfer.wasm")
        ));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let wasm = dir.path().join("transfer.wasm");
        let zkey = dir.path().join("transfer.zkey");
        std::fs::write(&wasm, b"wasm").unwrap();
        std::fs::write(&zkey, b"zkey").unwrap();

        let backend = SnarkjsBackend::new("/nonexistent/bin/snarkjs", &wasm, &zkey);
        let err = backend.load().unwrap_err();
        assert!(matches!(err, ProverError::BackendUnavailable(ref m) if m.contains("npm install -g snarkjs")));
    }

    #[test]
    fn test_unavailable_backend_never_proves() {
        let backend = UnavailableBackend::new("no prover here");
        assert_eq!(backend.reason(), "no prover here");
        assert!(backend.load().is_err());
        assert_eq!(backend.name(), "unavailable");
    }
}
