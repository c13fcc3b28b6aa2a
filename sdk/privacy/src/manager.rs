//! Privacy Manager
//!
//! One stateful entry point over stealth addresses, the commitment tree,
//! notes and the proof pipeline. Everything except [`PrivacyManager::is_enabled`]
//! and [`PrivacyManager::get_status`] fails with [`PrivacyError::Disabled`]
//! when privacy is switched off.
//!
//! The manager owns its tree. Tree mutations take `&mut self`, so there is one
//! writer per tree and readers see a stable root.

use ark_bn254::Fr;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use x25519_dalek::StaticSecret;

use makora_config::{MakoraConfig, PrivacyConfig};

use crate::error::{PrivacyError, Result};
use crate::field::{fr_from_decimal, fr_to_decimal};
use crate::merkle::{MerkleProof, MerkleTree, RootHistory, TreeSnapshot};
use crate::note::Note;
use crate::prover::{
    Groth16Proof, ProofPipeline, ProvingBackend, TransferPrivateInputs, TransferPublicInputs,
    public_signal_bytes,
};
use crate::stealth::{
    AnnouncementSource, GeneratedStealthAddress, ScanOptions, StealthAnnouncement, StealthKeypair,
    StealthKeys, StealthMetaAddress, StealthPayment, StealthScanner, derive_stealth_private_key,
    generate_stealth_address, generate_stealth_meta_address,
};

/// Number of recent roots remembered for `is_known_root`
pub const ROOT_HISTORY_SIZE: usize = 100;

/// Live view of the manager state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyStatus {
    pub enabled: bool,
    pub stealth_available: bool,
    /// True once the proving backend has loaded
    pub shielded_available: bool,
    pub note_count: u64,
    /// Decimal root of the live tree
    pub current_root: Option<String>,
    pub tree_depth: Option<usize>,
}

/// Proof ready for the on-chain verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldProof {
    pub proof: Groth16Proof,
    pub public_signals: Vec<String>,
    /// `public_signals` as 32-byte big-endian words
    pub public_inputs: Vec<[u8; 32]>,
}

impl ShieldProof {
    pub fn proof_bytes(&self) -> [u8; Groth16Proof::SIZE] {
        self.proof.to_bytes()
    }
}

pub struct PrivacyManager {
    config: PrivacyConfig,
    tree: Option<MerkleTree>,
    root_history: RootHistory,
    scanner: Option<StealthScanner>,
    pipeline: OnceLock<ProofPipeline>,
}

impl PrivacyManager {
    /// Build a manager. The tree exists from the start when enabled; the
    /// scanner and prover are set up on demand.
    pub fn new(config: PrivacyConfig) -> Result<Self> {
        let mut root_history = RootHistory::new(ROOT_HISTORY_SIZE);
        let tree = if config.enabled {
            let tree = MerkleTree::new(config.tree_depth)?;
            root_history.push(tree.root());
            Some(tree)
        } else {
            None
        };

        info!(
            "Privacy manager created (enabled: {}, tree depth: {})",
            config.enabled, config.tree_depth
        );

        Ok(Self {
            config,
            tree,
            root_history,
            scanner: None,
            pipeline: OnceLock::new(),
        })
    }

    /// Build from `MakoraConfig::load()` (config file plus `MK_*` overrides)
    pub fn from_env() -> Result<Self> {
        let config = MakoraConfig::load().map_err(|e| PrivacyError::Config(format!("{e:#}")))?;
        Self::new(config.privacy_config())
    }

    /// Use a specific proving backend instead of the configured snarkjs setup
    pub fn with_prover_backend(
        config: PrivacyConfig,
        backend: Arc<dyn ProvingBackend>,
    ) -> Result<Self> {
        let mut manager = Self::new(config)?;
        manager.pipeline = OnceLock::from(ProofPipeline::new(backend));
        Ok(manager)
    }

    pub fn config(&self) -> &PrivacyConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn get_status(&self) -> PrivacyStatus {
        PrivacyStatus {
            enabled: self.config.enabled,
            stealth_available: self.config.enabled,
            shielded_available: self.config.enabled
                && self.pipeline.get().is_some_and(ProofPipeline::is_ready),
            note_count: self.tree.as_ref().map_or(0, MerkleTree::leaf_count),
            current_root: self.tree.as_ref().map(|t| fr_to_decimal(&t.root())),
            tree_depth: self.tree.as_ref().map(MerkleTree::depth),
        }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(PrivacyError::Disabled)
        }
    }

    fn tree(&self) -> Result<&MerkleTree> {
        self.ensure_enabled()?;
        self.tree.as_ref().ok_or(PrivacyError::Disabled)
    }

    fn tree_mut(&mut self) -> Result<&mut MerkleTree> {
        self.ensure_enabled()?;
        self.tree.as_mut().ok_or(PrivacyError::Disabled)
    }

    // ---- stealth addresses ----

    pub fn generate_meta_address(&self, keys: &StealthKeys) -> Result<StealthMetaAddress> {
        self.ensure_enabled()?;
        Ok(generate_stealth_meta_address(
            keys.spending_key(),
            keys.viewing_secret(),
        ))
    }

    pub fn parse_meta_address(&self, encoded: &str) -> Result<StealthMetaAddress> {
        self.ensure_enabled()?;
        StealthMetaAddress::parse(encoded)
    }

    /// Fresh one-time address for a payment to `meta`
    pub fn derive_stealth_address(
        &self,
        meta: &StealthMetaAddress,
    ) -> Result<GeneratedStealthAddress> {
        self.ensure_enabled()?;
        generate_stealth_address(meta)
    }

    /// Spending keypair for an announcement addressed to `keys`
    pub fn recover_stealth_keypair(
        &self,
        keys: &StealthKeys,
        announcement: &StealthAnnouncement,
    ) -> Result<StealthKeypair> {
        self.ensure_enabled()?;
        let keypair = derive_stealth_private_key(
            keys.spending_key(),
            keys.viewing_secret(),
            &announcement.ephemeral_pubkey,
        )?;
        if keypair.public_key() != announcement.stealth_address {
            return Err(PrivacyError::InvalidKey(
                "announcement was not addressed to these keys".into(),
            ));
        }
        Ok(keypair)
    }

    // ---- scanning ----

    pub fn initialize_scanner(
        &mut self,
        source: Arc<dyn AnnouncementSource>,
        viewing: StaticSecret,
        spending_pubkey: [u8; 32],
    ) -> Result<()> {
        self.ensure_enabled()?;
        self.scanner = Some(StealthScanner::new(source, viewing, spending_pubkey));
        info!("Stealth scanner initialized");
        Ok(())
    }

    pub fn scanner(&self) -> Option<&StealthScanner> {
        self.scanner.as_ref()
    }

    pub async fn scan_payments(&mut self, options: ScanOptions) -> Result<Vec<StealthPayment>> {
        self.ensure_enabled()?;
        let scanner = self
            .scanner
            .as_mut()
            .ok_or(PrivacyError::ScannerNotInitialized)?;
        Ok(scanner.scan(options).await?)
    }

    pub async fn check_transaction(&self, signature: &str) -> Result<Vec<StealthPayment>> {
        self.ensure_enabled()?;
        let scanner = self
            .scanner
            .as_ref()
            .ok_or(PrivacyError::ScannerNotInitialized)?;
        Ok(scanner.check_transaction(signature).await?)
    }

    // ---- notes and the commitment tree ----

    /// New note; fresh randomness is drawn when `randomness` is None
    pub fn create_shielded_note(
        &self,
        amount: u64,
        owner_pubkey: &[u8; 32],
        token_mint: &[u8; 32],
        randomness: Option<Fr>,
    ) -> Result<Note> {
        self.ensure_enabled()?;
        Ok(Note::from_keys(amount, owner_pubkey, token_mint, randomness))
    }

    /// Append a note's commitment and record its position on the note
    pub fn insert_note_commitment(&mut self, note: &mut Note) -> Result<u64> {
        self.ensure_enabled()?;
        if !note.verify_commitment() {
            return Err(PrivacyError::InvalidNote(
                "commitment does not match note fields".into(),
            ));
        }
        if let Some(index) = note.leaf_index {
            return Err(PrivacyError::InvalidNote(format!(
                "note already inserted at leaf {index}"
            )));
        }

        let index = self.insert_commitment(note.commitment)?;
        note.leaf_index = Some(index);
        Ok(index)
    }

    /// Append a bare commitment, e.g. one observed on-chain
    pub fn insert_commitment(&mut self, commitment: Fr) -> Result<u64> {
        let tree = self.tree_mut()?;
        let index = tree.insert(commitment)?;
        let root = tree.root();
        self.root_history.push(root);
        Ok(index)
    }

    pub fn generate_merkle_proof(&self, leaf_index: u64) -> Result<MerkleProof> {
        self.tree()?.generate_proof(leaf_index)
    }

    pub fn get_merkle_root(&self) -> Result<Fr> {
        Ok(self.tree()?.root())
    }

    /// Whether `root` is the current root or one of the recent ones
    pub fn is_known_root(&self, root: &Fr) -> Result<bool> {
        self.ensure_enabled()?;
        Ok(self.root_history.contains(root))
    }

    // ---- proofs ----

    fn pipeline(&self) -> &ProofPipeline {
        self.pipeline
            .get_or_init(|| ProofPipeline::from_config(&self.config.prover))
    }

    /// Prove a 2-in / 2-out transfer
    pub fn generate_shield_proof(
        &self,
        public: &TransferPublicInputs,
        private: &TransferPrivateInputs,
    ) -> Result<ShieldProof> {
        self.ensure_enabled()?;
        if !self.root_history.contains(&public.merkle_root) {
            warn!("Proving against a root this manager has not seen");
        }

        let result = self.pipeline().generate_transfer_proof(public, private)?;
        let public_inputs = public_signal_bytes(&result.public_signals)?;

        Ok(ShieldProof {
            proof: result.proof,
            public_signals: result.public_signals,
            public_inputs,
        })
    }

    // ---- persistence ----

    /// Export the tree together with the recent root history
    pub fn export_tree_state(&self) -> Result<TreeSnapshot> {
        let mut snapshot = self.tree()?.export();
        snapshot.roots = self.root_history.iter().map(fr_to_decimal).collect();
        Ok(snapshot)
    }

    /// Replace the tree and root history with a snapshot.
    ///
    /// Snapshots without `roots` restart the history at the imported root.
    /// Nothing changes if any part of the snapshot is malformed.
    pub fn import_tree_state(&mut self, snapshot: &TreeSnapshot) -> Result<()> {
        let roots = snapshot
            .roots
            .iter()
            .map(|root| fr_from_decimal(root))
            .collect::<Result<Vec<Fr>>>()?;

        let tree = self.tree_mut()?;
        tree.import(snapshot)?;
        let root = tree.root();
        let leaves = tree.leaf_count();

        if roots.first().is_some_and(|latest| *latest != root) {
            warn!("Snapshot root history does not end at the imported root");
        }
        self.root_history.restore(roots);
        self.root_history.push(root);
        info!(
            "Imported tree state ({leaves} leaves, {} known roots)",
            self.root_history.len()
        );
        Ok(())
    }
}

impl fmt::Debug for PrivacyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivacyManager")
            .field("status", &self.get_status())
            .field("scanner", &self.scanner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prover::{CircuitInputs, ProverError, RawProof, UnavailableBackend};
    use crate::stealth::verify_stealth_ownership;

    fn enabled(depth: usize) -> PrivacyManager {
        PrivacyManager::new(PrivacyConfig::enabled().with_tree_depth(depth)).unwrap()
    }

    #[test]
    fn test_disabled_manager_refuses_everything() {
        let mut manager = PrivacyManager::new(PrivacyConfig::disabled()).unwrap();
        let keys = StealthKeys::random();
        let meta = keys.meta_address();

        assert!(!manager.is_enabled());
        assert!(matches!(
            manager.generate_meta_address(&keys),
            Err(PrivacyError::Disabled)
        ));
        assert!(matches!(
            manager.parse_meta_address(&meta.encode()),
            Err(PrivacyError::Disabled)
        ));
        assert!(matches!(
            manager.derive_stealth_address(&meta),
            Err(PrivacyError::Disabled)
        ));
        assert!(matches!(
            manager.create_shielded_note(1, &[1; 32], &[2; 32], None),
            Err(PrivacyError::Disabled)
        ));
        assert!(matches!(
            manager.insert_commitment(Fr::from(1u64)),
            Err(PrivacyError::Disabled)
        ));
        assert!(matches!(
            manager.generate_merkle_proof(0),
            Err(PrivacyError::Disabled)
        ));
        assert!(matches!(manager.get_merkle_root(), Err(PrivacyError::Disabled)));
        assert!(matches!(manager.export_tree_state(), Err(PrivacyError::Disabled)));

        let err = manager.get_merkle_root().unwrap_err();
        assert_eq!(err.to_string(), "Privacy features are disabled");
    }

    #[test]
    fn test_disabled_status() {
        let manager = PrivacyManager::new(PrivacyConfig::disabled()).unwrap();
        let status = manager.get_status();

        assert!(!status.enabled);
        assert!(!status.stealth_available);
        assert!(!status.shielded_available);
        assert_eq!(status.note_count, 0);
        assert_eq!(status.current_root, None);
    }

    #[test]
    fn test_invalid_depth_is_rejected() {
        assert!(matches!(
            PrivacyManager::new(PrivacyConfig::enabled().with_tree_depth(0)),
            Err(PrivacyError::InvalidTreeDepth(0))
        ));
    }

    #[test]
    fn test_status_tracks_tree() {
        let mut manager = enabled(4);
        let empty_root = manager.get_merkle_root().unwrap();

        let mut note = manager
            .create_shielded_note(100, &[1; 32], &[2; 32], None)
            .unwrap();
        let index = manager.insert_note_commitment(&mut note).unwrap();

        assert_eq!(index, 0);
        assert_eq!(note.leaf_index, Some(0));

        let status = manager.get_status();
        assert_eq!(status.note_count, 1);
        assert_eq!(status.tree_depth, Some(4));
        assert_eq!(
            status.current_root,
            Some(fr_to_decimal(&manager.get_merkle_root().unwrap()))
        );
        assert_ne!(manager.get_merkle_root().unwrap(), empty_root);
        assert!(!status.shielded_available);
    }

    #[test]
    fn test_insert_rejects_bad_notes() {
        let mut manager = enabled(4);

        let mut tampered = manager
            .create_shielded_note(100, &[1; 32], &[2; 32], Some(Fr::from(5u64)))
            .unwrap();
        tampered.amount = 1_000_000;
        assert!(matches!(
            manager.insert_note_commitment(&mut tampered),
            Err(PrivacyError::InvalidNote(_))
        ));

        let mut note = manager
            .create_shielded_note(100, &[1; 32], &[2; 32], Some(Fr::from(5u64)))
            .unwrap();
        manager.insert_note_commitment(&mut note).unwrap();
        assert!(manager.insert_note_commitment(&mut note).is_err());
        assert_eq!(manager.get_status().note_count, 1);
    }

    #[test]
    fn test_root_history() {
        let mut manager = enabled(4);
        let r0 = manager.get_merkle_root().unwrap();
        manager.insert_commitment(Fr::from(1u64)).unwrap();
        let r1 = manager.get_merkle_root().unwrap();

        assert!(manager.is_known_root(&r0).unwrap());
        assert!(manager.is_known_root(&r1).unwrap());
        assert!(!manager.is_known_root(&Fr::from(12345u64)).unwrap());
    }

    #[test]
    fn test_merkle_proof_through_manager() {
        let mut manager = enabled(4);
        for i in 0..3u64 {
            manager.insert_commitment(Fr::from(i + 10)).unwrap();
        }
        let proof = manager.generate_merkle_proof(1).unwrap();
        assert!(proof.verify());
        assert_eq!(proof.root, manager.get_merkle_root().unwrap());
        assert!(matches!(
            manager.generate_merkle_proof(7),
            Err(PrivacyError::LeafNotFound(7))
        ));
    }

    #[test]
    fn test_export_import_restores_state() {
        let mut manager = enabled(5);
        for i in 0..6u64 {
            manager.insert_commitment(Fr::from(i * 3 + 1)).unwrap();
        }
        let snapshot = manager.export_tree_state().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();

        let mut restored = enabled(5);
        restored
            .import_tree_state(&serde_json::from_str(&json).unwrap())
            .unwrap();

        assert_eq!(
            restored.get_merkle_root().unwrap(),
            manager.get_merkle_root().unwrap()
        );
        assert_eq!(restored.get_status(), manager.get_status());
        assert!(restored
            .is_known_root(&manager.get_merkle_root().unwrap())
            .unwrap());

        // appends continue where the exported tree stopped
        assert_eq!(restored.insert_commitment(Fr::from(99u64)).unwrap(), 6);
    }

    #[test]
    fn test_import_without_roots_starts_history_at_root() {
        let mut manager = enabled(4);
        let r0 = manager.get_merkle_root().unwrap();
        manager.insert_commitment(Fr::from(1u64)).unwrap();

        let mut snapshot = manager.export_tree_state().unwrap();
        assert_eq!(snapshot.roots.len(), 2);
        snapshot.roots.clear();

        let mut restored = enabled(4);
        restored.import_tree_state(&snapshot).unwrap();
        assert!(restored
            .is_known_root(&manager.get_merkle_root().unwrap())
            .unwrap());
        assert!(!restored.is_known_root(&r0).unwrap());
    }

    #[test]
    fn test_import_with_bad_root_changes_nothing() {
        let mut manager = enabled(4);
        manager.insert_commitment(Fr::from(1u64)).unwrap();
        let mut snapshot = manager.export_tree_state().unwrap();
        snapshot.roots.push("not-a-number".into());

        let mut restored = enabled(4);
        let before = restored.get_merkle_root().unwrap();
        assert!(restored.import_tree_state(&snapshot).is_err());
        assert_eq!(restored.get_merkle_root().unwrap(), before);
        assert_eq!(restored.get_status().note_count, 0);
    }

    #[test]
    fn test_stealth_round_trip_through_manager() {
        let manager = enabled(4);
        let keys = StealthKeys::random();

        let meta = manager.generate_meta_address(&keys).unwrap();
        let parsed = manager.parse_meta_address(&meta.encode()).unwrap();
        assert_eq!(parsed, meta);

        let stealth = manager.derive_stealth_address(&parsed).unwrap();
        assert!(verify_stealth_ownership(
            &stealth.address,
            &stealth.ephemeral_pubkey,
            keys.viewing_secret(),
            &keys.spending_pubkey(),
            Some(stealth.view_tag),
        ));

        let announcement = StealthAnnouncement::from(&stealth);
        let keypair = manager
            .recover_stealth_keypair(&keys, &announcement)
            .unwrap();
        assert_eq!(keypair.public_key(), stealth.address);

        let stranger = StealthKeys::random();
        assert!(manager
            .recover_stealth_keypair(&stranger, &announcement)
            .is_err());
    }

    #[tokio::test]
    async fn test_scan_requires_scanner() {
        let mut manager = enabled(4);
        assert!(matches!(
            manager.scan_payments(ScanOptions::default()).await,
            Err(PrivacyError::ScannerNotInitialized)
        ));
        assert!(matches!(
            manager.check_transaction("sig").await,
            Err(PrivacyError::ScannerNotInitialized)
        ));
    }

    #[test]
    fn test_unavailable_prover_surfaces_reason() {
        let manager = PrivacyManager::with_prover_backend(
            PrivacyConfig::enabled().with_tree_depth(4),
            Arc::new(UnavailableBackend::new("snarkjs missing; run `npm install -g snarkjs`")),
        )
        .unwrap();

        let public = TransferPublicInputs {
            merkle_root: manager.get_merkle_root().unwrap(),
            nullifier_1: Fr::from(1u64),
            nullifier_2: Fr::from(2u64),
            output_commitment_1: Fr::from(3u64),
            output_commitment_2: Fr::from(4u64),
            public_amount: Fr::from(0u64),
            token_mint: Fr::from(5u64),
        };
        let spend = crate::prover::SpendInput {
            amount: 0,
            owner_pubkey: Fr::from(0u64),
            randomness: Fr::from(0u64),
            path_indices: vec![0; 4],
            path_elements: vec![Fr::from(0u64); 4],
        };
        let out = crate::prover::OutputSpec {
            amount: 0,
            recipient: Fr::from(0u64),
            randomness: Fr::from(0u64),
        };
        let private = TransferPrivateInputs {
            input_notes: [spend.clone(), spend],
            output_notes: [out.clone(), out],
            spending_key: Fr::from(9u64),
        };

        match manager.generate_shield_proof(&public, &private) {
            Err(PrivacyError::Prover(ProverError::BackendUnavailable(reason))) => {
                assert!(reason.contains("npm install -g snarkjs"));
            }
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
        assert!(!manager.get_status().shielded_available);
    }

    struct CannedBackend;

    impl ProvingBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        fn load(&self) -> std::result::Result<(), ProverError> {
            Ok(())
        }

        fn prove(&self, inputs: &CircuitInputs) -> std::result::Result<RawProof, ProverError> {
            Ok(RawProof {
                proof: Groth16Proof::from_bytes(&[0u8; Groth16Proof::SIZE])?.to_snarkjs(),
                public_signals: vec![inputs.merkle_root.clone(), inputs.public_amount.clone()],
            })
        }
    }

    #[test]
    fn test_shield_proof_marks_shielded_available() {
        let manager = PrivacyManager::with_prover_backend(
            PrivacyConfig::enabled().with_tree_depth(4),
            Arc::new(CannedBackend),
        )
        .unwrap();
        assert!(!manager.get_status().shielded_available);

        let root = manager.get_merkle_root().unwrap();
        let public = TransferPublicInputs {
            merkle_root: root,
            nullifier_1: Fr::from(1u64),
            nullifier_2: Fr::from(2u64),
            output_commitment_1: Fr::from(3u64),
            output_commitment_2: Fr::from(4u64),
            public_amount: Fr::from(250u64),
            token_mint: Fr::from(5u64),
        };
        let spend = crate::prover::SpendInput {
            amount: 0,
            owner_pubkey: Fr::from(0u64),
            randomness: Fr::from(0u64),
            path_indices: vec![0; 4],
            path_elements: vec![Fr::from(0u64); 4],
        };
        let out = crate::prover::OutputSpec {
            amount: 0,
            recipient: Fr::from(0u64),
            randomness: Fr::from(0u64),
        };
        let private = TransferPrivateInputs {
            input_notes: [spend.clone(), spend],
            output_notes: [out.clone(), out],
            spending_key: Fr::from(9u64),
        };

        let proof = manager.generate_shield_proof(&public, &private).unwrap();
        assert_eq!(proof.public_signals, vec![fr_to_decimal(&root), "250".to_string()]);
        assert_eq!(proof.public_inputs[1][31], 250);
        assert_eq!(proof.proof_bytes().len(), Groth16Proof::SIZE);
        assert!(manager.get_status().shielded_available);
    }
}
