//! Notes flowing into the commitment tree: inclusion proofs, root staleness,
//! capacity and persistence across a restart.

use ark_bn254::Fr;

use makora_privacy::{
    MerkleTree, Note, PrivacyConfig, PrivacyError, PrivacyManager, TreeSnapshot,
    decrypt_note_with, encrypt_note_for, verify_merkle_proof,
};
use makora_privacy::stealth::StealthKeys;

fn note(amount: u64, r: u64) -> Note {
    Note::with_randomness(amount, Fr::from(1001u64), Fr::from(7u64), Fr::from(r))
}

#[test]
fn test_proof_goes_stale_after_insert() {
    let mut tree = MerkleTree::new(4).unwrap();
    for i in 0..4u64 {
        tree.insert(note(100 + i, i).commitment).unwrap();
    }

    let proof = tree.generate_proof(2).unwrap();
    assert!(tree.verify_proof(&proof));
    assert!(verify_merkle_proof(&proof));

    tree.insert(note(500, 99).commitment).unwrap();

    // the old proof is still internally consistent, just not for today's root
    assert!(verify_merkle_proof(&proof));
    assert_ne!(proof.root, tree.root());
    let mut against_current = proof.clone();
    against_current.root = tree.root();
    assert!(!verify_merkle_proof(&against_current));

    let fresh = tree.generate_proof(2).unwrap();
    assert_eq!(fresh.root, tree.root());
    assert!(tree.verify_proof(&fresh));
}

#[test]
fn test_small_tree_fills_up() {
    let mut tree = MerkleTree::new(3).unwrap();
    for i in 0..8u64 {
        assert_eq!(tree.insert(Fr::from(i + 1)).unwrap(), i);
    }
    let root = tree.root();

    let err = tree.insert(Fr::from(100u64)).unwrap_err();
    assert!(matches!(err, PrivacyError::TreeFull { capacity: 8 }));
    assert_eq!(err.to_string(), "Tree is full (capacity 8)");
    assert_eq!(tree.root(), root);
    assert_eq!(tree.leaf_count(), 8);
}

#[test]
fn test_snapshot_json_shape() {
    let mut tree = MerkleTree::new(4).unwrap();
    tree.insert(Fr::from(12u64)).unwrap();
    tree.insert(Fr::from(34u64)).unwrap();

    let json = serde_json::to_value(tree.export()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "leaves": [[0, "12"], [1, "34"]], "depth": 4 })
    );

    let shuffled: TreeSnapshot = serde_json::from_value(
        serde_json::json!({ "leaves": [[1, "34"], [0, "12"]], "depth": 4 }),
    )
    .unwrap();
    assert_eq!(MerkleTree::from_snapshot(&shuffled).unwrap().root(), tree.root());
}

#[test]
fn test_manager_restart_restores_tree() {
    let config = PrivacyConfig::enabled().with_tree_depth(6);
    let mut before = PrivacyManager::new(config.clone()).unwrap();

    let mut notes = Vec::new();
    for amount in [10u64, 20, 30, 40, 50] {
        let mut n = before
            .create_shielded_note(amount, &[3; 32], &[9; 32], None)
            .unwrap();
        before.insert_note_commitment(&mut n).unwrap();
        notes.push(n);
    }
    let persisted = serde_json::to_string(&before.export_tree_state().unwrap()).unwrap();
    let status = before.get_status();

    let mut after = PrivacyManager::new(config).unwrap();
    after
        .import_tree_state(&serde_json::from_str(&persisted).unwrap())
        .unwrap();

    assert_eq!(after.get_status(), status);
    for n in &notes {
        let index = n.leaf_index.unwrap();
        assert_eq!(
            after.generate_merkle_proof(index).unwrap(),
            before.generate_merkle_proof(index).unwrap()
        );
    }
}

#[test]
fn test_restart_keeps_recent_roots() {
    let config = PrivacyConfig::enabled().with_tree_depth(4);
    let mut before = PrivacyManager::new(config.clone()).unwrap();

    before.insert_commitment(Fr::from(1u64)).unwrap();
    let older = before.get_merkle_root().unwrap();
    before.insert_commitment(Fr::from(2u64)).unwrap();
    assert!(before.is_known_root(&older).unwrap());

    let persisted = serde_json::to_value(before.export_tree_state().unwrap()).unwrap();
    assert_eq!(persisted["roots"].as_array().unwrap().len(), 3);

    let mut after = PrivacyManager::new(config).unwrap();
    after
        .import_tree_state(&serde_json::from_value(persisted).unwrap())
        .unwrap();

    assert!(after.is_known_root(&older).unwrap());
    assert!(after.is_known_root(&before.get_merkle_root().unwrap()).unwrap());
    assert_eq!(after.get_status(), before.get_status());

    // snapshots written before roots were persisted still load
    let legacy: TreeSnapshot = serde_json::from_value(
        serde_json::json!({ "leaves": [[0, "1"], [1, "2"]], "depth": 4 }),
    )
    .unwrap();
    let mut from_legacy = PrivacyManager::new(PrivacyConfig::enabled().with_tree_depth(4)).unwrap();
    from_legacy.import_tree_state(&legacy).unwrap();
    assert_eq!(
        from_legacy.get_merkle_root().unwrap(),
        before.get_merkle_root().unwrap()
    );
    assert!(!from_legacy.is_known_root(&older).unwrap());
}

#[test]
fn test_note_travels_encrypted_to_recipient() {
    let recipient = StealthKeys::random();
    let mut manager = PrivacyManager::new(PrivacyConfig::enabled().with_tree_depth(4)).unwrap();

    let mut n = manager
        .create_shielded_note(777, &recipient.spending_pubkey(), &[5; 32], None)
        .unwrap();
    manager.insert_note_commitment(&mut n).unwrap();

    let sealed = encrypt_note_for(&n, &recipient.viewing_pubkey()).unwrap();
    let opened = decrypt_note_with(&sealed, recipient.viewing_secret()).unwrap();
    assert_eq!(opened, n);
    assert!(opened.verify_commitment());

    let proof = manager.generate_merkle_proof(opened.leaf_index.unwrap()).unwrap();
    assert_eq!(proof.leaf, opened.commitment);

    let stranger = StealthKeys::random();
    assert!(decrypt_note_with(&sealed, stranger.viewing_secret()).is_none());
}
