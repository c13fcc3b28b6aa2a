//! Note Encryption
//!
//! Encrypts note data for the recipient with ChaCha20-Poly1305.
//!
//! ```text
//! Flow:
//! 1. Sender draws a fresh ephemeral value e (32 bytes) and nonce (12 bytes)
//! 2. Encryption key = blake3::derive_key("makora-note-v1", shared_secret || e)
//! 3. Ciphertext = ChaCha20-Poly1305(key, nonce, plaintext, aad = commitment)
//! 4. Output = (ciphertext, e, commitment, nonce)
//! ```
//!
//! The commitment stays public and is authenticated as associated data, so a
//! wrong shared secret or a swapped commitment fails the tag check instead of
//! producing a garbage note. The decrypted fields are additionally re-hashed
//! and must reproduce the commitment.
//!
//! With [`encrypt_note_for`] the ephemeral value is an X25519 public key and
//! the shared secret comes from ECDH against the recipient's viewing key.

use ark_bn254::Fr;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{PrivacyError, Result};
use crate::field::{fr_from_bytes_be, fr_to_bytes_be, serde_decimal};
use crate::note::Note;

const NOTE_KEY_CONTEXT: &str = "makora-note-v1";

/// amount + owner + randomness + mint + leaf index flag + leaf index
const PLAINTEXT_LEN: usize = 8 + 32 + 32 + 32 + 1 + 8;

/// An encrypted note, published next to its commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNoteData {
    /// Encrypted note fields with authentication tag
    pub ciphertext: Vec<u8>,
    /// Per-message ephemeral value mixed into the key
    pub ephemeral_pubkey: [u8; 32],
    #[serde(with = "serde_decimal")]
    pub commitment: Fr,
    pub nonce: [u8; 12],
}

impl EncryptedNoteData {
    /// Fixed overhead on top of the plaintext (epk + nonce + tag)
    pub const OVERHEAD: usize = 32 + 12 + 16;
}

/// Encrypt a note under an already agreed 32-byte shared secret
pub fn encrypt_note(note: &Note, shared_secret: &[u8; 32]) -> Result<EncryptedNoteData> {
    let mut ephemeral = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut ephemeral);
    seal(note, shared_secret, ephemeral)
}

/// Encrypt a note for a recipient's X25519 viewing public key
pub fn encrypt_note_for(note: &Note, recipient_pk: &[u8; 32]) -> Result<EncryptedNoteData> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(&PublicKey::from(*recipient_pk));
    if !shared_secret.was_contributory() {
        return Err(PrivacyError::InvalidKey(
            "recipient key is a low-order point".into(),
        ));
    }

    seal(note, shared_secret.as_bytes(), *ephemeral_pk.as_bytes())
}

/// Decrypt a note with the shared secret used to encrypt it.
///
/// Returns `None` if authentication fails, the plaintext is malformed, or the
/// recovered fields do not hash to the published commitment.
pub fn decrypt_note(encrypted: &EncryptedNoteData, shared_secret: &[u8; 32]) -> Option<Note> {
    let key = derive_note_key(shared_secret, &encrypted.ephemeral_pubkey);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let aad = fr_to_bytes_be(&encrypted.commitment);

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&encrypted.nonce),
            Payload {
                msg: &encrypted.ciphertext,
                aad: &aad,
            },
        )
        .ok()?;

    let note = deserialize_plaintext(&plaintext)?;
    if note.commitment != encrypted.commitment {
        return None;
    }
    Some(note)
}

/// Decrypt a note addressed to `viewing_secret` by [`encrypt_note_for`]
pub fn decrypt_note_with(encrypted: &EncryptedNoteData, viewing_secret: &StaticSecret) -> Option<Note> {
    let shared_secret = viewing_secret.diffie_hellman(&PublicKey::from(encrypted.ephemeral_pubkey));
    if !shared_secret.was_contributory() {
        return None;
    }
    decrypt_note(encrypted, shared_secret.as_bytes())
}

fn seal(note: &Note, shared_secret: &[u8; 32], ephemeral: [u8; 32]) -> Result<EncryptedNoteData> {
    let key = derive_note_key(shared_secret, &ephemeral);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let aad = note.commitment_bytes();
    let plaintext = serialize_plaintext(note);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| PrivacyError::Serialization("note encryption failed".into()))?;

    Ok(EncryptedNoteData {
        ciphertext,
        ephemeral_pubkey: ephemeral,
        commitment: note.commitment,
        nonce,
    })
}

/// Derive encryption key from shared secret
fn derive_note_key(shared_secret: &[u8], ephemeral: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(NOTE_KEY_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral);
    *hasher.finalize().as_bytes()
}

fn serialize_plaintext(note: &Note) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(PLAINTEXT_LEN);
    bytes.extend_from_slice(&note.amount.to_be_bytes());
    bytes.extend_from_slice(&fr_to_bytes_be(&note.owner_pubkey));
    bytes.extend_from_slice(&fr_to_bytes_be(&note.randomness));
    bytes.extend_from_slice(&fr_to_bytes_be(&note.token_mint));
    match note.leaf_index {
        Some(index) => {
            bytes.push(1);
            bytes.extend_from_slice(&index.to_be_bytes());
        }
        None => {
            bytes.push(0);
            bytes.extend_from_slice(&[0u8; 8]);
        }
    }
    bytes
}

fn deserialize_plaintext(bytes: &[u8]) -> Option<Note> {
    if bytes.len() != PLAINTEXT_LEN {
        return None;
    }

    let amount = u64::from_be_bytes(bytes[0..8].try_into().ok()?);
    let owner_pubkey = fr_from_bytes_be(&bytes[8..40]).ok()?;
    let randomness = fr_from_bytes_be(&bytes[40..72]).ok()?;
    let token_mint = fr_from_bytes_be(&bytes[72..104]).ok()?;
    let leaf_index = match bytes[104] {
        0 => None,
        1 => Some(u64::from_be_bytes(bytes[105..113].try_into().ok()?)),
        _ => return None,
    };

    let mut note = Note::with_randomness(amount, owner_pubkey, token_mint, randomness);
    note.leaf_index = leaf_index;
    Some(note)
}
