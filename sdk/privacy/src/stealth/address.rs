use curve25519_dalek::{EdwardsPoint, Scalar, edwards::CompressedEdwardsY};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};

use super::keys::{StealthKeypair, StealthMetaAddress, spending_scalar};
use crate::error::{PrivacyError, Result};

const STEALTH_DOMAIN: &[u8] = b"makora-stealth-v1";

/// Sender-side result of deriving a one-time address
#[derive(Clone)]
pub struct GeneratedStealthAddress {
    /// One-time Ed25519 public key to pay to
    pub address: [u8; 32],
    pub ephemeral_pubkey: [u8; 32],
    pub view_tag: u8,
    /// Single-use; never reuse for a second payment
    pub ephemeral_secret: StaticSecret,
}

impl GeneratedStealthAddress {
    pub fn address_base58(&self) -> String {
        bs58::encode(self.address).into_string()
    }
}

impl fmt::Debug for GeneratedStealthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedStealthAddress")
            .field("address", &self.address_base58())
            .field("ephemeral_pubkey", &hex::encode(self.ephemeral_pubkey))
            .field("view_tag", &self.view_tag)
            .finish_non_exhaustive()
    }
}

/// SHA-512 of the shared secret under the stealth domain.
/// `h[0]` is the view tag, the full digest reduces to the blinding scalar.
fn hash_shared_secret(shared: &[u8; 32]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(STEALTH_DOMAIN);
    hasher.update(shared);
    let mut h = [0u8; 64];
    h.copy_from_slice(&hasher.finalize());
    h
}

fn blinding_scalar(h: &[u8; 64]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(h)
}

/// ECDH that refuses low-order inputs
fn shared_secret(secret: &StaticSecret, public: &[u8; 32]) -> Option<[u8; 32]> {
    let shared = secret.diffie_hellman(&PublicKey::from(*public));
    shared.was_contributory().then(|| shared.to_bytes())
}

/// `P = B + k·G`, or None if `B` is not a usable curve point
fn blind_public_key(spending_pubkey: &[u8; 32], h: &[u8; 64]) -> Option<[u8; 32]> {
    let spend_point = CompressedEdwardsY(*spending_pubkey).decompress()?;
    if spend_point.is_small_order() {
        return None;
    }
    let stealth = spend_point + EdwardsPoint::mul_base(&blinding_scalar(h));
    Some(stealth.compress().to_bytes())
}

/// Derive a fresh one-time address for a recipient
pub fn generate_stealth_address(meta: &StealthMetaAddress) -> Result<GeneratedStealthAddress> {
    generate_stealth_address_with_ephemeral(meta, StaticSecret::random_from_rng(OsRng))
}

/// Same as [`generate_stealth_address`] with a caller-supplied ephemeral key
pub fn generate_stealth_address_with_ephemeral(
    meta: &StealthMetaAddress,
    ephemeral_secret: StaticSecret,
) -> Result<GeneratedStealthAddress> {
    let shared = shared_secret(&ephemeral_secret, &meta.viewing_pubkey)
        .ok_or_else(|| PrivacyError::InvalidKey("viewing key is a low-order point".into()))?;
    let h = hash_shared_secret(&shared);

    let address = blind_public_key(&meta.spending_pubkey, &h).ok_or_else(|| {
        PrivacyError::InvalidKey("spending key is not a valid Ed25519 point".into())
    })?;

    Ok(GeneratedStealthAddress {
        address,
        ephemeral_pubkey: PublicKey::from(&ephemeral_secret).to_bytes(),
        view_tag: h[0],
        ephemeral_secret,
    })
}

/// Recipient side: rebuild the keypair controlling the stealth address
/// announced with `ephemeral_pubkey`
pub fn derive_stealth_private_key(
    spending: &SigningKey,
    viewing: &StaticSecret,
    ephemeral_pubkey: &[u8; 32],
) -> Result<StealthKeypair> {
    let shared = shared_secret(viewing, ephemeral_pubkey)
        .ok_or_else(|| PrivacyError::InvalidKey("ephemeral key is a low-order point".into()))?;
    let h = hash_shared_secret(&shared);

    let p = spending_scalar(spending) + blinding_scalar(&h);
    Ok(StealthKeypair::from_scalar(p))
}

/// Check whether an announced address belongs to the holder of `viewing`.
///
/// A supplied `view_tag` that does not match short-circuits before any curve
/// arithmetic. Never errors; malformed input is simply not ours.
pub fn verify_stealth_ownership(
    stealth_address: &[u8; 32],
    ephemeral_pubkey: &[u8; 32],
    viewing: &StaticSecret,
    spending_pubkey: &[u8; 32],
    view_tag: Option<u8>,
) -> bool {
    let Some(shared) = shared_secret(viewing, ephemeral_pubkey) else {
        return false;
    };
    let h = hash_shared_secret(&shared);

    if let Some(tag) = view_tag {
        if tag != h[0] {
            return false;
        }
    }

    blind_public_key(spending_pubkey, &h).is_some_and(|expected| &expected == stealth_address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stealth::StealthKeys;
    use ed25519_dalek::Verifier;
    use proptest::prelude::*;

    #[test]
    fn test_derived_key_matches_address() {
        let recipient = StealthKeys::random();
        let generated = generate_stealth_address(&recipient.meta_address()).unwrap();

        let keypair = derive_stealth_private_key(
            recipient.spending_key(),
            recipient.viewing_secret(),
            &generated.ephemeral_pubkey,
        )
        .unwrap();

        assert_eq!(keypair.public_key(), generated.address);
    }

    #[test]
    fn test_recovered_key_signs_for_stealth_address() {
        let recipient = StealthKeys::random();
        let generated = generate_stealth_address(&recipient.meta_address()).unwrap();
        let keypair = derive_stealth_private_key(
            recipient.spending_key(),
            recipient.viewing_secret(),
            &generated.ephemeral_pubkey,
        )
        .unwrap();

        let message = b"claim stealth payment";
        let signature = keypair.sign(message).unwrap();
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&generated.address).unwrap();
        assert!(verifying_key.verify(message, &signature).is_ok());
        assert!(verifying_key.verify(b"something else", &signature).is_err());
    }

    #[test]
    fn test_addresses_are_unlinkable() {
        let recipient = StealthKeys::random();
        let meta = recipient.meta_address();
        let a = generate_stealth_address(&meta).unwrap();
        let b = generate_stealth_address(&meta).unwrap();
        assert_ne!(a.address, b.address);
        assert_ne!(a.address, meta.spending_pubkey);
    }

    #[test]
    fn test_ownership_detects_substituted_keys() {
        let recipient = StealthKeys::random();
        let stranger = StealthKeys::random();
        let g = generate_stealth_address(&recipient.meta_address()).unwrap();

        assert!(verify_stealth_ownership(
            &g.address,
            &g.ephemeral_pubkey,
            recipient.viewing_secret(),
            &recipient.spending_pubkey(),
            Some(g.view_tag),
        ));
        assert!(verify_stealth_ownership(
            &g.address,
            &g.ephemeral_pubkey,
            recipient.viewing_secret(),
            &recipient.spending_pubkey(),
            None,
        ));

        // wrong viewing key
        assert!(!verify_stealth_ownership(
            &g.address,
            &g.ephemeral_pubkey,
            stranger.viewing_secret(),
            &recipient.spending_pubkey(),
            None,
        ));
        // wrong spending key
        assert!(!verify_stealth_ownership(
            &g.address,
            &g.ephemeral_pubkey,
            recipient.viewing_secret(),
            &stranger.spending_pubkey(),
            None,
        ));
        // unrelated ephemeral key
        let other = generate_stealth_address(&recipient.meta_address()).unwrap();
        assert!(!verify_stealth_ownership(
            &g.address,
            &other.ephemeral_pubkey,
            recipient.viewing_secret(),
            &recipient.spending_pubkey(),
            None,
        ));
        // wrong view tag
        assert!(!verify_stealth_ownership(
            &g.address,
            &g.ephemeral_pubkey,
            recipient.viewing_secret(),
            &recipient.spending_pubkey(),
            Some(g.view_tag.wrapping_add(1)),
        ));
    }

    #[test]
    fn test_low_order_keys_rejected() {
        let recipient = StealthKeys::random();

        let bad_view = StealthMetaAddress::new(recipient.spending_pubkey(), [0u8; 32]);
        assert!(matches!(
            generate_stealth_address(&bad_view),
            Err(PrivacyError::InvalidKey(_))
        ));

        assert!(
            derive_stealth_private_key(
                recipient.spending_key(),
                recipient.viewing_secret(),
                &[0u8; 32]
            )
            .is_err()
        );

        assert!(!verify_stealth_ownership(
            &[1u8; 32],
            &[0u8; 32],
            recipient.viewing_secret(),
            &recipient.spending_pubkey(),
            None,
        ));
    }

    #[test]
    fn test_identity_spending_key_rejected() {
        let recipient = StealthKeys::random();
        // compressed identity point
        let mut identity = [0u8; 32];
        identity[0] = 1;
        let meta = StealthMetaAddress::new(identity, recipient.viewing_pubkey());
        assert!(matches!(
            generate_stealth_address(&meta),
            Err(PrivacyError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_view_tag_false_positive_rate() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let recipient = StealthKeys::from_bytes([11; 32], [12; 32]);
        let stranger = StealthKeys::from_bytes([21; 32], [22; 32]);
        let meta = stranger.meta_address();
        let mut rng = StdRng::seed_from_u64(0x7a6);

        let trials = 4096;
        let mut tag_hits = 0;
        for _ in 0..trials {
            let ephemeral = StaticSecret::from(rng.r#gen::<[u8; 32]>());
            let g = generate_stealth_address_with_ephemeral(&meta, ephemeral).unwrap();
            let shared = shared_secret(recipient.viewing_secret(), &g.ephemeral_pubkey).unwrap();
            if hash_shared_secret(&shared)[0] == g.view_tag {
                tag_hits += 1;
                // the tag alone never makes it ours
                assert!(!verify_stealth_ownership(
                    &g.address,
                    &g.ephemeral_pubkey,
                    recipient.viewing_secret(),
                    &recipient.spending_pubkey(),
                    Some(g.view_tag),
                ));
            }
        }
        // expected 16 of 4096 (1 in 256)
        assert!(
            (4..=40).contains(&tag_hits),
            "view tag matched {tag_hits} of {trials}"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_stealth_roundtrip(
            spend in any::<[u8; 32]>(),
            view in any::<[u8; 32]>(),
            ephemeral in any::<[u8; 32]>(),
        ) {
            let recipient = StealthKeys::from_bytes(spend, view);
            let g = generate_stealth_address_with_ephemeral(
                &recipient.meta_address(),
                StaticSecret::from(ephemeral),
            ).unwrap();

            let keypair = derive_stealth_private_key(
                recipient.spending_key(),
                recipient.viewing_secret(),
                &g.ephemeral_pubkey,
            ).unwrap();

            prop_assert_eq!(keypair.public_key(), g.address);
            prop_assert!(verify_stealth_ownership(
                &g.address,
                &g.ephemeral_pubkey,
                recipient.viewing_secret(),
                &recipient.spending_pubkey(),
                Some(g.view_tag),
            ));
        }
    }
}
