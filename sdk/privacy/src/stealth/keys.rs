//! Stealth key material and the published meta-address.

use curve25519_dalek::{EdwardsPoint, Scalar};
use ed25519_dalek::{
    Signature, SigningKey, VerifyingKey,
    hazmat::{ExpandedSecretKey, raw_sign},
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use std::fmt;
use std::str::FromStr;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{PrivacyError, Result};

/// Literal tag of the meta-address string form
pub const META_ADDRESS_PREFIX: &str = "st";

const NONCE_PREFIX_DOMAIN: &[u8] = b"makora-stealth-nonce-v1";

/// Published pair of public keys payments are derived from.
///
/// String form: `st:<base58 spending pubkey>:<base58 viewing pubkey>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StealthMetaAddress {
    /// Ed25519 spending public key
    pub spending_pubkey: [u8; 32],
    /// X25519 viewing public key
    pub viewing_pubkey: [u8; 32],
}

impl StealthMetaAddress {
    pub fn new(spending_pubkey: [u8; 32], viewing_pubkey: [u8; 32]) -> Self {
        Self {
            spending_pubkey,
            viewing_pubkey,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            META_ADDRESS_PREFIX,
            bs58::encode(self.spending_pubkey).into_string(),
            bs58::encode(self.viewing_pubkey).into_string()
        )
    }

    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(PrivacyError::InvalidMetaAddress(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }
        if parts[0] != META_ADDRESS_PREFIX {
            return Err(PrivacyError::InvalidMetaAddress(format!(
                "unknown prefix '{}'",
                parts[0]
            )));
        }

        Ok(Self {
            spending_pubkey: decode_key(parts[1], "spending")?,
            viewing_pubkey: decode_key(parts[2], "viewing")?,
        })
    }
}

fn decode_key(part: &str, which: &str) -> Result<[u8; 32]> {
    let bytes = bs58::decode(part)
        .into_vec()
        .map_err(|e| PrivacyError::InvalidMetaAddress(format!("{which} key: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        PrivacyError::InvalidMetaAddress(format!(
            "{which} key must be 32 bytes, got {}",
            b.len()
        ))
    })
}

impl fmt::Display for StealthMetaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for StealthMetaAddress {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Build a meta-address from the two independent recipient keys
pub fn generate_stealth_meta_address(
    spending: &SigningKey,
    viewing: &StaticSecret,
) -> StealthMetaAddress {
    StealthMetaAddress::new(
        spending.verifying_key().to_bytes(),
        PublicKey::from(viewing).to_bytes(),
    )
}

/// Recipient key bundle
///
/// The spending key controls funds; the viewing key can only detect them.
#[derive(Clone)]
pub struct StealthKeys {
    spending: SigningKey,
    viewing: StaticSecret,
}

impl StealthKeys {
    pub fn new(spending: SigningKey, viewing: StaticSecret) -> Self {
        Self { spending, viewing }
    }

    /// Generate both keys from the OS RNG
    pub fn random() -> Self {
        Self {
            spending: SigningKey::generate(&mut OsRng),
            viewing: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Restore from the 32-byte spending seed and viewing secret
    pub fn from_bytes(spending: [u8; 32], viewing: [u8; 32]) -> Self {
        Self {
            spending: SigningKey::from_bytes(&spending),
            viewing: StaticSecret::from(viewing),
        }
    }

    pub fn spending_key(&self) -> &SigningKey {
        &self.spending
    }

    pub fn viewing_secret(&self) -> &StaticSecret {
        &self.viewing
    }

    pub fn spending_pubkey(&self) -> [u8; 32] {
        self.spending.verifying_key().to_bytes()
    }

    pub fn viewing_pubkey(&self) -> [u8; 32] {
        PublicKey::from(&self.viewing).to_bytes()
    }

    pub fn spending_bytes(&self) -> [u8; 32] {
        self.spending.to_bytes()
    }

    pub fn viewing_bytes(&self) -> [u8; 32] {
        self.viewing.to_bytes()
    }

    pub fn meta_address(&self) -> StealthMetaAddress {
        generate_stealth_meta_address(&self.spending, &self.viewing)
    }
}

impl fmt::Debug for StealthKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthKeys")
            .field("meta_address", &self.meta_address().encode())
            .finish_non_exhaustive()
    }
}

/// Ed25519 secret scalar of a spending key
pub(crate) fn spending_scalar(key: &SigningKey) -> Scalar {
    ExpandedSecretKey::from(&key.to_bytes()).scalar
}

/// One-time keypair controlling a stealth address.
///
/// There is no seed behind it, only the scalar `p = b + k`, so signing goes
/// through the raw Ed25519 signing path.
#[derive(Clone)]
pub struct StealthKeypair {
    secret: Scalar,
    public: [u8; 32],
}

impl StealthKeypair {
    pub(crate) fn from_scalar(secret: Scalar) -> Self {
        let public = EdwardsPoint::mul_base(&secret).compress().to_bytes();
        Self { secret, public }
    }

    /// Stealth address as raw public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Stealth address in base58, as a Solana address
    pub fn address(&self) -> String {
        bs58::encode(self.public).into_string()
    }

    pub fn secret_scalar(&self) -> &Scalar {
        &self.secret
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.public)
            .map_err(|e| PrivacyError::InvalidKey(e.to_string()))
    }

    /// Sign a message so that it verifies under the stealth address
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let verifying_key = self.verifying_key()?;

        let mut hasher = Sha512::new();
        hasher.update(NONCE_PREFIX_DOMAIN);
        hasher.update(self.secret.as_bytes());
        let digest = hasher.finalize();
        let mut hash_prefix = [0u8; 32];
        hash_prefix.copy_from_slice(&digest[..32]);

        let expanded = ExpandedSecretKey {
            scalar: self.secret,
            hash_prefix,
        };
        Ok(raw_sign::<Sha512>(&expanded, message, &verifying_key))
    }
}

impl fmt::Debug for StealthKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
