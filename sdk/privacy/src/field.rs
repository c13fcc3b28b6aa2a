//! Field element codec
//!
//! Every value handed to the circuit lives in the BN254 scalar field. Bytes
//! are big-endian and always exactly 32 long; anything wider is reduced
//! modulo the field order on the way in.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, UniformRand};
use ark_std::rand::Rng;

use crate::error::{PrivacyError, Result};

/// Encode a field element as 32 big-endian bytes
pub fn fr_to_bytes_be(f: &Fr) -> [u8; 32] {
    field_to_bytes_be(f)
}

/// Big-endian encoding for any 256-bit prime field (BN254 Fr and Fq)
pub(crate) fn field_to_bytes_be<F: PrimeField>(f: &F) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_be();
    let mut arr = [0u8; 32];
    arr[32 - bytes.len()..].copy_from_slice(&bytes);
    arr
}

/// Decode exactly 32 big-endian bytes, reducing modulo the field order
pub fn fr_from_bytes_be(bytes: &[u8]) -> Result<Fr> {
    if bytes.len() != 32 {
        return Err(PrivacyError::InvalidFieldLength(bytes.len()));
    }
    Ok(Fr::from_be_bytes_mod_order(bytes))
}

/// Map a 32-byte public key or mint address into the field
pub fn bytes_to_field(bytes: &[u8; 32]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Decimal representation, as used by circuit inputs and tree exports
pub fn fr_to_decimal(f: &Fr) -> String {
    f.into_bigint().to_string()
}

/// Parse a decimal string; values at or above the modulus are reduced
pub fn fr_from_decimal(s: &str) -> Result<Fr> {
    field_from_decimal(s).ok_or_else(|| PrivacyError::InvalidFieldElement(s.to_string()))
}

pub(crate) fn field_from_decimal<F: PrimeField>(s: &str) -> Option<F> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let ten = F::from(10u64);
    Some(
        s.bytes()
            .fold(F::ZERO, |acc, b| acc * ten + F::from(u64::from(b - b'0'))),
    )
}

/// Draw a uniformly random field element
pub fn random_field<R: Rng>(rng: &mut R) -> Fr {
    Fr::rand(rng)
}

/// Serde adapter: field element as a decimal string
pub mod serde_decimal {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(f: &Fr, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&fr_to_decimal(f))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Fr, D::Error> {
        let s = String::deserialize(d)?;
        fr_from_decimal(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter: list of field elements as decimal strings
pub mod serde_decimal_vec {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    pub fn serialize<S: Serializer>(v: &[Fr], s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for f in v {
            seq.serialize_element(&fr_to_decimal(f))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<Fr>, D::Error> {
        let v = Vec::<String>::deserialize(d)?;
        v.iter()
            .map(|s| fr_from_decimal(s).map_err(D::Error::custom))
            .collect()
    }
}
