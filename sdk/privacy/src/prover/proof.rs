//! Groth16 proof encoding and local verification.
//!
//! On-chain layout (all coordinates 32-byte big-endian):
//!
//! ```text
//! pi_a  = x || y                      64 bytes
//! pi_b  = x.c0 || x.c1 || y.c0 || y.c1   128 bytes   (snarkjs pi_b[0][0], [0][1], [1][0], [1][1])
//! pi_c  = x || y                      64 bytes
//! ```

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_ff::PrimeField;
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_snark::SNARK;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

use super::ProverError;
use crate::field::{field_from_decimal, field_to_bytes_be, fr_from_decimal, fr_to_bytes_be};

/// snarkjs `proof.json`. Points are projective with `z = 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnarkjsProof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_curve")]
    pub curve: String,
}

fn default_protocol() -> String {
    "groth16".to_string()
}

fn default_curve() -> String {
    "bn128".to_string()
}

/// Backend output before conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProof {
    pub proof: SnarkjsProof,
    pub public_signals: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Groth16Proof {
    pub pi_a: [u8; 64],
    pub pi_b: [u8; 128],
    pub pi_c: [u8; 64],
}

fn coordinate(values: &[String], index: usize, what: &str) -> Result<[u8; 32], ProverError> {
    let s = values
        .get(index)
        .ok_or_else(|| ProverError::InvalidProof(format!("{what}: missing coordinate {index}")))?;
    let f: Fq = field_from_decimal(s)
        .ok_or_else(|| ProverError::InvalidProof(format!("{what}: invalid coordinate '{s}'")))?;
    Ok(field_to_bytes_be(&f))
}

/// Decode a 32-byte big-endian base field element, rejecting values >= p
fn fq_from_bytes(bytes: &[u8], what: &str) -> Result<Fq, ProverError> {
    let f = Fq::from_be_bytes_mod_order(bytes);
    if field_to_bytes_be(&f).as_slice() != bytes {
        return Err(ProverError::InvalidProof(format!(
            "{what}: coordinate is not reduced modulo the base field"
        )));
    }
    Ok(f)
}

fn fq_decimal(bytes: &[u8]) -> String {
    Fq::from_be_bytes_mod_order(bytes).into_bigint().to_string()
}

impl Groth16Proof {
    pub const SIZE: usize = 256;

    pub fn from_snarkjs(proof: &SnarkjsProof) -> Result<Self, ProverError> {
        let mut pi_a = [0u8; 64];
        pi_a[..32].copy_from_slice(&coordinate(&proof.pi_a, 0, "pi_a")?);
        pi_a[32..].copy_from_slice(&coordinate(&proof.pi_a, 1, "pi_a")?);

        let b_x = proof
            .pi_b
            .first()
            .ok_or_else(|| ProverError::InvalidProof("pi_b: missing x".into()))?;
        let b_y = proof
            .pi_b
            .get(1)
            .ok_or_else(|| ProverError::InvalidProof("pi_b: missing y".into()))?;
        let mut pi_b = [0u8; 128];
        pi_b[..32].copy_from_slice(&coordinate(b_x, 0, "pi_b.x")?);
        pi_b[32..64].copy_from_slice(&coordinate(b_x, 1, "pi_b.x")?);
        pi_b[64..96].copy_from_slice(&coordinate(b_y, 0, "pi_b.y")?);
        pi_b[96..].copy_from_slice(&coordinate(b_y, 1, "pi_b.y")?);

        let mut pi_c = [0u8; 64];
        pi_c[..32].copy_from_slice(&coordinate(&proof.pi_c, 0, "pi_c")?);
        pi_c[32..].copy_from_slice(&coordinate(&proof.pi_c, 1, "pi_c")?);

        Ok(Self { pi_a, pi_b, pi_c })
    }

    pub fn to_snarkjs(&self) -> SnarkjsProof {
        SnarkjsProof {
            pi_a: vec![
                fq_decimal(&self.pi_a[..32]),
                fq_decimal(&self.pi_a[32..]),
                "1".to_string(),
            ],
            pi_b: vec![
                vec![fq_decimal(&self.pi_b[..32]), fq_decimal(&self.pi_b[32..64])],
                vec![fq_decimal(&self.pi_b[64..96]), fq_decimal(&self.pi_b[96..])],
                vec!["1".to_string(), "0".to_string()],
            ],
            pi_c: vec![
                fq_decimal(&self.pi_c[..32]),
                fq_decimal(&self.pi_c[32..]),
                "1".to_string(),
            ],
            protocol: default_protocol(),
            curve: default_curve(),
        }
    }

    pub fn from_ark(proof: &Proof<Bn254>) -> Self {
        let mut pi_b = [0u8; 128];
        pi_b[..32].copy_from_slice(&field_to_bytes_be(&proof.b.x.c0));
        pi_b[32..64].copy_from_slice(&field_to_bytes_be(&proof.b.x.c1));
        pi_b[64..96].copy_from_slice(&field_to_bytes_be(&proof.b.y.c0));
        pi_b[96..].copy_from_slice(&field_to_bytes_be(&proof.b.y.c1));

        Self {
            pi_a: g1_bytes(&proof.a),
            pi_b,
            pi_c: g1_bytes(&proof.c),
        }
    }

    /// Rebuild curve points, rejecting anything off-curve or outside the
    /// prime-order subgroup
    pub fn to_ark(&self) -> Result<Proof<Bn254>, ProverError> {
        Ok(Proof {
            a: g1_from_bytes(&self.pi_a, "pi_a")?,
            b: g2_from_bytes(&self.pi_b, "pi_b")?,
            c: g1_from_bytes(&self.pi_c, "pi_c")?,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..64].copy_from_slice(&self.pi_a);
        out[64..192].copy_from_slice(&self.pi_b);
        out[192..].copy_from_slice(&self.pi_c);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProverError> {
        if bytes.len() != Self::SIZE {
            return Err(ProverError::InvalidProof(format!(
                "expected {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut proof = Self {
            pi_a: [0u8; 64],
            pi_b: [0u8; 128],
            pi_c: [0u8; 64],
        };
        proof.pi_a.copy_from_slice(&bytes[..64]);
        proof.pi_b.copy_from_slice(&bytes[64..192]);
        proof.pi_c.copy_from_slice(&bytes[192..]);
        Ok(proof)
    }
}

fn g1_bytes(p: &G1Affine) -> [u8; 64] {
    let mut out = [0u8; 64];
    if !p.infinity {
        out[..32].copy_from_slice(&field_to_bytes_be(&p.x));
        out[32..].copy_from_slice(&field_to_bytes_be(&p.y));
    }
    out
}

fn g1_from_bytes(bytes: &[u8; 64], what: &str) -> Result<G1Affine, ProverError> {
    if bytes.iter().all(|b| *b == 0) {
        return Ok(G1Affine::zero());
    }
    let p = G1Affine::new_unchecked(
        fq_from_bytes(&bytes[..32], what)?,
        fq_from_bytes(&bytes[32..], what)?,
    );
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProverError::InvalidProof(format!("{what} is not a valid G1 point")));
    }
    Ok(p)
}

fn g2_from_bytes(bytes: &[u8; 128], what: &str) -> Result<G2Affine, ProverError> {
    if bytes.iter().all(|b| *b == 0) {
        return Ok(G2Affine::zero());
    }
    let x = Fq2::new(
        fq_from_bytes(&bytes[..32], what)?,
        fq_from_bytes(&bytes[32..64], what)?,
    );
    let y = Fq2::new(
        fq_from_bytes(&bytes[64..96], what)?,
        fq_from_bytes(&bytes[96..], what)?,
    );
    let p = G2Affine::new_unchecked(x, y);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProverError::InvalidProof(format!("{what} is not a valid G2 point")));
    }
    Ok(p)
}

/// Public signals as 32-byte big-endian words
pub fn public_signal_bytes(signals: &[String]) -> Result<Vec<[u8; 32]>, ProverError> {
    signals
        .iter()
        .map(|s| {
            fr_from_decimal(s)
                .map(|f| fr_to_bytes_be(&f))
                .map_err(|e| ProverError::Serialization(e.to_string()))
        })
        .collect()
}

// snarkjs verification_key.json

fn g1_json(p: &G1Affine) -> Value {
    if p.infinity {
        return json!(["0", "1", "0"]);
    }
    json!([p.x.into_bigint().to_string(), p.y.into_bigint().to_string(), "1"])
}

fn g2_json(p: &G2Affine) -> Value {
    if p.infinity {
        return json!([["0", "0"], ["1", "0"], ["0", "0"]]);
    }
    json!([
        [p.x.c0.into_bigint().to_string(), p.x.c1.into_bigint().to_string()],
        [p.y.c0.into_bigint().to_string(), p.y.c1.into_bigint().to_string()],
        ["1", "0"]
    ])
}

/// Export an arkworks verifying key in snarkjs `verification_key.json` form
pub fn verifying_key_to_snarkjs(vk: &VerifyingKey<Bn254>) -> Value {
    json!({
        "protocol": "groth16",
        "curve": "bn128",
        "nPublic": vk.gamma_abc_g1.len().saturating_sub(1),
        "vk_alpha_1": g1_json(&vk.alpha_g1),
        "vk_beta_2": g2_json(&vk.beta_g2),
        "vk_gamma_2": g2_json(&vk.gamma_g2),
        "vk_delta_2": g2_json(&vk.delta_g2),
        "IC": vk.gamma_abc_g1.iter().map(g1_json).collect::<Vec<_>>(),
    })
}

#[derive(Debug, Deserialize)]
struct SnarkjsVerificationKey {
    vk_alpha_1: Vec<String>,
    vk_beta_2: Vec<Vec<String>>,
    vk_gamma_2: Vec<Vec<String>>,
    vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    ic: Vec<Vec<String>>,
}

fn json_g1(coords: &[String], what: &str) -> Result<G1Affine, ProverError> {
    if coords.get(2).is_some_and(|z| z == "0") {
        return Ok(G1Affine::zero());
    }
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&coordinate(coords, 0, what)?);
    bytes[32..].copy_from_slice(&coordinate(coords, 1, what)?);
    g1_from_bytes(&bytes, what)
}

fn json_g2(coords: &[Vec<String>], what: &str) -> Result<G2Affine, ProverError> {
    let missing = || ProverError::InvalidProof(format!("{what}: missing coordinate"));
    let x = coords.first().ok_or_else(missing)?;
    let y = coords.get(1).ok_or_else(missing)?;
    let mut bytes = [0u8; 128];
    bytes[..32].copy_from_slice(&coordinate(x, 0, what)?);
    bytes[32..64].copy_from_slice(&coordinate(x, 1, what)?);
    bytes[64..96].copy_from_slice(&coordinate(y, 0, what)?);
    bytes[96..].copy_from_slice(&coordinate(y, 1, what)?);
    g2_from_bytes(&bytes, what)
}

fn load_verifying_key(path: &Path) -> Result<VerifyingKey<Bn254>, ProverError> {
    let raw = std::fs::read_to_string(path)?;
    let vk: SnarkjsVerificationKey =
        serde_json::from_str(&raw).map_err(|e| ProverError::Serialization(e.to_string()))?;

    Ok(VerifyingKey {
        alpha_g1: json_g1(&vk.vk_alpha_1, "vk_alpha_1")?,
        beta_g2: json_g2(&vk.vk_beta_2, "vk_beta_2")?,
        gamma_g2: json_g2(&vk.vk_gamma_2, "vk_gamma_2")?,
        delta_g2: json_g2(&vk.vk_delta_2, "vk_delta_2")?,
        gamma_abc_g1: vk
            .ic
            .iter()
            .enumerate()
            .map(|(i, p)| json_g1(p, &format!("IC[{i}]")))
            .collect::<Result<Vec<_>, _>>()?,
    })
}

fn try_verify(
    proof: &Groth16Proof,
    public_signals: &[String],
    vkey_path: &Path,
) -> Result<bool, ProverError> {
    let vk = load_verifying_key(vkey_path)?;
    if vk.gamma_abc_g1.len() != public_signals.len() + 1 {
        return Err(ProverError::InvalidInputs(format!(
            "verification key expects {} public signals, got {}",
            vk.gamma_abc_g1.len().saturating_sub(1),
            public_signals.len()
        )));
    }

    let inputs = public_signals
        .iter()
        .map(|s| fr_from_decimal(s).map_err(|e| ProverError::Serialization(e.to_string())))
        .collect::<Result<Vec<Fr>, _>>()?;

    let pvk = Groth16::<Bn254>::process_vk(&vk)
        .map_err(|e| ProverError::InvalidProof(e.to_string()))?;
    Groth16::<Bn254>::verify_with_processed_vk(&pvk, &inputs, &proof.to_ark()?)
        .map_err(|e| ProverError::InvalidProof(e.to_string()))
}

/// Verify a proof against a snarkjs verification key file.
///
/// Test helper: every failure (unreadable key, malformed point, wrong number
/// of signals) is reported as `false`.
pub fn verify_proof(proof: &Groth16Proof, public_signals: &[String], vkey_path: &Path) -> bool {
    match try_verify(proof, public_signals, vkey_path) {
        Ok(valid) => valid,
        Err(e) => {
            debug!("Proof verification error: {e}");
            false
        }
    }
}
