//! Transfer circuit inputs.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use super::ProverError;
use crate::field::fr_to_decimal;
use crate::merkle::MerkleProof;
use crate::note::Note;

/// Public inputs of the 2-in / 2-out transfer circuit, in circuit order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPublicInputs {
    pub merkle_root: Fr,
    pub nullifier_1: Fr,
    pub nullifier_2: Fr,
    pub output_commitment_1: Fr,
    pub output_commitment_2: Fr,
    /// Net deposit (positive) or withdrawal (negative), encoded in the field
    pub public_amount: Fr,
    pub token_mint: Fr,
}

impl TransferPublicInputs {
    pub const COUNT: usize = 7;

    /// Encode a signed amount; negative values wrap to `p - |x|`
    pub fn public_amount_from_signed(amount: i128) -> Fr {
        let magnitude = Fr::from(amount.unsigned_abs());
        if amount < 0 { -magnitude } else { magnitude }
    }

    pub fn to_vec(&self) -> Vec<Fr> {
        vec![
            self.merkle_root,
            self.nullifier_1,
            self.nullifier_2,
            self.output_commitment_1,
            self.output_commitment_2,
            self.public_amount,
            self.token_mint,
        ]
    }
}

/// A note being spent, with its inclusion path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendInput {
    pub amount: u64,
    pub owner_pubkey: Fr,
    pub randomness: Fr,
    pub path_indices: Vec<u8>,
    pub path_elements: Vec<Fr>,
}

impl SpendInput {
    pub fn from_note(note: &Note, proof: &MerkleProof) -> Result<Self, ProverError> {
        if proof.leaf != note.commitment {
            return Err(ProverError::InvalidInputs(
                "merkle proof is not for this note's commitment".into(),
            ));
        }
        if note.leaf_index.is_some_and(|i| i != proof.leaf_index) {
            return Err(ProverError::InvalidInputs(format!(
                "note sits at leaf {:?}, proof is for leaf {}",
                note.leaf_index, proof.leaf_index
            )));
        }
        Ok(Self {
            amount: note.amount,
            owner_pubkey: note.owner_pubkey,
            randomness: note.randomness,
            path_indices: proof.path_indices.clone(),
            path_elements: proof.path.clone(),
        })
    }
}

/// A note being created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub amount: u64,
    pub recipient: Fr,
    pub randomness: Fr,
}

impl OutputSpec {
    pub fn from_note(note: &Note) -> Self {
        Self {
            amount: note.amount,
            recipient: note.owner_pubkey,
            randomness: note.randomness,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPrivateInputs {
    pub input_notes: [SpendInput; 2],
    pub output_notes: [OutputSpec; 2],
    pub spending_key: Fr,
}

/// Witness inputs keyed by circuit signal name, every value a decimal string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitInputs {
    pub merkle_root: String,
    pub nullifier_1: String,
    pub nullifier_2: String,
    pub output_commitment_1: String,
    pub output_commitment_2: String,
    pub public_amount: String,
    pub token_mint: String,

    pub in_amount_1: String,
    pub in_owner_pubkey_1: String,
    pub in_randomness_1: String,
    pub in_path_indices_1: Vec<String>,
    pub in_path_elements_1: Vec<String>,

    pub in_amount_2: String,
    pub in_owner_pubkey_2: String,
    pub in_randomness_2: String,
    pub in_path_indices_2: Vec<String>,
    pub in_path_elements_2: Vec<String>,

    pub out_amount_1: String,
    pub out_recipient_1: String,
    pub out_randomness_1: String,

    pub out_amount_2: String,
    pub out_recipient_2: String,
    pub out_randomness_2: String,

    pub spending_key: String,
}

fn decimals(values: &[Fr]) -> Vec<String> {
    values.iter().map(fr_to_decimal).collect()
}

fn indices(bits: &[u8]) -> Vec<String> {
    bits.iter().map(u8::to_string).collect()
}

/// Flatten structured transfer data into circuit signals
pub fn build_circuit_inputs(
    public: &TransferPublicInputs,
    private: &TransferPrivateInputs,
) -> CircuitInputs {
    let [in1, in2] = &private.input_notes;
    let [out1, out2] = &private.output_notes;

    CircuitInputs {
        merkle_root: fr_to_decimal(&public.merkle_root),
        nullifier_1: fr_to_decimal(&public.nullifier_1),
        nullifier_2: fr_to_decimal(&public.nullifier_2),
        output_commitment_1: fr_to_decimal(&public.output_commitment_1),
        output_commitment_2: fr_to_decimal(&public.output_commitment_2),
        public_amount: fr_to_decimal(&public.public_amount),
        token_mint: fr_to_decimal(&public.token_mint),

        in_amount_1: in1.amount.to_string(),
        in_owner_pubkey_1: fr_to_decimal(&in1.owner_pubkey),
        in_randomness_1: fr_to_decimal(&in1.randomness),
        in_path_indices_1: indices(&in1.path_indices),
        in_path_elements_1: decimals(&in1.path_elements),

        in_amount_2: in2.amount.to_string(),
        in_owner_pubkey_2: fr_to_decimal(&in2.owner_pubkey),
        in_randomness_2: fr_to_decimal(&in2.randomness),
        in_path_indices_2: indices(&in2.path_indices),
        in_path_elements_2: decimals(&in2.path_elements),

        out_amount_1: out1.amount.to_string(),
        out_recipient_1: fr_to_decimal(&out1.recipient),
        out_randomness_1: fr_to_decimal(&out1.randomness),

        out_amount_2: out2.amount.to_string(),
        out_recipient_2: fr_to_decimal(&out2.recipient),
        out_randomness_2: fr_to_decimal(&out2.randomness),

        spending_key: fr_to_decimal(&private.spending_key),
    }
}
