//! Poseidon hashing over the BN254 scalar field
//!
//! ```text
//! Field: BN254 Fr (254 bits)
//! Rate: 2, Capacity: 1
//! Full rounds: 8, Partial rounds: 57, Alpha: 5
//! ```
//!
//! Round constants and the MDS matrix are derived once per process and shared
//! read-only between hasher instances.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use std::sync::OnceLock;

static POSEIDON_CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    POSEIDON_CONFIG.get_or_init(|| {
        let prime_bits: u64 = 254;
        let rate: usize = 2;
        let capacity: usize = 1;
        let full_rounds: u64 = 8;
        let partial_rounds: u64 = 57;
        let alpha: u64 = 5;
        let skip_matrices: u64 = 0;

        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            prime_bits,
            rate,
            full_rounds,
            partial_rounds,
            skip_matrices,
        );

        PoseidonConfig::new(
            full_rounds as usize,
            partial_rounds as usize,
            alpha,
            mds,
            ark,
            rate,
            capacity,
        )
    })
}

/// Poseidon sponge hasher
#[derive(Clone)]
pub struct PoseidonHasher {
    config: &'static PoseidonConfig<Fr>,
}

impl PoseidonHasher {
    pub fn new() -> Self {
        Self {
            config: poseidon_config(),
        }
    }

    /// Absorb every input in order and squeeze one element
    pub fn hash(&self, inputs: &[Fr]) -> Fr {
        let mut sponge = PoseidonSponge::new(self.config);
        for input in inputs {
            sponge.absorb(input);
        }
        let out: Vec<Fr> = sponge.squeeze_field_elements(1);
        out[0]
    }

    /// Hash two children to get their parent
    pub fn hash_pair(&self, left: &Fr, right: &Fr) -> Fr {
        self.hash(&[*left, *right])
    }
}

impl Default for PoseidonHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoseidonHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseidonHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let hasher = PoseidonHasher::new();
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_eq!(hasher.hash_pair(&a, &b), hasher.hash_pair(&a, &b));
        assert_eq!(
            hasher.hash_pair(&a, &b),
            PoseidonHasher::new().hash(&[a, b])
        );
    }

    #[test]
    fn test_hash_order_matters() {
        let hasher = PoseidonHasher::new();
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_ne!(hasher.hash_pair(&a, &b), hasher.hash_pair(&b, &a));
    }
}
