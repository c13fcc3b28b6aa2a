//! On-chain stealth announcement
//!
//! ```text
//! [0]       view tag
//! [1..33]   ephemeral X25519 public key
//! [33..65]  stealth address (Ed25519 public key)
//! ```

use super::address::GeneratedStealthAddress;
use crate::error::{PrivacyError, Result};

pub const ANNOUNCEMENT_LEN: usize = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StealthAnnouncement {
    pub view_tag: u8,
    pub ephemeral_pubkey: [u8; 32],
    pub stealth_address: [u8; 32],
}

impl StealthAnnouncement {
    pub fn to_bytes(&self) -> [u8; ANNOUNCEMENT_LEN] {
        let mut out = [0u8; ANNOUNCEMENT_LEN];
        out[0] = self.view_tag;
        out[1..33].copy_from_slice(&self.ephemeral_pubkey);
        out[33..65].copy_from_slice(&self.stealth_address);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ANNOUNCEMENT_LEN {
            return Err(PrivacyError::InvalidAnnouncementLength(bytes.len()));
        }
        let mut ephemeral_pubkey = [0u8; 32];
        let mut stealth_address = [0u8; 32];
        ephemeral_pubkey.copy_from_slice(&bytes[1..33]);
        stealth_address.copy_from_slice(&bytes[33..65]);
        Ok(Self {
            view_tag: bytes[0],
            ephemeral_pubkey,
            stealth_address,
        })
    }
}

impl From<&GeneratedStealthAddress> for StealthAnnouncement {
    fn from(generated: &GeneratedStealthAddress) -> Self {
        Self {
            view_tag: generated.view_tag,
            ephemeral_pubkey: generated.ephemeral_pubkey,
            stealth_address: generated.address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ann = StealthAnnouncement {
            view_tag: 0xab,
            ephemeral_pubkey: [1u8; 32],
            stealth_address: [2u8; 32],
        };
        let bytes = ann.to_bytes();
        assert_eq!(bytes[0], 0xab);
        assert!(bytes[1..33].iter().all(|b| *b == 1));
        assert!(bytes[33..].iter().all(|b| *b == 2));
        assert_eq!(StealthAnnouncement::from_bytes(&bytes).unwrap(), ann);
    }

    #[test]
    fn test_exact_length_required() {
        for len in [0, 64, 66] {
            let err = StealthAnnouncement::from_bytes(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, PrivacyError::InvalidAnnouncementLength(l) if l == len));
        }
    }
}
