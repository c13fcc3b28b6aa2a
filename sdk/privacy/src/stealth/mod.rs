//! Stealth Addresses
//!
//! Dual-key stealth addresses over Curve25519.
//!
//! ```text
//! Recipient publishes:   meta = (B, V)       B = b·G (Ed25519), V = v·X (X25519)
//! Sender:                s = ECDH(r, V),  R = r·X
//!                        h = SHA-512("makora-stealth-v1" || s)
//!                        view_tag = h[0],  k = h mod l
//!                        P = B + k·G          (pay to P, announce (view_tag, R, P))
//! Recipient:             s = ECDH(v, R)
//!                        p = b + k            (p·G == P)
//! ```
//!
//! The view tag lets a scanner discard about 255/256 announcements after a
//! single ECDH and hash, before doing any curve arithmetic.

mod address;
mod announcement;
mod keys;
mod scanner;

pub use address::{
    GeneratedStealthAddress, derive_stealth_private_key, generate_stealth_address,
    generate_stealth_address_with_ephemeral, verify_stealth_ownership,
};
pub use announcement::{ANNOUNCEMENT_LEN, StealthAnnouncement};
pub use keys::{
    META_ADDRESS_PREFIX, StealthKeypair, StealthKeys, StealthMetaAddress,
    generate_stealth_meta_address,
};
pub use scanner::{
    AnnouncementRecord, AnnouncementSource, CLAIMED_BALANCE_THRESHOLD, ScanOptions,
    StealthPayment, StealthScanner,
};

use thiserror::Error;

/// Errors raised while talking to the chain during a scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("Invalid slot range: {from} > {to}")]
    InvalidRange { from: u64, to: u64 },
}
