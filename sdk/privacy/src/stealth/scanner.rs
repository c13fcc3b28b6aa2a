//! Payment scanner
//!
//! Pulls announcements for a slot range from an [`AnnouncementSource`],
//! drops everything whose view tag does not match, fully verifies the rest
//! and reports the payments that belong to this recipient.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use x25519_dalek::StaticSecret;

use super::ScanError;
use super::address::{derive_stealth_private_key, verify_stealth_ownership};
use super::announcement::StealthAnnouncement;
use super::keys::StealthKeypair;
use crate::error::{PrivacyError, Result};

/// Balances at or below this (one signature fee, in lamports) count as claimed
pub const CLAIMED_BALANCE_THRESHOLD: u64 = 5_000;

/// An announcement as observed on-chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementRecord {
    pub announcement: StealthAnnouncement,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Amount sent, when the source can tell
    pub amount: Option<u64>,
    pub token_mint: Option<[u8; 32]>,
}

/// Where announcements come from
#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    async fn current_slot(&self) -> std::result::Result<u64, ScanError>;

    /// All announcements in `from_slot..=to_slot`
    async fn fetch_announcements(
        &self,
        from_slot: u64,
        to_slot: u64,
    ) -> std::result::Result<Vec<AnnouncementRecord>, ScanError>;

    /// Announcements emitted by one transaction
    async fn fetch_transaction(
        &self,
        signature: &str,
    ) -> std::result::Result<Vec<AnnouncementRecord>, ScanError>;

    /// Current balance of an address, in lamports
    async fn balance(&self, address: &[u8; 32]) -> std::result::Result<u64, ScanError>;
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Defaults to the slot after the last scan, or 0
    pub from_slot: Option<u64>,
    /// Defaults to the current slot
    pub to_slot: Option<u64>,
    /// Report payments that look already claimed
    pub include_claimed: bool,
}

/// A payment verified to belong to the scanning recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthPayment {
    pub stealth_address: [u8; 32],
    pub ephemeral_pubkey: [u8; 32],
    pub view_tag: u8,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Announced amount, or the current balance when none was announced
    pub amount: u64,
    pub token_mint: Option<[u8; 32]>,
    /// `None` when the balance lookup failed
    pub balance: Option<u64>,
    /// Only set when a known balance is at or below the threshold
    pub claimed: bool,
}

impl StealthPayment {
    pub fn address(&self) -> String {
        bs58::encode(self.stealth_address).into_string()
    }
}

pub struct StealthScanner {
    source: Arc<dyn AnnouncementSource>,
    viewing: StaticSecret,
    spending_pubkey: [u8; 32],
    last_scanned_slot: Option<u64>,
}

impl StealthScanner {
    pub fn new(
        source: Arc<dyn AnnouncementSource>,
        viewing: StaticSecret,
        spending_pubkey: [u8; 32],
    ) -> Self {
        Self {
            source,
            viewing,
            spending_pubkey,
            last_scanned_slot: None,
        }
    }

    /// Highest slot covered by a completed scan
    pub fn last_scanned_slot(&self) -> Option<u64> {
        self.last_scanned_slot
    }

    pub fn spending_pubkey(&self) -> &[u8; 32] {
        &self.spending_pubkey
    }

    /// Scan a slot range for payments to this recipient.
    ///
    /// Rescanning an overlapping range reports the same payments again.
    pub async fn scan(&mut self, options: ScanOptions) -> std::result::Result<Vec<StealthPayment>, ScanError> {
        let to_slot = match options.to_slot {
            Some(slot) => slot,
            None => self.source.current_slot().await?,
        };
        let from_slot = options
            .from_slot
            .unwrap_or_else(|| self.last_scanned_slot.map_or(0, |s| s + 1));

        if from_slot > to_slot {
            if options.from_slot.is_some() {
                return Err(ScanError::InvalidRange {
                    from: from_slot,
                    to: to_slot,
                });
            }
            debug!("No new slots to scan (last scanned {to_slot})");
            return Ok(Vec::new());
        }

        let records = self.source.fetch_announcements(from_slot, to_slot).await?;
        debug!(
            "Fetched {} announcements in slots {}..={}",
            records.len(),
            from_slot,
            to_slot
        );

        let payments = self.match_records(records, options.include_claimed).await?;

        self.last_scanned_slot = Some(self.last_scanned_slot.map_or(to_slot, |s| s.max(to_slot)));
        info!(
            "Scanned slots {}..={}: {} payments found",
            from_slot,
            to_slot,
            payments.len()
        );
        Ok(payments)
    }

    /// Check a single transaction. Claimed payments are reported too.
    pub async fn check_transaction(
        &self,
        signature: &str,
    ) -> std::result::Result<Vec<StealthPayment>, ScanError> {
        let records = self.source.fetch_transaction(signature).await?;
        self.match_records(records, true).await
    }

    /// Full ownership check for one announcement
    pub fn is_ours(&self, announcement: &StealthAnnouncement) -> bool {
        verify_stealth_ownership(
            &announcement.stealth_address,
            &announcement.ephemeral_pubkey,
            &self.viewing,
            &self.spending_pubkey,
            Some(announcement.view_tag),
        )
    }

    /// Spending keypair for a payment found by this scanner
    pub fn recover_keypair(
        &self,
        spending: &SigningKey,
        payment: &StealthPayment,
    ) -> Result<StealthKeypair> {
        if spending.verifying_key().to_bytes() != self.spending_pubkey {
            return Err(PrivacyError::InvalidKey(
                "spending key does not match the scanner's spending public key".into(),
            ));
        }
        let keypair = derive_stealth_private_key(spending, &self.viewing, &payment.ephemeral_pubkey)?;
        if keypair.public_key() != payment.stealth_address {
            return Err(PrivacyError::InvalidKey(
                "payment was not addressed to these keys".into(),
            ));
        }
        Ok(keypair)
    }

    async fn match_records(
        &self,
        records: Vec<AnnouncementRecord>,
        include_claimed: bool,
    ) -> std::result::Result<Vec<StealthPayment>, ScanError> {
        let mut payments = Vec::new();

        for record in records {
            if !self.is_ours(&record.announcement) {
                continue;
            }

            let ann = record.announcement;
            let balance = match self.source.balance(&ann.stealth_address).await {
                Ok(lamports) => Some(lamports),
                Err(e) => {
                    warn!(
                        "Balance lookup failed for {} (tx {}): {e}",
                        bs58::encode(ann.stealth_address).into_string(),
                        record.signature
                    );
                    None
                }
            };
            let claimed = balance.is_some_and(|b| b <= CLAIMED_BALANCE_THRESHOLD);
            debug!(
                "Matched payment at slot {} (claimed: {})",
                record.slot, claimed
            );

            if claimed && !include_claimed {
                continue;
            }

            payments.push(StealthPayment {
                stealth_address: ann.stealth_address,
                ephemeral_pubkey: ann.ephemeral_pubkey,
                view_tag: ann.view_tag,
                signature: record.signature,
                slot: record.slot,
                block_time: record.block_time,
                amount: record.amount.or(balance).unwrap_or_default(),
                token_mint: record.token_mint,
                balance,
                claimed,
            });
        }

        Ok(payments)
    }
}

impl fmt::Debug for StealthScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthScanner")
            .field("spending_pubkey", &bs58::encode(self.spending_pubkey).into_string())
            .field("last_scanned_slot", &self.last_scanned_slot)
            .finish_non_exhaustive()
    }
}
