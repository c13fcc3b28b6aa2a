//! Solana JSON-RPC announcement source
//!
//! Announcements are emitted by the privacy program as `Program data:` log
//! lines carrying the 65-byte announcement in base64. Discovery walks the
//! program's signature history backwards with `getSignaturesForAddress`
//! and reads each transaction's logs with `getTransaction`.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::{debug, warn};
use serde_json::{Value, json};

use makora_config::SolanaConfig;

use crate::stealth::{
    ANNOUNCEMENT_LEN, AnnouncementRecord, AnnouncementSource, ScanError, StealthAnnouncement,
};

/// Page size for `getSignaturesForAddress` (RPC maximum)
const SIGNATURE_PAGE_LIMIT: usize = 1000;

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// RPC client for announcement discovery
pub struct RpcAnnouncementSource {
    client: reqwest::Client,
    rpc_url: String,
    program_id: String,
    commitment: String,
}

impl RpcAnnouncementSource {
    pub fn new(
        rpc_url: impl Into<String>,
        program_id: impl Into<String>,
        commitment: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            program_id: program_id.into(),
            commitment: commitment.into(),
        }
    }

    pub fn from_config(config: &SolanaConfig) -> Self {
        Self::new(
            config.rpc_url.clone(),
            config.privacy_program_id.clone(),
            config.commitment.clone(),
        )
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ScanError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScanError::Transport(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ScanError::Transport(e.to_string()))?;

        if let Some(error) = body.get("error") {
            return Err(ScanError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| ScanError::InvalidResponse(format!("{method}: no result in response")))
    }

    /// Signatures of successful program transactions in `from_slot..=to_slot`,
    /// newest first
    async fn signatures_in_range(
        &self,
        from_slot: u64,
        to_slot: u64,
    ) -> Result<Vec<String>, ScanError> {
        let mut signatures = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let mut options = json!({
                "limit": SIGNATURE_PAGE_LIMIT,
                "commitment": self.commitment,
            });
            if let Some(sig) = &before {
                options["before"] = json!(sig);
            }

            let page = self
                .call("getSignaturesForAddress", json!([self.program_id, options]))
                .await?;
            let entries = page.as_array().ok_or_else(|| {
                ScanError::InvalidResponse("getSignaturesForAddress: expected array".into())
            })?;

            let mut reached_start = false;
            for entry in entries {
                let slot = entry.get("slot").and_then(Value::as_u64).ok_or_else(|| {
                    ScanError::InvalidResponse("signature entry without slot".into())
                })?;
                if slot < from_slot {
                    reached_start = true;
                    break;
                }
                if slot > to_slot || !entry.get("err").is_none_or(Value::is_null) {
                    continue;
                }
                if let Some(sig) = entry.get("signature").and_then(Value::as_str) {
                    signatures.push(sig.to_string());
                }
            }

            if reached_start || entries.len() < SIGNATURE_PAGE_LIMIT {
                break;
            }
            before = entries
                .last()
                .and_then(|e| e.get("signature"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if before.is_none() {
                break;
            }
        }

        Ok(signatures)
    }
}

#[async_trait]
impl AnnouncementSource for RpcAnnouncementSource {
    async fn current_slot(&self) -> Result<u64, ScanError> {
        self.call("getSlot", json!([{ "commitment": self.commitment }]))
            .await?
            .as_u64()
            .ok_or_else(|| ScanError::InvalidResponse("getSlot: expected integer".into()))
    }

    async fn fetch_announcements(
        &self,
        from_slot: u64,
        to_slot: u64,
    ) -> Result<Vec<AnnouncementRecord>, ScanError> {
        if from_slot > to_slot {
            return Err(ScanError::InvalidRange {
                from: from_slot,
                to: to_slot,
            });
        }

        let signatures = self.signatures_in_range(from_slot, to_slot).await?;
        debug!(
            "{} program transactions in slots {}..={}",
            signatures.len(),
            from_slot,
            to_slot
        );

        let mut records = Vec::new();
        // oldest first
        for signature in signatures.iter().rev() {
            records.extend(self.fetch_transaction(signature).await?);
        }
        Ok(records)
    }

    async fn fetch_transaction(&self, signature: &str) -> Result<Vec<AnnouncementRecord>, ScanError> {
        let tx = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "maxSupportedTransactionVersion": 0,
                        "commitment": self.commitment,
                    }
                ]),
            )
            .await?;

        if tx.is_null() {
            debug!("Transaction {signature} not found");
            return Ok(Vec::new());
        }
        Ok(records_from_transaction(&tx, signature, &self.program_id))
    }

    async fn balance(&self, address: &[u8; 32]) -> Result<u64, ScanError> {
        let address = bs58::encode(address).into_string();
        self.call(
            "getBalance",
            json!([address, { "commitment": self.commitment }]),
        )
        .await?
        .get("value")
        .and_then(Value::as_u64)
        .ok_or_else(|| ScanError::InvalidResponse("getBalance: missing value".into()))
    }
}

/// Build announcement records from a `getTransaction` result.
///
/// A transaction that failed (`meta.err` set) announces nothing.
pub fn records_from_transaction(
    tx: &Value,
    signature: &str,
    program_id: &str,
) -> Vec<AnnouncementRecord> {
    if tx.pointer("/meta/err").is_some_and(|err| !err.is_null()) {
        debug!("Transaction {signature} failed, ignoring its announcements");
        return Vec::new();
    }

    let slot = tx.get("slot").and_then(Value::as_u64).unwrap_or_default();
    let block_time = tx.get("blockTime").and_then(Value::as_i64);
    let logs: Vec<&str> = tx
        .pointer("/meta/logMessages")
        .and_then(Value::as_array)
        .map(|l| l.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    parse_announcement_logs(&logs, program_id)
        .into_iter()
        .map(|announcement| AnnouncementRecord {
            amount: lamports_received(tx, &announcement.stealth_address),
            announcement,
            signature: signature.to_string(),
            slot,
            block_time,
            token_mint: None,
        })
        .collect()
}

/// Extract announcements from transaction logs.
///
/// Only `Program data:` lines emitted while `program_id` is the innermost
/// executing program are considered, and only those decoding to exactly
/// 65 bytes.
pub fn parse_announcement_logs(logs: &[&str], program_id: &str) -> Vec<StealthAnnouncement> {
    let mut stack: Vec<&str> = Vec::new();
    let mut announcements = Vec::new();

    for line in logs {
        if let Some(rest) = line.strip_prefix("Program ") {
            let mut words = rest.split_whitespace();
            let id = words.next().unwrap_or_default();
            match words.next() {
                Some("invoke") => {
                    stack.push(id);
                    continue;
                }
                Some("success") | Some("failed:") => {
                    stack.pop();
                    continue;
                }
                _ => {}
            }
        }

        let Some(data) = line.strip_prefix(PROGRAM_DATA_PREFIX) else {
            continue;
        };
        if stack.last() != Some(&program_id) {
            continue;
        }

        match STANDARD.decode(data.trim()) {
            Ok(bytes) if bytes.len() == ANNOUNCEMENT_LEN => {
                if let Ok(ann) = StealthAnnouncement::from_bytes(&bytes) {
                    announcements.push(ann);
                }
            }
            Ok(bytes) => debug!("Ignoring {}-byte program data entry", bytes.len()),
            Err(e) => warn!("Skipping malformed program data entry: {e}"),
        }
    }

    announcements
}

/// Lamport delta of `address` in a `getTransaction` result
fn lamports_received(tx: &Value, address: &[u8; 32]) -> Option<u64> {
    let address = bs58::encode(address).into_string();
    let keys = tx.pointer("/transaction/message/accountKeys")?.as_array()?;
    let index = keys.iter().position(|k| k.as_str() == Some(address.as_str()))?;

    let pre = tx.pointer("/meta/preBalances")?.get(index)?.as_u64()?;
    let post = tx.pointer("/meta/postBalances")?.get(index)?.as_u64()?;
    post.checked_sub(pre)
}
