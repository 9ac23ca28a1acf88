//! Store gateway: the contract the external transactional store must offer.
//!
//! All operations are transactional from the caller's perspective - partial failures
//! bubble up as a single [`CoreError::Store`]. The in-memory implementation
//! here exists for tests and local running; production deployments plug in
//! a real persistent store behind the same trait, the same way
//! `openibank-settlement::SettlementChannelExecutor` is backed by
//! `InMemoryChannel` in tests and a real channel in production.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use switch_types::{Amount, PreparePayload, Transfer, TransferState};
use tokio::sync::RwLock;

/// Result of `validateDuplicateHash`: an atomic
/// insert-if-absent of `(transferId, fingerprint)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateHashResult {
    /// Same `transferId` and same fingerprint seen before.
    pub exists_matching: bool,
    /// Same `transferId`, different fingerprint.
    pub exists_not_matching: bool,
}

impl DuplicateHashResult {
    pub fn new() -> Self {
        Self {
            exists_matching: false,
            exists_not_matching: false,
        }
    }
}

/// The record actually kept by the store, including the audit-only fields
/// not present on the wire `Transfer`.
#[derive(Debug, Clone)]
pub struct StoredTransfer {
    pub transfer: Transfer,
    pub valid: bool,
    pub invalid_reason: Option<String>,
}

/// `fulfil(transferId, {fulfilment, completedTimestamp})` parameters.
#[derive(Debug, Clone)]
pub struct FulfilUpdate {
    pub fulfilment: String,
    pub completed_timestamp: DateTime<Utc>,
}

/// `reject(transferId, {errorInformation})` parameters.
#[derive(Debug, Clone)]
pub struct RejectUpdate {
    pub error_code: i32,
    pub error_description: String,
}

#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Atomic insert-if-absent of `(transferId, fingerprint)`.
    async fn validate_duplicate_hash(
        &self,
        payload: &PreparePayload,
        fingerprint: [u8; 32],
    ) -> Result<DuplicateHashResult>;

    async fn get_transfer_state_change(&self, transfer_id: &str) -> Result<Option<TransferState>>;

    async fn get_by_id(&self, transfer_id: &str) -> Result<Option<Transfer>>;

    /// Persists the transfer; on `valid = false` also records `reason`
    /// on the stored record for audit.
    async fn prepare(&self, payload: &PreparePayload, reason: Option<String>, valid: bool) -> Result<()>;

    /// `RESERVED -> COMMITTED` atomically.
    async fn fulfil(&self, transfer_id: &str, update: FulfilUpdate) -> Result<Transfer>;

    /// `RESERVED -> ABORTED`.
    async fn reject(&self, transfer_id: &str, update: RejectUpdate) -> Result<Transfer>;

    async fn log_transfer_error(&self, transfer_id: &str, error_code: i32, description: &str) -> Result<()>;

    /// Lists known participant identifiers, used by the handler registrar
    /// to bind one PREPARE consumer per participant.
    async fn list_participants(&self) -> Result<Vec<String>>;
}

#[derive(Default)]
struct Inner {
    transfers: HashMap<String, StoredTransfer>,
    fingerprints: HashMap<String, [u8; 32]>,
    participants: Vec<String>,
}

/// The in-memory reference `StoreGateway`, built the way
/// `openibank_ledger::Ledger` and `openibank_escrow::EscrowManager` hold
/// their state: an `Arc<RwLock<..>>` guarding plain collections, safe to
/// share across the per-topic workers that drive prepare/fulfil/transfer consumption.
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub fn with_participants(participants: impl IntoIterator<Item = String>) -> Self {
        let inner = Inner {
            participants: participants.into_iter().collect(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[async_trait]
impl StoreGateway for InMemoryStore {
    async fn validate_duplicate_hash(
        &self,
        payload: &PreparePayload,
        fingerprint: [u8; 32],
    ) -> Result<DuplicateHashResult> {
        let mut inner = self.inner.write().await;
        match inner.fingerprints.get(&payload.transfer_id) {
            None => {
                inner
                    .fingerprints
                    .insert(payload.transfer_id.clone(), fingerprint);
                Ok(DuplicateHashResult::new())
            }
            Some(existing) if existing == &fingerprint => Ok(DuplicateHashResult {
                exists_matching: true,
                exists_not_matching: false,
            }),
            Some(_) => Ok(DuplicateHashResult {
                exists_matching: false,
                exists_not_matching: true,
            }),
        }
    }

    async fn get_transfer_state_change(&self, transfer_id: &str) -> Result<Option<TransferState>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transfers
            .get(transfer_id)
            .map(|t| t.transfer.transfer_state))
    }

    async fn get_by_id(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        let inner = self.inner.read().await;
        Ok(inner.transfers.get(transfer_id).map(|t| t.transfer.clone()))
    }

    async fn prepare(&self, payload: &PreparePayload, reason: Option<String>, valid: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let state = if valid {
            TransferState::Reserved
        } else {
            TransferState::Received
        };
        let transfer = Transfer::from_prepare(payload, state);
        inner.transfers.insert(
            payload.transfer_id.clone(),
            StoredTransfer {
                transfer,
                valid,
                invalid_reason: reason,
            },
        );
        Ok(())
    }

    async fn fulfil(&self, transfer_id: &str, update: FulfilUpdate) -> Result<Transfer> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .transfers
            .get_mut(transfer_id)
            .ok_or_else(|| CoreError::Store {
                message: format!("transfer {} not found", transfer_id),
            })?;
        stored.transfer.transfer_state = TransferState::Committed;
        stored.transfer.fulfilment = Some(update.fulfilment);
        Ok(stored.transfer.clone())
    }

    async fn reject(&self, transfer_id: &str, _update: RejectUpdate) -> Result<Transfer> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .transfers
            .get_mut(transfer_id)
            .ok_or_else(|| CoreError::Store {
                message: format!("transfer {} not found", transfer_id),
            })?;
        stored.transfer.transfer_state = TransferState::Aborted;
        Ok(stored.transfer.clone())
    }

    async fn log_transfer_error(&self, _transfer_id: &str, _error_code: i32, _description: &str) -> Result<()> {
        Ok(())
    }

    async fn list_participants(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.participants.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use chrono::Duration;
    use sha2::{Digest, Sha256};

    fn sample_payload(transfer_id: &str, amount: &str) -> PreparePayload {
        PreparePayload {
            transfer_id: transfer_id.to_string(),
            payer_fsp: "dfspA".to_string(),
            payee_fsp: "dfspB".to_string(),
            amount: Amount::new("USD", amount),
            ilp_packet: STANDARD.encode(b"packet-bytes"),
            condition: URL_SAFE_NO_PAD.encode(Sha256::digest(b"preimage")),
            expiration_date: Utc::now() + Duration::days(1),
            extension_list: Vec::new(),
        }
    }

    #[tokio::test]
    async fn validate_duplicate_hash_first_seen_is_new() {
        let store = InMemoryStore::new();
        let payload = sample_payload("t1", "100.00");
        let fp = crate::validator::FulfilmentValidator::fingerprint(&payload);
        let result = store.validate_duplicate_hash(&payload, fp).await.unwrap();
        assert!(!result.exists_matching);
        assert!(!result.exists_not_matching);
    }

    #[tokio::test]
    async fn validate_duplicate_hash_same_fingerprint_matches() {
        let store = InMemoryStore::new();
        let payload = sample_payload("t1", "100.00");
        let fp = crate::validator::FulfilmentValidator::fingerprint(&payload);
        store.validate_duplicate_hash(&payload, fp).await.unwrap();
        let result = store.validate_duplicate_hash(&payload, fp).await.unwrap();
        assert!(result.exists_matching);
        assert!(!result.exists_not_matching);
    }

    #[tokio::test]
    async fn validate_duplicate_hash_different_fingerprint_does_not_match() {
        let store = InMemoryStore::new();
        let first = sample_payload("t1", "100.00");
        let second = sample_payload("t1", "100.01");
        let fp1 = crate::validator::FulfilmentValidator::fingerprint(&first);
        let fp2 = crate::validator::FulfilmentValidator::fingerprint(&second);
        store.validate_duplicate_hash(&first, fp1).await.unwrap();
        let result = store.validate_duplicate_hash(&second, fp2).await.unwrap();
        assert!(!result.exists_matching);
        assert!(result.exists_not_matching);
    }

    #[tokio::test]
    async fn prepare_then_fulfil_transitions_reserved_to_committed() {
        let store = InMemoryStore::new();
        let payload = sample_payload("t1", "100.00");
        store.prepare(&payload, None, true).await.unwrap();
        let transfer = store.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(transfer.transfer_state, TransferState::Reserved);

        let committed = store
            .fulfil(
                "t1",
                FulfilUpdate {
                    fulfilment: "abc".to_string(),
                    completed_timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert_eq!(committed.transfer_state, TransferState::Committed);
        assert_eq!(committed.fulfilment.as_deref(), Some("abc"));
    }
}
