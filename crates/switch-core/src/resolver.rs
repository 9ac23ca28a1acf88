//! Duplicate resolution: classifies a prepare payload against the store's
//! duplicate-hash result.
//!
//! The single authority for what a prepare replay means. No other
//! component inspects `existsMatching`/`existsNotMatching` directly - every
//! coordinator asks this resolver for a [`Classification`] and acts on
//! that alone.

use crate::error::Result;
use crate::store::StoreGateway;
use crate::validator::FulfilmentValidator;
use switch_types::{error_codes, PreparePayload, Transfer, TransferState};

#[derive(Debug, Clone)]
pub enum Classification {
    /// `existsMatching = false, existsNotMatching = false` - proceed to
    /// validation.
    New,
    /// `existsMatching = true`, but the stored state is neither a known
    /// in-flight nor terminal state. Emit NOTIFICATION failure(3100).
    Anomaly,
    /// `existsMatching = true`, stored state is `COMMITTED`/`ABORTED`. Emit
    /// NOTIFICATION success with the current transfer snapshot, action
    /// `prepare-duplicate`.
    FinalizedReplay { transfer: Transfer },
    /// `existsMatching = true`, stored state is `RECEIVED`/`RESERVED`.
    /// No-op, silently.
    InFlight,
    /// `existsNotMatching = true` - the same `transferId` arrived with a
    /// different fingerprint. Emit NOTIFICATION failure(3106).
    Modified,
}

impl Classification {
    pub fn is_new(&self) -> bool {
        matches!(self, Classification::New)
    }
}

pub struct DuplicateResolver;

impl DuplicateResolver {
    pub async fn classify(
        store: &dyn StoreGateway,
        payload: &PreparePayload,
    ) -> Result<Classification> {
        let fingerprint = FulfilmentValidator::fingerprint(payload);
        let hash_result = store.validate_duplicate_hash(payload, fingerprint).await?;

        if !hash_result.exists_matching && !hash_result.exists_not_matching {
            return Ok(Classification::New);
        }

        if hash_result.exists_not_matching {
            return Ok(Classification::Modified);
        }

        // exists_matching
        let state = store.get_transfer_state_change(&payload.transfer_id).await?;
        match state {
            None => Ok(Classification::Anomaly),
            Some(TransferState::Committed) | Some(TransferState::Aborted) => {
                let transfer = store
                    .get_by_id(&payload.transfer_id)
                    .await?
                    .ok_or_else(|| crate::error::CoreError::Store {
                        message: format!(
                            "transfer {} classified finalized-replay but missing from store",
                            payload.transfer_id
                        ),
                    })?;
                Ok(Classification::FinalizedReplay { transfer })
            }
            Some(TransferState::Received) | Some(TransferState::Reserved) => {
                Ok(Classification::InFlight)
            }
        }
    }
}

/// Error code a [`Classification`] maps to for a failure-path notification,
/// if any.
pub fn classification_error_code(classification: &Classification) -> Option<i32> {
    match classification {
        Classification::Anomaly => Some(error_codes::GENERIC_VALIDATION),
        Classification::Modified => Some(error_codes::MODIFIED_REQUEST),
        _ => None,
    }
}
