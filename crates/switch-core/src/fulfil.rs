//! Fulfil coordinator: the commit/reject/timeout pipeline.
//!
//! Checks are strictly ordered: fulfilment cryptography is checked before
//! state and before expiry, so a forged fulfilment against an expired
//! transfer still reports "modified request", not "expired" - this avoids
//! leaking state to a caller who has not proven they hold the fulfilment.

use crate::bus::{topics, BusGateway};
use crate::outcome::Outcome;
use crate::store::{FulfilUpdate, RejectUpdate, StoreGateway};
use crate::validator::FulfilmentValidator;
use std::sync::Arc;
use switch_types::{
    error_codes, EventAction, EventEnvelope, EventState, EventType, ErrorInformation, FulfilPayload,
    Transfer, TransferState,
};
use tracing::{info, warn};

pub struct FulfilCoordinator {
    store: Arc<dyn StoreGateway>,
    bus: Arc<dyn BusGateway>,
}

#[derive(Debug, serde::Deserialize)]
struct TimeoutReservedPayload {
    transfer_id: String,
}

impl FulfilCoordinator {
    pub fn new(store: Arc<dyn StoreGateway>, bus: Arc<dyn BusGateway>) -> Self {
        Self { store, bus }
    }

    pub async fn commit(&self, bus_error: Option<String>, envelope: EventEnvelope) -> Outcome {
        if let Some(message) = bus_error {
            return Outcome::Fatal { message };
        }
        self.handle(envelope).await
    }

    async fn handle(&self, envelope: EventEnvelope) -> Outcome {
        let topic = topics::fulfil_topic();
        let action = envelope.metadata.event.action;
        let event_type = envelope.metadata.event.event_type;

        if event_type != EventType::Fulfil
            || !matches!(
                action,
                EventAction::Commit | EventAction::Reject | EventAction::TimeoutReserved
            )
        {
            return self
                .reject_protocol_violation(&topic, &envelope, error_codes::GENERIC_INTERNAL, vec![])
                .await;
        }

        match action {
            EventAction::TimeoutReserved => self.handle_timeout(&topic, &envelope).await,
            EventAction::Commit | EventAction::Reject => self.handle_fulfil(&topic, &envelope, action).await,
            _ => unreachable!(),
        }
    }

    async fn handle_fulfil(&self, topic: &str, envelope: &EventEnvelope, action: EventAction) -> Outcome {
        let payload: FulfilPayload = match serde_json::from_value(envelope.content.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return Outcome::Internal {
                    message: format!("unparsable fulfil payload: {}", err),
                }
            }
        };

        // Step 1: existing transfer must exist.
        let existing = match self.store.get_by_id(&payload.transfer_id).await {
            Ok(Some(transfer)) => transfer,
            Ok(None) => {
                return self
                    .reject_protocol_violation(
                        topic,
                        envelope,
                        error_codes::GENERIC_INTERNAL,
                        payload.extension_list.clone(),
                    )
                    .await
            }
            Err(err) => {
                return Outcome::Internal {
                    message: err.to_string(),
                }
            }
        };

        // Step 2: fulfilment cryptography, checked before state and expiry.
        if !FulfilmentValidator::verify_fulfilment(&payload.fulfilment, &existing.condition) {
            return self
                .reject_protocol_violation(
                    topic,
                    envelope,
                    error_codes::MODIFIED_REQUEST,
                    payload.extension_list.clone(),
                )
                .await;
        }

        // Step 3: state must be RESERVED.
        if existing.transfer_state != TransferState::Reserved {
            return self
                .reject_protocol_violation(
                    topic,
                    envelope,
                    error_codes::GENERIC_INTERNAL,
                    payload.extension_list.clone(),
                )
                .await;
        }

        // Step 4: must not be expired. Gated on wall-clock time, not the
        // inbound `completedTimestamp` - that value is supplied by the
        // producer of the FULFIL message and an early timestamp there must
        // not be able to sneak a late commit past expiry.
        if existing.is_expired_at(chrono::Utc::now()) {
            return self
                .reject_protocol_violation(
                    topic,
                    envelope,
                    error_codes::TRANSFER_EXPIRED,
                    payload.extension_list.clone(),
                )
                .await;
        }

        match action {
            EventAction::Commit => self.do_commit(topic, envelope, &existing, &payload).await,
            EventAction::Reject => self.do_reject(topic, envelope, &existing).await,
            _ => unreachable!(),
        }
    }

    async fn do_commit(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
        existing: &Transfer,
        payload: &FulfilPayload,
    ) -> Outcome {
        if let Err(err) = self
            .store
            .fulfil(
                &payload.transfer_id,
                FulfilUpdate {
                    fulfilment: payload.fulfilment.clone(),
                    completed_timestamp: payload.completed_timestamp,
                },
            )
            .await
        {
            return Outcome::Internal {
                message: err.to_string(),
            };
        }
        if let Err(err) = self.bus.commit_message_sync(topic, &envelope.id).await {
            return Outcome::Fatal {
                message: err.to_string(),
            };
        }
        let position_envelope = EventEnvelope::new(
            &envelope.id,
            &existing.payer_fsp,
            &existing.payee_fsp,
            serde_json::to_value(payload).unwrap_or_default(),
            EventType::Position,
            EventAction::Commit,
            EventState::success(),
        );
        match self
            .bus
            .produce_participant_message(&existing.payee_fsp, EventType::Position, EventAction::Commit, position_envelope)
            .await
        {
            Ok(_) => {
                info!(transfer_id = %existing.transfer_id, "transfer committed");
                Outcome::Ok
            }
            Err(err) => Outcome::Fatal {
                message: err.to_string(),
            },
        }
    }

    async fn do_reject(&self, topic: &str, envelope: &EventEnvelope, existing: &Transfer) -> Outcome {
        if let Err(err) = self
            .store
            .reject(
                &existing.transfer_id,
                RejectUpdate {
                    error_code: error_codes::GENERIC_VALIDATION,
                    error_description: "rejected by payee".to_string(),
                },
            )
            .await
        {
            return Outcome::Internal {
                message: err.to_string(),
            };
        }
        if let Err(err) = self.bus.commit_message_sync(topic, &envelope.id).await {
            return Outcome::Fatal {
                message: err.to_string(),
            };
        }
        let position_envelope = EventEnvelope::new(
            &envelope.id,
            &existing.payer_fsp,
            &existing.payee_fsp,
            serde_json::json!({ "transferId": existing.transfer_id }),
            EventType::Position,
            EventAction::Reject,
            EventState::success(),
        );
        match self
            .bus
            .produce_participant_message(&existing.payer_fsp, EventType::Position, EventAction::Reject, position_envelope)
            .await
        {
            Ok(_) => {
                info!(transfer_id = %existing.transfer_id, "transfer rejected");
                Outcome::Ok
            }
            Err(err) => Outcome::Fatal {
                message: err.to_string(),
            },
        }
    }

    /// `TIMEOUT_RESERVED` forwarding: forces `RESERVED -> ABORTED` and
    /// notifies the payer, the same way a rejection does, reusing error code
    /// 3303 since a reservation timeout is definitionally an expiry.
    async fn handle_timeout(&self, topic: &str, envelope: &EventEnvelope) -> Outcome {
        let payload: TimeoutReservedPayload = match serde_json::from_value(envelope.content.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return Outcome::Internal {
                    message: format!("unparsable timeout-reserved payload: {}", err),
                }
            }
        };

        let existing = match self.store.get_by_id(&payload.transfer_id).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                return self
                    .reject_protocol_violation(topic, envelope, error_codes::GENERIC_INTERNAL, vec![])
                    .await
            }
            Err(err) => {
                return Outcome::Internal {
                    message: err.to_string(),
                }
            }
        };

        if existing.transfer_state != TransferState::Reserved {
            // Already terminal: a transfer never leaves COMMITTED/ABORTED.
            // Commit and do nothing further.
            if let Err(err) = self.bus.commit_message_sync(topic, &envelope.id).await {
                return Outcome::Fatal {
                    message: err.to_string(),
                };
            }
            warn!(transfer_id = %existing.transfer_id, state = %existing.transfer_state, "timeout-reserved for a non-reserved transfer, ignoring");
            return Outcome::Ok;
        }

        if let Err(err) = self
            .store
            .reject(
                &existing.transfer_id,
                RejectUpdate {
                    error_code: error_codes::TRANSFER_EXPIRED,
                    error_description: "reservation timed out".to_string(),
                },
            )
            .await
        {
            return Outcome::Internal {
                message: err.to_string(),
            };
        }
        if let Err(err) = self.bus.commit_message_sync(topic, &envelope.id).await {
            return Outcome::Fatal {
                message: err.to_string(),
            };
        }
        let position_envelope = EventEnvelope::new(
            &envelope.id,
            &existing.payer_fsp,
            &existing.payee_fsp,
            serde_json::json!({ "transferId": existing.transfer_id }),
            EventType::Position,
            EventAction::Abort,
            EventState::success(),
        );
        match self
            .bus
            .produce_participant_message(&existing.payer_fsp, EventType::Position, EventAction::Abort, position_envelope)
            .await
        {
            Ok(_) => Outcome::Ok,
            Err(err) => Outcome::Fatal {
                message: err.to_string(),
            },
        }
    }

    async fn reject_protocol_violation(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
        code: i32,
        extensions: Vec<switch_types::Extension>,
    ) -> Outcome {
        if let Err(err) = self.bus.commit_message_sync(topic, &envelope.id).await {
            return Outcome::Fatal {
                message: err.to_string(),
            };
        }
        let info = ErrorInformation::new(code, error_codes::describe(code)).with_extensions(extensions);
        let notification = EventEnvelope::new(
            &envelope.id,
            &envelope.from,
            &envelope.to,
            serde_json::json!({ "errorInformation": info }),
            EventType::Notification,
            envelope.metadata.event.action,
            EventState::failure(info.error_code, info.error_description.clone()),
        );
        match self
            .bus
            .produce_general_message(EventType::Notification, envelope.metadata.event.action, notification)
            .await
        {
            Ok(_) => Outcome::ProtocolFailure { info },
            Err(err) => Outcome::Fatal {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use chrono::{Duration, Utc};
    use sha2::{Digest, Sha256};
    use switch_types::{Amount, PreparePayload};

    async fn setup_with_reserved_transfer(expiration: chrono::DateTime<Utc>) -> (FulfilCoordinator, Arc<InMemoryBus>, Arc<crate::store::InMemoryStore>, String) {
        let store = Arc::new(crate::store::InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let prepare_payload = PreparePayload {
            transfer_id: "t1".to_string(),
            payer_fsp: "dfspA".to_string(),
            payee_fsp: "dfspB".to_string(),
            amount: Amount::new("USD", "100.00"),
            ilp_packet: STANDARD.encode(b"packet-bytes"),
            condition: URL_SAFE_NO_PAD.encode(Sha256::digest(b"preimage")),
            expiration_date: expiration,
            extension_list: Vec::new(),
        };
        store.prepare(&prepare_payload, None, true).await.unwrap();
        let coordinator = FulfilCoordinator::new(
            store.clone() as Arc<dyn StoreGateway>,
            bus.clone() as Arc<dyn BusGateway>,
        );
        (coordinator, bus, store, "preimage".to_string())
    }

    fn fulfil_envelope(transfer_id: &str, fulfilment: &str, action: EventAction) -> EventEnvelope {
        let payload = FulfilPayload {
            transfer_id: transfer_id.to_string(),
            fulfilment: fulfilment.to_string(),
            completed_timestamp: Utc::now(),
            extension_list: Vec::new(),
        };
        EventEnvelope::new(
            transfer_id,
            "dfspB",
            "dfspA",
            serde_json::to_value(&payload).unwrap(),
            EventType::Fulfil,
            action,
            EventState::success(),
        )
    }

    #[tokio::test]
    async fn happy_commit_transitions_to_committed_and_produces_position_commit() {
        let (coordinator, bus, store, preimage) =
            setup_with_reserved_transfer(Utc::now() + Duration::days(1)).await;
        let fulfilment = URL_SAFE_NO_PAD.encode(preimage.as_bytes());
        let envelope = fulfil_envelope("t1", &fulfilment, EventAction::Commit);

        let outcome = coordinator.commit(None, envelope).await;
        assert!(matches!(outcome, Outcome::Ok));

        let transfer = store.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(transfer.transfer_state, TransferState::Committed);

        let produced = bus.produced_on("topic-dfspB-position-commit").await;
        assert_eq!(produced.len(), 1);
    }

    #[tokio::test]
    async fn fulfil_mismatch_is_reported_as_3106_and_state_unchanged() {
        let (coordinator, bus, store, _preimage) =
            setup_with_reserved_transfer(Utc::now() + Duration::days(1)).await;
        let wrong_fulfilment = URL_SAFE_NO_PAD.encode(b"deadbeef");
        let envelope = fulfil_envelope("t1", &wrong_fulfilment, EventAction::Commit);

        let outcome = coordinator.commit(None, envelope).await;
        assert!(matches!(outcome, Outcome::ProtocolFailure { .. }));

        let transfer = store.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(transfer.transfer_state, TransferState::Reserved);

        let notifications = bus.produced_on("topic-transfer-notification").await;
        assert_eq!(notifications[0].metadata.event.state.code, Some(3106));
    }

    #[tokio::test]
    async fn expired_fulfil_is_reported_as_3303_and_state_stays_reserved() {
        let (coordinator, bus, store, preimage) =
            setup_with_reserved_transfer(Utc::now() - Duration::days(1)).await;
        let fulfilment = URL_SAFE_NO_PAD.encode(preimage.as_bytes());
        let envelope = fulfil_envelope("t1", &fulfilment, EventAction::Commit);

        let outcome = coordinator.commit(None, envelope).await;
        assert!(matches!(outcome, Outcome::ProtocolFailure { .. }));

        let transfer = store.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(transfer.transfer_state, TransferState::Reserved);

        let notifications = bus.produced_on("topic-transfer-notification").await;
        assert_eq!(notifications[0].metadata.event.state.code, Some(3303));
    }

    #[tokio::test]
    async fn forged_fulfilment_against_expired_transfer_reports_modified_not_expired() {
        // Ordering property: fulfilment cryptography is checked
        // before expiry, so a wrong fulfilment on an expired transfer must
        // still report 3106, never 3303.
        let (coordinator, bus, _store, _preimage) =
            setup_with_reserved_transfer(Utc::now() - Duration::days(1)).await;
        let wrong_fulfilment = URL_SAFE_NO_PAD.encode(b"deadbeef");
        let envelope = fulfil_envelope("t1", &wrong_fulfilment, EventAction::Commit);

        coordinator.commit(None, envelope).await;

        let notifications = bus.produced_on("topic-transfer-notification").await;
        assert_eq!(notifications[0].metadata.event.state.code, Some(3106));
    }

    #[tokio::test]
    async fn fulfil_for_unknown_transfer_is_internal_failure_2001() {
        let store = Arc::new(crate::store::InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let coordinator = FulfilCoordinator::new(
            store.clone() as Arc<dyn StoreGateway>,
            bus.clone() as Arc<dyn BusGateway>,
        );
        let fulfilment = URL_SAFE_NO_PAD.encode(b"preimage");
        let envelope = fulfil_envelope("unknown-transfer", &fulfilment, EventAction::Commit);

        let outcome = coordinator.commit(None, envelope).await;
        assert!(matches!(outcome, Outcome::ProtocolFailure { .. }));
        let notifications = bus.produced_on("topic-transfer-notification").await;
        assert_eq!(notifications[0].metadata.event.state.code, Some(2001));
    }

    #[tokio::test]
    async fn fulfil_after_already_committed_is_state_rule_failure() {
        let (coordinator, bus, _store, preimage) =
            setup_with_reserved_transfer(Utc::now() + Duration::days(1)).await;
        let fulfilment = URL_SAFE_NO_PAD.encode(preimage.as_bytes());
        coordinator
            .commit(None, fulfil_envelope("t1", &fulfilment, EventAction::Commit))
            .await;

        let second = coordinator
            .commit(None, fulfil_envelope("t1", &fulfilment, EventAction::Commit))
            .await;
        assert!(matches!(second, Outcome::ProtocolFailure { .. }));
        let notifications = bus.produced_on("topic-transfer-notification").await;
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[1].metadata.event.state.code, Some(2001));
    }

    #[tokio::test]
    async fn timeout_reserved_aborts_and_notifies_payer_position() {
        let (coordinator, bus, store, _preimage) =
            setup_with_reserved_transfer(Utc::now() + Duration::days(1)).await;
        let envelope = EventEnvelope::new(
            "t1",
            "timeout-handler",
            "dfspA",
            serde_json::json!({ "transferId": "t1" }),
            EventType::Fulfil,
            EventAction::TimeoutReserved,
            EventState::success(),
        );
        let outcome = coordinator.commit(None, envelope).await;
        assert!(matches!(outcome, Outcome::Ok));

        let transfer = store.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(transfer.transfer_state, TransferState::Aborted);

        let produced = bus.produced_on("topic-dfspA-position-abort").await;
        assert_eq!(produced.len(), 1);
    }
}
