//! Prepare coordinator: the per-message prepare pipeline.

use crate::bus::{topics, BusGateway};
use crate::outcome::Outcome;
use crate::resolver::{classification_error_code, Classification, DuplicateResolver};
use crate::store::StoreGateway;
use crate::validator::{CurrencyDirectory, FulfilmentValidator, ParticipantDirectory};
use std::sync::Arc;
use switch_types::{error_codes, EventAction, EventEnvelope, EventState, EventType, ErrorInformation, PreparePayload};
use tracing::{info, warn};

pub struct PrepareCoordinator {
    store: Arc<dyn StoreGateway>,
    bus: Arc<dyn BusGateway>,
    participants: Arc<dyn ParticipantDirectory>,
    currencies: Arc<dyn CurrencyDirectory>,
}

impl PrepareCoordinator {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        bus: Arc<dyn BusGateway>,
        participants: Arc<dyn ParticipantDirectory>,
        currencies: Arc<dyn CurrencyDirectory>,
    ) -> Self {
        Self {
            store,
            bus,
            participants,
            currencies,
        }
    }

    /// The consumer callback. `bus_error` models the bus
    /// framework's fatal dispatch-error argument; when set, this is a fatal
    /// processing error and the handler framework decides restart policy
    /// - we never commit or produce in that case.
    pub async fn prepare(&self, bus_error: Option<String>, envelope: EventEnvelope) -> Outcome {
        if let Some(message) = bus_error {
            return Outcome::Fatal { message };
        }
        self.handle(envelope).await
    }

    async fn handle(&self, envelope: EventEnvelope) -> Outcome {
        let topic = topics::prepare_topic(&envelope.from);

        // Step 1: resolve the per-participant PREPARE topic and fetch its
        // consumer. If none is bound, return success without acting.
        if !self.bus.has_consumer(&topic).await {
            warn!(topic = %topic, "no prepare handler bound for participant, skipping");
            return Outcome::NoOp;
        }

        let payload: PreparePayload = match serde_json::from_value(envelope.content.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return Outcome::Internal {
                    message: format!("unparsable prepare payload: {}", err),
                }
            }
        };

        // Step 2: duplicate resolution. Every classification except `New`
        // commits the offset and emits the dictated downstream event.
        let classification = match DuplicateResolver::classify(self.store.as_ref(), &payload).await {
            Ok(c) => c,
            Err(err) => {
                return Outcome::Internal {
                    message: format!("store error during duplicate resolution: {}", err),
                }
            }
        };

        if !classification.is_new() {
            return self.handle_duplicate(&topic, &envelope, &payload, classification).await;
        }

        // Step 3: business-rule validation.
        let validation = FulfilmentValidator::validate_by_name(
            &payload,
            chrono::Utc::now(),
            self.participants.as_ref(),
            self.currencies.as_ref(),
        );
        let reasons = validation.reasons();

        // Step 4: persist. Store errors commit the offset and emit
        // NOTIFICATION failure(2001): a store failure is treated as transient-or-internal, never silently dropped.
        let store_reason = if validation.validation_passed {
            None
        } else {
            Some(reasons.join("; "))
        };
        if let Err(err) = self
            .store
            .prepare(&payload, store_reason, validation.validation_passed)
            .await
        {
            if let Err(commit_err) = self.bus.commit_message_sync(&topic, &envelope.id).await {
                return Outcome::Fatal {
                    message: format!("failed to commit after store error: {}", commit_err),
                };
            }
            let info = ErrorInformation::new(error_codes::GENERIC_INTERNAL, err.to_string())
                .with_extensions(payload.extension_list.clone());
            if let Err(produce_err) = self.produce_notification_failure(&envelope, &info).await {
                return Outcome::Fatal {
                    message: produce_err.to_string(),
                };
            }
            return Outcome::Internal {
                message: err.to_string(),
            };
        }

        // Step 5: commit the offset before producing downstream.
        if let Err(err) = self.bus.commit_message_sync(&topic, &envelope.id).await {
            return Outcome::Fatal {
                message: format!("failed to commit prepare offset: {}", err),
            };
        }

        // Step 6: produce downstream.
        if validation.validation_passed {
            let position_envelope = EventEnvelope::new(
                &envelope.id,
                &payload.payer_fsp,
                &payload.payee_fsp,
                serde_json::to_value(&payload).unwrap_or_default(),
                EventType::Position,
                EventAction::Prepare,
                EventState::success(),
            );
            match self
                .bus
                .produce_participant_message(
                    &payload.payer_fsp,
                    EventType::Position,
                    EventAction::Prepare,
                    position_envelope,
                )
                .await
            {
                Ok(_) => {
                    info!(transfer_id = %payload.transfer_id, "prepare accepted, reserved");
                    Outcome::Ok
                }
                Err(err) => Outcome::Fatal {
                    message: err.to_string(),
                },
            }
        } else {
            if let Err(err) = self
                .store
                .log_transfer_error(&payload.transfer_id, error_codes::GENERIC_VALIDATION, &reasons.join("; "))
                .await
            {
                warn!(error = %err, "failed to log transfer error for invalid prepare");
            }
            let description = format!(
                "{}: {}",
                error_codes::describe(error_codes::GENERIC_VALIDATION),
                reasons.join("; ")
            );
            let info = ErrorInformation::new(error_codes::GENERIC_VALIDATION, description)
                .with_extensions(payload.extension_list.clone());
            match self.produce_notification_failure(&envelope, &info).await {
                Ok(_) => Outcome::ProtocolFailure { info },
                Err(err) => Outcome::Fatal {
                    message: err.to_string(),
                },
            }
        }
    }

    async fn handle_duplicate(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
        payload: &PreparePayload,
        classification: Classification,
    ) -> Outcome {
        if let Err(err) = self.bus.commit_message_sync(topic, &envelope.id).await {
            return Outcome::Fatal {
                message: format!("failed to commit duplicate-prepare offset: {}", err),
            };
        }

        match classification {
            Classification::InFlight => {
                // Silent no-op: no downstream event.
                Outcome::Ok
            }
            Classification::FinalizedReplay { transfer } => {
                let notification = EventEnvelope::new(
                    &envelope.id,
                    &envelope.from,
                    &envelope.to,
                    serde_json::to_value(&transfer).unwrap_or_default(),
                    EventType::Notification,
                    EventAction::PrepareDuplicate,
                    EventState::success(),
                );
                match self
                    .bus
                    .produce_general_message(EventType::Notification, EventAction::PrepareDuplicate, notification)
                    .await
                {
                    Ok(_) => Outcome::Ok,
                    Err(err) => Outcome::Fatal {
                        message: err.to_string(),
                    },
                }
            }
            Classification::Anomaly | Classification::Modified => {
                let code = classification_error_code(&classification)
                    .unwrap_or(error_codes::GENERIC_VALIDATION);
                let info = ErrorInformation::new(code, error_codes::describe(code))
                    .with_extensions(payload.extension_list.clone());
                match self.produce_notification_failure(envelope, &info).await {
                    Ok(_) => Outcome::ProtocolFailure { info },
                    Err(err) => Outcome::Fatal {
                        message: err.to_string(),
                    },
                }
            }
            Classification::New => unreachable!("handled by caller"),
        }
    }

    async fn produce_notification_failure(
        &self,
        envelope: &EventEnvelope,
        info: &ErrorInformation,
    ) -> crate::error::Result<()> {
        let notification = EventEnvelope::new(
            &envelope.id,
            &envelope.from,
            &envelope.to,
            serde_json::json!({ "errorInformation": info }),
            EventType::Notification,
            EventAction::Prepare,
            EventState::failure(info.error_code, info.error_description.clone()),
        );
        self.bus
            .produce_general_message(EventType::Notification, EventAction::Prepare, notification)
            .await
            .map(|_| ())
    }
}
