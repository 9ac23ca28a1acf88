//! Transfer-event router: fans terminal transfer events out to notification.
//!
//! Stateless: consumes the shared TRANSFER topic and forwards successful
//! envelopes to NOTIFICATION unchanged except for the topic, preserving the
//! original `action`. Anything that isn't a recognized transfer action, or
//! whose state isn't success, is a no-op other than a warning - the router
//! never fails a message it doesn't understand.

use crate::bus::{topics, BusGateway};
use crate::outcome::Outcome;
use std::sync::Arc;
use switch_types::{EventAction, EventEnvelope, EventType};
use tracing::warn;

const FORWARDED_ACTIONS: &[EventAction] = &[
    EventAction::Prepare,
    EventAction::Commit,
    EventAction::Reject,
    EventAction::Abort,
    EventAction::TimeoutReserved,
];

pub struct TransferEventRouter {
    bus: Arc<dyn BusGateway>,
}

impl TransferEventRouter {
    pub fn new(bus: Arc<dyn BusGateway>) -> Self {
        Self { bus }
    }

    pub async fn route(&self, bus_error: Option<String>, envelope: EventEnvelope) -> Outcome {
        if let Some(message) = bus_error {
            return Outcome::Fatal { message };
        }
        self.handle(envelope).await
    }

    async fn handle(&self, envelope: EventEnvelope) -> Outcome {
        let topic = topics::transfer_topic();
        let action = envelope.metadata.event.action;

        if !envelope.is_success() || !FORWARDED_ACTIONS.contains(&action) {
            if let Err(err) = self.bus.commit_message_sync(&topic, &envelope.id).await {
                return Outcome::Fatal {
                    message: err.to_string(),
                };
            }
            warn!(action = %action, success = envelope.is_success(), "not forwarding transfer event");
            return Outcome::NoOp;
        }

        if let Err(err) = self.bus.commit_message_sync(&topic, &envelope.id).await {
            return Outcome::Fatal {
                message: err.to_string(),
            };
        }

        let notification = EventEnvelope::new(
            &envelope.id,
            &envelope.from,
            &envelope.to,
            envelope.content.payload.clone(),
            EventType::Notification,
            action,
            envelope.metadata.event.state.clone(),
        );
        match self
            .bus
            .produce_general_message(EventType::Notification, action, notification)
            .await
        {
            Ok(_) => Outcome::Ok,
            Err(err) => Outcome::Fatal {
                message: err.to_string(),
            },
        }
    }
}
