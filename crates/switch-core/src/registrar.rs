//! Handler registrar: binds the coordinators and router to topics.
//!
//! Binds the coordinators to topics and spawns one worker task per bound
//! consumer - "the bus client owns the worker loop".
//! Registration failures propagate to the caller, but a partial
//! registration (e.g. 8 of 10 participant consumers bound) is left in
//! place rather than rolled back; it is on the caller to decide whether a
//! partial [`RegistrationReport`] is acceptable to start serving on.

use crate::bus::{topics, BusGateway};
use crate::config::{Action, ConsumerConfig, EventKind};
use crate::error::{CoreError, Result};
use crate::fulfil::FulfilCoordinator;
use crate::outcome::Outcome;
use crate::prepare::PrepareCoordinator;
use crate::router::TransferEventRouter;
use crate::store::StoreGateway;
use std::sync::Arc;
use tracing::{error, info};

/// What actually got bound during a registration pass.
#[derive(Debug, Clone, Default)]
pub struct RegistrationReport {
    pub prepare_topics: Vec<String>,
    pub fulfil_bound: bool,
    pub transfer_bound: bool,
}

impl RegistrationReport {
    fn merge(&mut self, other: RegistrationReport) {
        self.prepare_topics.extend(other.prepare_topics);
        self.fulfil_bound |= other.fulfil_bound;
        self.transfer_bound |= other.transfer_bound;
    }
}

pub struct HandlerRegistrar {
    store: Arc<dyn StoreGateway>,
    bus: Arc<dyn BusGateway>,
    prepare: Arc<PrepareCoordinator>,
    fulfil: Arc<FulfilCoordinator>,
    router: Arc<TransferEventRouter>,
    broker: String,
    group_id: String,
}

impl HandlerRegistrar {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        bus: Arc<dyn BusGateway>,
        prepare: Arc<PrepareCoordinator>,
        fulfil: Arc<FulfilCoordinator>,
        router: Arc<TransferEventRouter>,
        broker: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bus,
            prepare,
            fulfil,
            router,
            broker: broker.into(),
            group_id: group_id.into(),
        }
    }

    /// `registerAllHandlers()`: binds PREPARE consumers for
    /// every known participant, then the shared FULFIL and TRANSFER
    /// consumers.
    pub async fn register_all_handlers(&self) -> Result<RegistrationReport> {
        let mut report = self.register_prepare_handlers(None).await?;
        report.merge(self.register_fulfil_handler().await?);
        report.merge(self.register_transfer_handler().await?);
        Ok(report)
    }

    /// `registerPrepareHandlers(participantNames?)`: if no list
    /// is given, the participant directory is queried for every known
    /// name. An empty resulting list is reported as "no work", not an
    /// error - a switch with zero onboarded participants is a legitimate,
    /// if useless, starting state.
    pub async fn register_prepare_handlers(
        &self,
        participant_names: Option<Vec<String>>,
    ) -> Result<RegistrationReport> {
        let names = match participant_names {
            Some(names) => names,
            None => self.store.list_participants().await.map_err(|err| CoreError::Store {
                message: err.to_string(),
            })?,
        };

        if names.is_empty() {
            info!("no participants to bind prepare handlers for");
            return Ok(RegistrationReport::default());
        }

        let mut bound = Vec::with_capacity(names.len());
        for name in names {
            let topic = topics::prepare_topic(&name);
            let config = ConsumerConfig::new(EventKind::Transfer, Action::Prepare, self.broker.as_str(), self.group_id.as_str());
            let handle = self.bus.create_handler(&topic, config).await.map_err(|err| {
                CoreError::BusCommit {
                    topic: topic.clone(),
                    message: err.to_string(),
                }
            })?;
            let coordinator = self.prepare.clone();
            tokio::spawn(async move {
                run_worker(handle, move |envelope| {
                    let coordinator = coordinator.clone();
                    async move { coordinator.prepare(None, envelope).await }
                })
                .await;
            });
            info!(topic = %topic, "bound prepare handler");
            bound.push(topic);
        }

        Ok(RegistrationReport {
            prepare_topics: bound,
            ..Default::default()
        })
    }

    /// `registerFulfilHandler()`: a single consumer on the
    /// shared FULFIL topic.
    pub async fn register_fulfil_handler(&self) -> Result<RegistrationReport> {
        let topic = topics::fulfil_topic();
        let config = ConsumerConfig::new(EventKind::Transfer, Action::Fulfil, self.broker.as_str(), self.group_id.as_str());
        let handle = self.bus.create_handler(&topic, config).await.map_err(|err| CoreError::BusCommit {
            topic: topic.clone(),
            message: err.to_string(),
        })?;
        let coordinator = self.fulfil.clone();
        tokio::spawn(async move {
            run_worker(handle, move |envelope| {
                let coordinator = coordinator.clone();
                async move { coordinator.commit(None, envelope).await }
            })
            .await;
        });
        info!(topic = %topic, "bound fulfil handler");
        Ok(RegistrationReport {
            fulfil_bound: true,
            ..Default::default()
        })
    }

    /// `registerTransferHandler()`: a single consumer on the
    /// shared TRANSFER topic.
    pub async fn register_transfer_handler(&self) -> Result<RegistrationReport> {
        let topic = topics::transfer_topic();
        let config = ConsumerConfig::new(EventKind::Transfer, Action::Transfer, self.broker.as_str(), self.group_id.as_str());
        let handle = self.bus.create_handler(&topic, config).await.map_err(|err| CoreError::BusCommit {
            topic: topic.clone(),
            message: err.to_string(),
        })?;
        let router = self.router.clone();
        tokio::spawn(async move {
            run_worker(handle, move |envelope| {
                let router = router.clone();
                async move { router.route(None, envelope).await }
            })
            .await;
        });
        info!(topic = %topic, "bound transfer handler");
        Ok(RegistrationReport {
            transfer_bound: true,
            ..Default::default()
        })
    }
}

/// The generic worker loop: pull from a bound consumer and dispatch every
/// envelope to its coordinator, forever. A `Fatal` outcome is logged and
/// the loop continues - restart/backoff policy belongs to the bus client,
/// not to this crate.
async fn run_worker<F, Fut>(handle: crate::bus::ConsumerHandle, dispatch: F)
where
    F: Fn(switch_types::EventEnvelope) -> Fut,
    Fut: std::future::Future<Output = Outcome>,
{
    loop {
        match handle.recv().await {
            Some(envelope) => {
                let outcome = dispatch(envelope).await;
                if let Outcome::Fatal { message } = outcome {
                    error!(topic = %handle.topic, error = %message, "fatal error processing message");
                }
            }
            None => {
                info!(topic = %handle.topic, "consumer channel closed, worker exiting");
                break;
            }
        }
    }
}
