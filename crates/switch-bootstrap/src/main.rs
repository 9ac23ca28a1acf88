//! switch-core bootstrap binary.
//!
//! Thin wiring layer: load configuration, initialize logging, construct the
//! reference store/bus gateways, and register every handler. The actual
//! transfer lifecycle lives entirely in `switch-core` - this binary never
//! touches `TransferState` or a wire error code directly.

use clap::Parser;
use std::sync::Arc;
use switch_core::bus::InMemoryBus;
use switch_core::fulfil::FulfilCoordinator;
use switch_core::prepare::PrepareCoordinator;
use switch_core::router::TransferEventRouter;
use switch_core::store::InMemoryStore;
use switch_core::validator::{StaticCurrencyDirectory, StaticParticipantDirectory};
use switch_core::{BusGateway, HandlerRegistrar, StoreGateway};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// switch-core - transfer orchestration switch
#[derive(Parser, Debug)]
#[command(name = "switch-core", about = "Event-bus-driven two-phase transfer orchestration switch", version)]
struct Args {
    /// Bus broker address, passed through to every consumer's config.
    #[arg(long, default_value = "localhost:9092", env = "SWITCH_BROKER")]
    broker: String,

    /// Consumer group id shared by every bound handler.
    #[arg(long, default_value = "switch-core", env = "SWITCH_GROUP_ID")]
    group_id: String,

    /// Comma-separated list of participant FSP identifiers to onboard at
    /// startup. If empty, the store is asked for its known participants
    /// (empty for the in-memory store unless seeded here).
    #[arg(long, value_delimiter = ',', env = "SWITCH_PARTICIPANTS")]
    participants: Vec<String>,

    /// Comma-separated list of settlement currencies this switch accepts.
    #[arg(long, value_delimiter = ',', default_value = "USD", env = "SWITCH_CURRENCIES")]
    currencies: Vec<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(broker = %args.broker, group_id = %args.group_id, "starting switch-core");

    let store = Arc::new(InMemoryStore::with_participants(args.participants.clone()));
    let bus = Arc::new(InMemoryBus::new());
    let participants = Arc::new(StaticParticipantDirectory::new(args.participants.clone()));
    let currencies = Arc::new(StaticCurrencyDirectory::new(args.currencies.clone()));

    let prepare = Arc::new(PrepareCoordinator::new(
        store.clone() as Arc<dyn StoreGateway>,
        bus.clone() as Arc<dyn BusGateway>,
        participants,
        currencies,
    ));
    let fulfil = Arc::new(FulfilCoordinator::new(
        store.clone() as Arc<dyn StoreGateway>,
        bus.clone() as Arc<dyn BusGateway>,
    ));
    let router = Arc::new(TransferEventRouter::new(bus.clone() as Arc<dyn BusGateway>));

    let registrar = HandlerRegistrar::new(
        store as Arc<dyn StoreGateway>,
        bus as Arc<dyn BusGateway>,
        prepare,
        fulfil,
        router,
        args.broker,
        args.group_id,
    );

    match registrar.register_all_handlers().await {
        Ok(report) => {
            tracing::info!(
                prepare_topics = report.prepare_topics.len(),
                fulfil_bound = report.fulfil_bound,
                transfer_bound = report.transfer_bound,
                "handler registration complete"
            );
        }
        Err(err) => {
            tracing::error!(error = %err, "handler registration failed");
            std::process::exit(1);
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
