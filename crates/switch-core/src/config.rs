//! Consumer configuration: "Consumer configuration (broker list,
//! group id, session timeout, auto-commit flag) is sourced from an external
//! configuration keyed by `(CONSUMER, TRANSFER, <ACTION>)`. The core does
//! not mandate a format" - so this module defines the shape only.
//! `switch-bootstrap` is responsible for populating it from the environment.

use serde::{Deserialize, Serialize};

/// The first two components of the config key are always `CONSUMER` /
/// `TRANSFER`; `EventKind` exists so the key shape is explicit
/// in code rather than implied by a string constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Transfer,
}

/// The `<ACTION>` component of the config key. One topic group
/// per action: all per-participant PREPARE topics share the `Prepare`
/// config, the shared FULFIL topic uses `Fulfil`, the shared TRANSFER topic
/// uses `Transfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Prepare,
    Fulfil,
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub event_kind: EventKind,
    pub action: Action,
    pub broker_list: Vec<String>,
    pub group_id: String,
    pub session_timeout_ms: u64,
    pub auto_commit: bool,
}

impl ConsumerConfig {
    pub fn new(
        event_kind: EventKind,
        action: Action,
        broker: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            event_kind,
            action,
            broker_list: vec![broker.into()],
            group_id: group_id.into(),
            session_timeout_ms: 10_000,
            // Manual commit is the default posture for every consumer this crate binds.
            auto_commit: false,
        }
    }
}
