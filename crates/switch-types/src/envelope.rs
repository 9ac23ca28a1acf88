//! `EventEnvelope`, the on-bus message shape.

use crate::error::{Result, SwitchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Transfer,
    Notification,
    Position,
    Fulfil,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Transfer => "transfer",
            EventType::Notification => "notification",
            EventType::Position => "position",
            EventType::Fulfil => "fulfil",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventAction {
    Prepare,
    Commit,
    Reject,
    Abort,
    TimeoutReserved,
    Transfer,
    PrepareDuplicate,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventAction::Prepare => "prepare",
            EventAction::Commit => "commit",
            EventAction::Reject => "reject",
            EventAction::Abort => "abort",
            EventAction::TimeoutReserved => "timeout-reserved",
            EventAction::Transfer => "transfer",
            EventAction::PrepareDuplicate => "prepare-duplicate",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Failure,
}

/// `metadata.event.state` - status plus an optional error code/description,
/// present when `status = failure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventState {
    pub status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventState {
    pub fn success() -> Self {
        Self {
            status: EventStatus::Success,
            code: None,
            description: None,
        }
    }

    pub fn failure(code: i32, description: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Failure,
            code: Some(code),
            description: Some(description.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub action: EventAction,
    pub state: EventState,
    pub created_at: DateTime<Utc>,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContent {
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadataWrapper {
    pub event: EventMetadata,
}

/// The full on-bus envelope. `content.payload`/`content.headers` are kept as
/// `serde_json::Value` rather than a fixed struct: different producers place
/// different payload shapes on the same topic type (a prepare payload, a
/// transfer snapshot on a duplicate replay, an `errorInformation` object on
/// failure), and unknown fields on any of them must be preserved through the
/// router rather than dropped by a rigid schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    pub from: String,
    pub to: String,
    pub content: EventContent,
    pub metadata: EventMetadataWrapper,
}

impl EventEnvelope {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        payload: Value,
        event_type: EventType,
        action: EventAction,
        state: EventState,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            content: EventContent {
                payload,
                headers: None,
            },
            metadata: EventMetadataWrapper {
                event: EventMetadata {
                    event_type,
                    action,
                    state,
                    created_at: Utc::now(),
                    id: uuid::Uuid::new_v4().to_string(),
                },
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.metadata.event.state.status, EventStatus::Success)
    }
}

pub fn parse_event_type(s: &str) -> Result<EventType> {
    match s {
        "transfer" => Ok(EventType::Transfer),
        "notification" => Ok(EventType::Notification),
        "position" => Ok(EventType::Position),
        "fulfil" => Ok(EventType::Fulfil),
        other => Err(SwitchError::UnknownEventType {
            value: other.to_string(),
        }),
    }
}
