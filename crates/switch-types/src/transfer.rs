//! `Transfer` and `TransferState`.

use crate::amount::Amount;
use crate::error::{Result, SwitchError};
use crate::extension::Extension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// TransferState: `RECEIVED -> RESERVED -> {COMMITTED, ABORTED}`,
/// with `RESERVED -> ABORTED` also reachable on timeout. `RECEIVED` is
/// treated as synonymous with `RESERVED` for in-flight duplicate
/// classification; no new transitions are added
/// beyond what the state machine above names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferState {
    Received,
    Reserved,
    Committed,
    Aborted,
}

impl TransferState {
    /// The human enumeration string exposed to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Received => "RECEIVED",
            TransferState::Reserved => "RESERVED",
            TransferState::Committed => "COMMITTED",
            TransferState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Committed | TransferState::Aborted)
    }

    /// Whether a transfer in this state is still awaiting a fulfil/reject
    /// decision - the `RECEIVED`/`RESERVED` branch of the duplicate
    /// classifier's in-flight case.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TransferState::Received | TransferState::Reserved)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransferState {
    type Err = SwitchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RECEIVED" => Ok(TransferState::Received),
            "RESERVED" => Ok(TransferState::Reserved),
            "COMMITTED" => Ok(TransferState::Committed),
            "ABORTED" => Ok(TransferState::Aborted),
            other => Err(SwitchError::UnknownTransferState {
                value: other.to_string(),
            }),
        }
    }
}

/// The prepare payload as received on a PREPARE topic.
/// Field order here matches the canonicalization order used by the
/// fingerprint: `transferId, payerFsp, payeeFsp, amount.currency,
/// amount.amount, ilpPacket, condition, expirationDate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparePayload {
    pub transfer_id: String,
    pub payer_fsp: String,
    pub payee_fsp: String,
    pub amount: Amount,
    /// Opaque octet string, base64-encoded on the wire.
    pub ilp_packet: String,
    /// 32-byte value, base64url-encoded on the wire.
    pub condition: String,
    pub expiration_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_list: Vec<Extension>,
}

/// The fulfil payload as received on the shared FULFIL topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfilPayload {
    pub transfer_id: String,
    /// 32-byte preimage, base64url-encoded on the wire.
    pub fulfilment: String,
    pub completed_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_list: Vec<Extension>,
}

/// The stored/full `Transfer` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub transfer_id: String,
    pub payer_fsp: String,
    pub payee_fsp: String,
    pub amount: Amount,
    pub ilp_packet: String,
    pub condition: String,
    pub expiration_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_list: Vec<Extension>,
    pub transfer_state: TransferState,
    /// Present only after commit.
    pub fulfilment: Option<String>,
}

impl Transfer {
    pub fn from_prepare(payload: &PreparePayload, state: TransferState) -> Self {
        Self {
            transfer_id: payload.transfer_id.clone(),
            payer_fsp: payload.payer_fsp.clone(),
            payee_fsp: payload.payee_fsp.clone(),
            amount: payload.amount.clone(),
            ilp_packet: payload.ilp_packet.clone(),
            condition: payload.condition.clone(),
            expiration_date: payload.expiration_date,
            extension_list: payload.extension_list.clone(),
            transfer_state: state,
            fulfilment: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_state_round_trips_through_display_and_parse() {
        for state in [
            TransferState::Received,
            TransferState::Reserved,
            TransferState::Committed,
            TransferState::Aborted,
        ] {
            let parsed: TransferState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn terminal_states_are_committed_and_aborted_only() {
        assert!(!TransferState::Received.is_terminal());
        assert!(!TransferState::Reserved.is_terminal());
        assert!(TransferState::Committed.is_terminal());
        assert!(TransferState::Aborted.is_terminal());
    }

    #[test]
    fn in_flight_states_are_received_and_reserved() {
        assert!(TransferState::Received.is_in_flight());
        assert!(TransferState::Reserved.is_in_flight());
        assert!(!TransferState::Committed.is_in_flight());
        assert!(!TransferState::Aborted.is_in_flight());
    }

    /// The literal PREPARE payload from spec.md scenario S1 must deserialize
    /// as-is: the wire contract is camelCase, not the struct's field names.
    #[test]
    fn prepare_payload_deserializes_from_camel_case_wire_json() {
        let wire = serde_json::json!({
            "transferId": "t1",
            "payerFsp": "dfspA",
            "payeeFsp": "dfspB",
            "amount": { "currency": "USD", "amount": "100.00" },
            "ilpPacket": "AQA=",
            "condition": "Q29uZDE",
            "expirationDate": "2099-01-01T00:00:00Z",
            "extensionList": []
        });
        let payload: PreparePayload = serde_json::from_value(wire).unwrap();
        assert_eq!(payload.transfer_id, "t1");
        assert_eq!(payload.payer_fsp, "dfspA");
        assert_eq!(payload.ilp_packet, "AQA=");
    }

    #[test]
    fn transfer_serializes_transfer_state_in_camel_case() {
        let payload = PreparePayload {
            transfer_id: "t1".to_string(),
            payer_fsp: "dfspA".to_string(),
            payee_fsp: "dfspB".to_string(),
            amount: Amount::new("USD", "100.00"),
            ilp_packet: "AQA=".to_string(),
            condition: "Q29uZDE".to_string(),
            expiration_date: Utc::now(),
            extension_list: Vec::new(),
        };
        let transfer = Transfer::from_prepare(&payload, TransferState::Reserved);
        let wire = serde_json::to_value(&transfer).unwrap();
        assert_eq!(wire["transferState"], "RESERVED");
        assert_eq!(wire["transferId"], "t1");
        assert!(wire.get("transfer_id").is_none());
    }
}
