//! Error types and the stable wire error-code table

use thiserror::Error;

/// Errors raised while constructing or validating data-model values.
///
/// This is distinct from the dispatch-outcome enum the coordinators return
/// (see `switch_core::Outcome`) - those are not propagated via `?`, they are
/// the terminal result of a pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("malformed amount: {message}")]
    MalformedAmount { message: String },

    #[error("unknown transfer state: {value}")]
    UnknownTransferState { value: String },

    #[error("unknown event type: {value}")]
    UnknownEventType { value: String },

    #[error("unknown event action: {value}")]
    UnknownEventAction { value: String },

    #[error("invalid base64url value for field {field}")]
    InvalidBase64 { field: String },
}

pub type Result<T> = std::result::Result<T, SwitchError>;

/// The stable wire error-code table. Kept as a single module so
/// every producer of a failure event references the same constants instead
/// of inlining magic numbers.
pub mod error_codes {
    /// Generic internal error.
    pub const GENERIC_INTERNAL: i32 = 2001;
    /// Generic validation error.
    pub const GENERIC_VALIDATION: i32 = 3100;
    /// Modified request - fingerprint mismatch or fulfilment mismatch.
    pub const MODIFIED_REQUEST: i32 = 3106;
    /// Transfer expired.
    pub const TRANSFER_EXPIRED: i32 = 3303;

    /// Human-readable description for a known code, used when the caller
    /// does not supply a more specific description.
    pub fn describe(code: i32) -> &'static str {
        match code {
            GENERIC_INTERNAL => "Generic internal error",
            GENERIC_VALIDATION => "Generic validation error",
            MODIFIED_REQUEST => "Modified request",
            TRANSFER_EXPIRED => "Transfer expired",
            _ => "Unknown error",
        }
    }
}

/// `TransferError` - append-only audit record of an error
/// encountered while processing a transfer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferError {
    pub transfer_id: String,
    pub error_code: i32,
    pub error_description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TransferError {
    pub fn new(
        transfer_id: impl Into<String>,
        error_code: i32,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            error_code,
            error_description: error_description.into(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// `errorInformation` as carried on the wire in a failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInformation {
    pub error_code: i32,
    pub error_description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_list: Vec<crate::extension::Extension>,
}

impl ErrorInformation {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            error_code: code,
            error_description: description.into(),
            extension_list: Vec::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<crate::extension::Extension>) -> Self {
        self.extension_list = extensions;
        self
    }
}
