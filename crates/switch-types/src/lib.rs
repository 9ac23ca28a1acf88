//! switch-types - Canonical domain types for the transfer orchestration core
//!
//! Zero dependencies on other switch crates. Defines the complete wire and
//! storage type system for a two-phase, Interledger-style transfer:
//!
//! - Identity types (`TransferId`, `ParticipantId`)
//! - `Amount` (currency + decimal string, preserved verbatim for fingerprinting)
//! - `Transfer` / `TransferState` and their legal transitions
//! - `EventEnvelope`, the on-bus message shape
//! - The stable error-code table shared by every producer of a failure event

pub mod amount;
pub mod envelope;
pub mod error;
pub mod extension;
pub mod transfer;

pub use amount::*;
pub use envelope::*;
pub use error::*;
pub use extension::*;
pub use transfer::*;
