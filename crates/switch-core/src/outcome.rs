//! The dispatch-outcome enum: source pipelines throw
//! to exit early; this is re-expressed as an explicit return value with a
//! single dispatch point at the end of each coordinator pipeline that
//! decides commit/produce behavior.

use switch_types::ErrorInformation;

/// What a coordinator pipeline decided to do with one inbound message.
#[derive(Debug)]
pub enum Outcome {
    /// Terminal success: the offset was committed and (if applicable) a
    /// downstream event was produced.
    Ok,
    /// A protocol-level rejection (duplicate mismatch, fulfilment mismatch,
    /// expired transfer, unknown action, ...). The offset is committed and a
    /// NOTIFICATION failure is produced describing `info`.
    ProtocolFailure { info: ErrorInformation },
    /// A store error. Treated as transient-or-internal: the
    /// offset is committed and a NOTIFICATION failure(2001) is produced;
    /// retry is left to operator tooling, not the bus layer.
    Internal { message: String },
    /// A bus-layer failure (produce or dispatch). Propagates upward: the
    /// offset is *not* committed, and the message will be redelivered
    /// on the next poll.
    Fatal { message: String },
    /// No work was done because no handler is bound for the message's
    /// origin - distinct from `Ok` only for observability;
    /// callers treat it identically to `Ok`.
    NoOp,
}

impl Outcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::Fatal { .. })
    }

    pub fn commits_offset(&self) -> bool {
        !self.is_fatal()
    }
}
