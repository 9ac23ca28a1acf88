//! Errors raised by the gateway traits.
//!
//! These are distinct from [`crate::outcome::Outcome`]: a `CoreError` is
//! something a gateway call can fail with; an `Outcome` is what a
//! coordinator pipeline decides to do about it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("store error: {message}")]
    Store { message: String },

    #[error("bus produce error on topic {topic}: {message}")]
    BusProduce { topic: String, message: String },

    #[error("bus commit error on topic {topic}: {message}")]
    BusCommit { topic: String, message: String },

    #[error("bus dispatch error: {message}")]
    BusDispatch { message: String },

    #[error("no consumer bound for topic {topic}")]
    UnboundTopic { topic: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
