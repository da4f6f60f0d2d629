//! Connection module - the protocol engine
//!
//! Provides:
//! - The polling receive loop and callback dispatch
//! - Direct and queued outbound sends
//! - Lifecycle (`Created -> Running -> Stopped`) and statistics

mod engine;
mod queue;

pub use engine::*;
pub use queue::Priority;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{Acknowledgement, EncodingError, Frame};
use crate::transport::SendError;

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Poll interval must be greater than zero")]
    InvalidPollInterval,

    #[error("Acknowledgement of {len} bytes does not fit a {max} byte packet")]
    InvalidAcknowledgement { len: usize, max: usize },

    #[error("Acknowledgement decodes as a frame ({0:?}) and would hide it")]
    AmbiguousAcknowledgement(Frame),

    #[error("No tokio runtime available to run the poll loop")]
    NoRuntime,

    #[error("Connection stopped")]
    Stopped,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Configured, poll loop not spawned yet
    Created,
    /// Poll loop is running
    Running,
    /// Stopped for good
    Stopped,
}

/// Invoked with `(opcode, value)` for every received command frame
pub type CommandCallback = Arc<dyn Fn(u8, f32) + Send + Sync>;

/// Invoked with the payload of every received binary frame
pub type BinaryCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Settings every connection needs, whatever the transport
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Delay between two polls of the transport
    pub poll_interval: Duration,
    /// Liveness marker handed to the transport
    pub acknowledgement: Acknowledgement,
}

impl ConnectionConfig {
    pub fn new(poll_interval: Duration, acknowledgement: impl Into<Acknowledgement>) -> Self {
        Self {
            poll_interval,
            acknowledgement: acknowledgement.into(),
        }
    }
}

/// Events emitted by the poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Poll loop spawned
    Started,
    /// A received frame was malformed and discarded
    DecodeFailed {
        message: String,
    },
    /// The transport failed to read; polling continues
    FetchFailed {
        message: String,
    },
    /// A queued frame could not be sent and was dropped
    QueuedSendFailed {
        message: String,
    },
    /// Poll loop finished after `stop()`
    Stopped,
}
