//! Transport module - the byte-level medium a connection runs over
//!
//! A transport only has to move whole frames: `send` pushes one encoded
//! frame, `poll` hands back one received frame if any arrived. Everything
//! else (framing, dispatch, scheduling) lives in the connection engine.
//!
//! Provided implementations:
//! - [`MemoryTransport`] in-process pair, used for tests and bridging
//! - [`UdpTransport`] one datagram per frame

mod memory;
mod udp;

pub use memory::*;
pub use udp::*;

use bytes::Bytes;
use std::io;
use thiserror::Error;

use crate::protocol::{Acknowledgement, DEFAULT_MAX_PACKET_SIZE};

/// Errors a transport can raise while sending
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Packet size too big: {size} bytes (medium carries {max})")]
    PacketSizeTooBig { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Peer disconnected")]
    Disconnected,
}

/// Errors a transport can raise while fetching incoming data
#[derive(Error, Debug)]
pub enum DataFetchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Peer disconnected")]
    Disconnected,
}

pub type SendResult<T> = Result<T, SendError>;
pub type FetchResult<T> = Result<T, DataFetchError>;

/// Capability every medium must provide
///
/// Implementations do not need to be thread-safe beyond `Send`: the engine
/// serializes all calls behind a single lock.
pub trait Transport: Send + 'static {
    /// Push one encoded frame onto the medium
    ///
    /// Must fail with [`SendError::PacketSizeTooBig`] rather than split the
    /// frame, unless the transport reassembles it on the other side.
    fn send(&mut self, frame: &[u8]) -> SendResult<()>;

    /// Check for one newly arrived frame without blocking
    fn poll(&mut self) -> FetchResult<Option<Bytes>>;

    /// Largest frame the medium carries in one unit
    fn max_packet_size(&self) -> usize {
        DEFAULT_MAX_PACKET_SIZE
    }

    /// Called once when the transport is handed to a connection
    fn attach_acknowledgement(&mut self, _ack: &Acknowledgement) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> SendResult<()> {
        (**self).send(frame)
    }

    fn poll(&mut self) -> FetchResult<Option<Bytes>> {
        (**self).poll()
    }

    fn max_packet_size(&self) -> usize {
        (**self).max_packet_size()
    }

    fn attach_acknowledgement(&mut self, ack: &Acknowledgement) {
        (**self).attach_acknowledgement(ack)
    }
}

/// Reject frames larger than `max` the way every transport should
pub fn check_packet_size(frame: &[u8], max: usize) -> SendResult<()> {
    if frame.len() > max {
        return Err(SendError::PacketSizeTooBig {
            size: frame.len(),
            max,
        });
    }
    Ok(())
}
