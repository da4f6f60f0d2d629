//! In-process transport
//!
//! Two linked endpoints, each delivering what the other sends. Frame
//! boundaries are kept because each `send` is queued as one packet.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{check_packet_size, DataFetchError, FetchResult, SendError, SendResult, Transport};
use crate::protocol::Acknowledgement;

#[derive(Debug, Default)]
struct Lane {
    packets: Mutex<VecDeque<Bytes>>,
}

impl Lane {
    fn push(&self, packet: Bytes) {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(packet);
    }

    fn pop(&self) -> Option<Bytes> {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn len(&self) -> usize {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One end of an in-memory link
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: Arc<Lane>,
    outbound: Arc<Lane>,
    closed: Arc<AtomicBool>,
    max_packet_size: usize,
    ack: Option<Acknowledgement>,
}

impl MemoryTransport {
    /// Create two connected endpoints sharing a packet size limit
    pub fn pair(max_packet_size: usize) -> (Self, Self) {
        let a_to_b = Arc::new(Lane::default());
        let b_to_a = Arc::new(Lane::default());
        let closed = Arc::new(AtomicBool::new(false));

        let a = Self {
            inbound: b_to_a.clone(),
            outbound: a_to_b.clone(),
            closed: closed.clone(),
            max_packet_size,
            ack: None,
        };
        let b = Self {
            inbound: a_to_b,
            outbound: b_to_a,
            closed,
            max_packet_size,
            ack: None,
        };
        (a, b)
    }

    /// Number of packets waiting for this end to poll
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Acknowledgement attached by the owning connection, if any
    pub fn acknowledgement(&self) -> Option<&Acknowledgement> {
        self.ack.as_ref()
    }

    /// Close the link for both ends
    ///
    /// Packets already queued can still be polled; after that `poll` reports
    /// the peer as gone.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: &[u8]) -> SendResult<()> {
        if self.is_closed() {
            return Err(SendError::Disconnected);
        }
        check_packet_size(frame, self.max_packet_size)?;
        self.outbound.push(Bytes::copy_from_slice(frame));
        Ok(())
    }

    fn poll(&mut self) -> FetchResult<Option<Bytes>> {
        match self.inbound.pop() {
            Some(packet) => Ok(Some(packet)),
            None if self.is_closed() => Err(DataFetchError::Disconnected),
            None => Ok(None),
        }
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn attach_acknowledgement(&mut self, ack: &Acknowledgement) {
        self.ack = Some(ack.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_order() {
        let (mut a, mut b) = MemoryTransport::pair(64);

        a.send(b"one").unwrap();
        a.send(b"two").unwrap();
        assert_eq!(b.pending_inbound(), 2);

        assert_eq!(b.poll().unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(b.poll().unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(b.poll().unwrap(), None);
        assert_eq!(a.poll().unwrap(), None);
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let (mut a, b) = MemoryTransport::pair(4);
        let err = a.send(b"12345").unwrap_err();
        assert!(matches!(err, SendError::PacketSizeTooBig { size: 5, max: 4 }));
        assert_eq!(b.pending_inbound(), 0);
    }

    #[test]
    fn test_close_drains_then_disconnects() {
        let (mut a, mut b) = MemoryTransport::pair(64);
        a.send(b"last").unwrap();
        a.close();

        assert!(matches!(a.send(b"more"), Err(SendError::Disconnected)));
        assert_eq!(b.poll().unwrap().as_deref(), Some(&b"last"[..]));
        assert!(matches!(b.poll(), Err(DataFetchError::Disconnected)));
    }
}
