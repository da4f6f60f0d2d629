//! UDP transport
//!
//! One frame per datagram, exchanged with a single configured peer. The
//! socket is non-blocking so `poll` returns immediately when idle.
//!
//! Acknowledgement policy: a datagram whose bytes equal the attached
//! acknowledgement is treated as a liveness marker. It is recorded in
//! [`UdpTransport::last_acknowledged`] and never returned from `poll`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

use super::{check_packet_size, FetchResult, SendResult, Transport};
use crate::protocol::Acknowledgement;

/// Largest datagram the socket will read
const RECV_BUF_SIZE: usize = 65536;

/// Datagrams one `poll` may discard (foreign senders, acknowledgements)
/// before yielding back to the caller
pub const MAX_SKIPPED_PER_POLL: usize = 64;

/// UDP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpTransportConfig {
    /// Local address to bind
    pub bind: SocketAddr,
    /// Remote endpoint frames are sent to and accepted from
    pub peer: SocketAddr,
    /// Largest datagram sent (default: 1472 for a standard Ethernet MTU)
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

fn default_max_packet_size() -> usize {
    1472
}

/// Transport over a non-blocking UDP socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    max_packet_size: usize,
    ack: Option<Acknowledgement>,
    last_ack: Option<Instant>,
    recv_buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind the configured local address
    pub fn bind(config: &UdpTransportConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.bind)?;
        Self::from_socket(socket, config.peer, config.max_packet_size)
    }

    /// Wrap an already bound socket
    pub fn from_socket(socket: UdpSocket, peer: SocketAddr, max_packet_size: usize) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        tracing::debug!("UDP transport on {} <-> {}", socket.local_addr()?, peer);

        Ok(Self {
            socket,
            peer,
            max_packet_size,
            ack: None,
            last_ack: None,
            recv_buf: vec![0u8; RECV_BUF_SIZE],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// When the peer's acknowledgement was last seen
    pub fn last_acknowledged(&self) -> Option<Instant> {
        self.last_ack
    }

    /// Send the attached acknowledgement to the peer
    ///
    /// Returns `false` when no acknowledgement has been attached yet.
    pub fn send_acknowledgement(&mut self) -> SendResult<bool> {
        let Some(ack) = &self.ack else {
            return Ok(false);
        };
        let payload = ack.to_bytes();
        self.send_datagram(&payload)?;
        Ok(true)
    }

    fn send_datagram(&self, data: &[u8]) -> SendResult<()> {
        check_packet_size(data, self.max_packet_size)?;

        let sent = self.socket.send_to(data, self.peer)?;
        if sent != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write: {} of {} bytes", sent, data.len()),
            )
            .into());
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, frame: &[u8]) -> SendResult<()> {
        self.send_datagram(frame)
    }

    fn poll(&mut self) -> FetchResult<Option<Bytes>> {
        for _ in 0..MAX_SKIPPED_PER_POLL {
            let (n, from) = match self.socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if from != self.peer {
                tracing::debug!("Ignoring {} byte datagram from unknown sender {}", n, from);
                continue;
            }

            let datagram = &self.recv_buf[..n];
            if self.ack.as_ref().is_some_and(|ack| ack.matches(datagram)) {
                tracing::trace!("Acknowledgement received from {}", from);
                self.last_ack = Some(Instant::now());
                continue;
            }

            return Ok(Some(Bytes::copy_from_slice(datagram)));
        }

        // Anything left is picked up on the next tick
        tracing::debug!("Skipped {} datagrams without data, yielding", MAX_SKIPPED_PER_POLL);
        Ok(None)
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
    use crate::transport::SendError;
    use std::time::Duration;

    fn linked_pair(max_packet_size: usize) -> (UdpTransport, UdpTransport) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();

        (
            UdpTransport::from_socket(a, b_addr, max_packet_size).unwrap(),
            UdpTransport::from_socket(b, a_addr, max_packet_size).unwrap(),
        )
    }

    fn poll_until_some(transport: &mut UdpTransport) -> Option<Bytes> {
        for _ in 0..200 {
            if let Some(packet) = transport.poll().unwrap() {
                return Some(packet);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_datagram_roundtrip() {
        let (mut a, mut b) = linked_pair(1472);

        assert_eq!(b.poll().unwrap(), None);
        a.send(b"\x10\xAF\x01\x3F\x00\x00\x00").unwrap();

        let packet = poll_until_some(&mut b).expect("datagram not delivered");
        assert_eq!(&packet[..], b"\x10\xAF\x01\x3F\x00\x00\x00");
    }

    #[test]
    fn test_oversized_send_rejected() {
        let (mut a, _b) = linked_pair(8);
        let err = a.send(&[0u8; 9]).unwrap_err();
        assert!(matches!(err, SendError::PacketSizeTooBig { size: 9, max: 8 }));
    }

    #[test]
    fn test_acknowledgement_is_consumed() {
        let (mut a, mut b) = linked_pair(1472);
        let ack = Acknowledgement::from(&b"ALIVE"[..]);

        assert!(!a.send_acknowledgement().unwrap());
        a.attach_acknowledgement(&ack);
        b.attach_acknowledgement(&ack);

        assert!(a.send_acknowledgement().unwrap());
        a.send(b"data").unwrap();

        // The ack is swallowed, only the data datagram comes through
        let packet = poll_until_some(&mut b).expect("datagram not delivered");
        assert_eq!(&packet[..], b"data");
        assert!(b.last_acknowledged().is_some());
    }

    #[test]
    fn test_unknown_sender_ignored() {
        let (_a, mut b) = linked_pair(1472);
        let stranger = UdpSocket::bind("127.0.0.1:0").unwrap();
        stranger.send_to(b"noise", b.local_addr().unwrap()).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(b.poll().unwrap(), None);
    }

    #[test]
    fn test_foreign_flood_bounded_per_poll() {
        let (mut a, mut b) = linked_pair(1472);
        let stranger = UdpSocket::bind("127.0.0.1:0").unwrap();
        for _ in 0..MAX_SKIPPED_PER_POLL * 2 {
            stranger.send_to(b"noise", b.local_addr().unwrap()).unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));
        a.send(b"data").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        // Each call gives up after a bounded number of discards
        assert_eq!(b.poll().unwrap(), None);
        assert_eq!(b.poll().unwrap(), None);
        let packet = poll_until_some(&mut b).expect("datagram not delivered");
        assert_eq!(&packet[..], b"data");
    }

    #[test]
    fn test_acknowledgement_flood_bounded_per_poll() {
        let (mut a, mut b) = linked_pair(1472);
        let ack = Acknowledgement::from(&b"ALIVE"[..]);
        a.attach_acknowledgement(&ack);
        b.attach_acknowledgement(&ack);

        for _ in 0..MAX_SKIPPED_PER_POLL + 1 {
            assert!(a.send_acknowledgement().unwrap());
        }
        a.send(b"data").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(b.poll().unwrap(), None);
        assert!(b.last_acknowledged().is_some());
        let packet = poll_until_some(&mut b).expect("datagram not delivered");
        assert_eq!(&packet[..], b"data");
    }

    #[test]
    fn test_config_defaults_packet_size() {
        let config: UdpTransportConfig =
            toml::from_str("bind = \"127.0.0.1:0\"\npeer = \"127.0.0.1:24810\"\n").unwrap();
        assert_eq!(config.max_packet_size, 1472);
    }
}
