//! Protocol module - Defines the wire protocol for RemoteLink frames
//!
//! Every frame starts with a two byte header:
//! - 1 byte protocol version (`major << 4 | minor`)
//! - 1 byte frame kind (command or binary)
//!
//! followed by fixed-width, big-endian fields for the frame kind.

mod ack;
mod codec;
mod frame;

pub use ack::*;
pub use codec::*;
pub use frame::*;

use std::fmt;

/// Protocol version carried in every frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// Pack into the single header byte. Both halves must fit in a nibble.
    pub const fn to_byte(self) -> u8 {
        (self.major << 4) | (self.minor & 0x0F)
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self {
            major: byte >> 4,
            minor: byte & 0x0F,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The only protocol revision this crate speaks
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

/// Discriminator byte for command frames
pub const KIND_COMMAND: u8 = 0xAF;

/// Discriminator byte for binary frames
pub const KIND_BINARY: u8 = 0xAE;

/// Header size: version(1) + kind(1)
pub const HEADER_SIZE: usize = 2;

/// Packet size assumed for transports that do not declare their own limit
pub const DEFAULT_MAX_PACKET_SIZE: usize = HEADER_SIZE + 2 + u16::MAX as usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_byte() {
        assert_eq!(PROTOCOL_VERSION.to_byte(), 0x10);
        assert_eq!(ProtocolVersion::from_byte(0x10), PROTOCOL_VERSION);
        assert_eq!(PROTOCOL_VERSION.to_string(), "1.0");
    }

    #[test]
    fn test_other_versions_are_distinct() {
        let v = ProtocolVersion::from_byte(0x21);
        assert_eq!(v, ProtocolVersion { major: 2, minor: 1 });
        assert_ne!(v, PROTOCOL_VERSION);
    }
}
