//! Acknowledgement slot
//!
//! A fixed byte sequence both ends agree on for link liveness. It is not a
//! frame: transports decide when to send it and how to recognise it.

use bytes::Bytes;
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Acknowledgement(Bytes);

impl Acknowledgement {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cheap clone of the payload for handing to a transport
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a received packet is this acknowledgement
    pub fn matches(&self, packet: &[u8]) -> bool {
        !self.0.is_empty() && self.0.as_ref() == packet
    }
}

impl fmt::Debug for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Acknowledgement({:02x?})", self.0.as_ref())
    }
}

impl From<&'static [u8]> for Acknowledgement {
    fn from(payload: &'static [u8]) -> Self {
        Self(Bytes::from_static(payload))
    }
}

impl From<Bytes> for Acknowledgement {
    fn from(payload: Bytes) -> Self {
        Self(payload)
    }
}

impl From<Vec<u8>> for Acknowledgement {
    fn from(payload: Vec<u8>) -> Self {
        Self(Bytes::from(payload))
    }
}
