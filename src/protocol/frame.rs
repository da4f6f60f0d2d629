//! Frame definitions
//!
//! A frame is either a short command (opcode + float parameter) or an
//! opaque binary payload.

use bytes::Bytes;

use super::{HEADER_SIZE, KIND_BINARY, KIND_COMMAND};

/// Command body: opcode(1) + value(4)
pub const COMMAND_BODY_SIZE: usize = 5;

/// Binary body prefix: length(2)
pub const BINARY_LENGTH_SIZE: usize = 2;

/// Largest payload the binary length field can describe
pub const MAX_BINARY_PAYLOAD: usize = u16::MAX as usize;

/// One logical protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Structured command, e.g. a motor opcode with its throttle
    Command {
        opcode: u8,
        value: f32,
    },

    /// Opaque payload
    Binary {
        payload: Bytes,
    },
}

impl Frame {
    pub fn command(opcode: u8, value: f32) -> Self {
        Frame::Command { opcode, value }
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Frame::Binary {
            payload: payload.into(),
        }
    }

    /// Get the frame kind discriminator
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Command { .. } => KIND_COMMAND,
            Frame::Binary { .. } => KIND_BINARY,
        }
    }

    /// Exact number of bytes this frame occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Command { .. } => HEADER_SIZE + COMMAND_BODY_SIZE,
            Frame::Binary { payload } => HEADER_SIZE + BINARY_LENGTH_SIZE + payload.len(),
        }
    }
}
