//! Frame codec for encoding/decoding protocol frames
//!
//! Stateless: every call handles exactly one complete frame. All numeric
//! fields are fixed-width big-endian, so decoding never loops or scans.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{
    Frame, ProtocolVersion, BINARY_LENGTH_SIZE, COMMAND_BODY_SIZE, HEADER_SIZE, KIND_BINARY,
    KIND_COMMAND, MAX_BINARY_PAYLOAD, PROTOCOL_VERSION,
};

/// Errors raised while building an outbound frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Binary payload too long for length field: {0} bytes (max: {max})", max = MAX_BINARY_PAYLOAD)]
    PayloadTooLong(usize),
}

/// Errors raised while parsing an inbound frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodingError {
    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unsupported protocol version {0} (expected {expected})", expected = PROTOCOL_VERSION)]
    UnsupportedVersion(ProtocolVersion),

    #[error("Unknown frame kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

pub type EncodingResult<T> = Result<T, EncodingError>;
pub type DecodingResult<T> = Result<T, DecodingError>;

/// Encode a frame, refusing anything larger than `max_packet_size`
pub fn encode(frame: &Frame, max_packet_size: usize) -> EncodingResult<Bytes> {
    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    encode_into(frame, max_packet_size, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame by appending it to `buf`
///
/// Nothing is written when an error is returned.
pub fn encode_into(frame: &Frame, max_packet_size: usize, buf: &mut BytesMut) -> EncodingResult<()> {
    if let Frame::Binary { payload } = frame {
        if payload.len() > MAX_BINARY_PAYLOAD {
            return Err(EncodingError::PayloadTooLong(payload.len()));
        }
    }

    let size = frame.encoded_len();
    if size > max_packet_size {
        return Err(EncodingError::FrameTooLarge {
            size,
            max: max_packet_size,
        });
    }

    buf.reserve(size);
    buf.put_u8(PROTOCOL_VERSION.to_byte());
    buf.put_u8(frame.kind());

    match frame {
        Frame::Command { opcode, value } => {
            buf.put_u8(*opcode);
            buf.put_f32(*value);
        }
        Frame::Binary { payload } => {
            buf.put_u16(payload.len() as u16);
            buf.put_slice(payload);
        }
    }

    Ok(())
}

/// Decode exactly one frame from `data`
pub fn decode(data: &[u8]) -> DecodingResult<Frame> {
    ensure_len(data, HEADER_SIZE)?;

    let version = ProtocolVersion::from_byte(data[0]);
    if version != PROTOCOL_VERSION {
        return Err(DecodingError::UnsupportedVersion(version));
    }

    let body = &data[HEADER_SIZE..];
    match data[1] {
        KIND_COMMAND => {
            ensure_exact(body, COMMAND_BODY_SIZE)?;
            let opcode = body[0];
            let value = f32::from_be_bytes([body[1], body[2], body[3], body[4]]);
            Ok(Frame::Command { opcode, value })
        }
        KIND_BINARY => {
            ensure_len(body, BINARY_LENGTH_SIZE)?;
            let length = u16::from_be_bytes([body[0], body[1]]) as usize;
            let payload = &body[BINARY_LENGTH_SIZE..];
            ensure_exact(payload, length)?;
            Ok(Frame::Binary {
                payload: Bytes::copy_from_slice(payload),
            })
        }
        other => Err(DecodingError::UnknownKind(other)),
    }
}

fn ensure_len(data: &[u8], needed: usize) -> DecodingResult<()> {
    if data.len() < needed {
        return Err(DecodingError::Truncated {
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

fn ensure_exact(data: &[u8], needed: usize) -> DecodingResult<()> {
    ensure_len(data, needed)?;
    if data.len() > needed {
        return Err(DecodingError::TrailingBytes(data.len() - needed));
    }
    Ok(())
}
