//! RemoteLink - framed command/binary messaging for constrained endpoints
//!
//! A [`Connection`] polls a [`Transport`] at a fixed interval, decodes each
//! received packet into a [`Frame`] and hands it to the command or binary
//! callback. Outbound frames are encoded and pushed to the transport
//! directly from the caller.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use remotelink::{Connection, ConnectionConfig, MemoryTransport};
//!
//! # async fn run() -> Result<(), remotelink::ConnectionError> {
//! let (local, _peer) = MemoryTransport::pair(256);
//! let connection = Connection::open(
//!     ConnectionConfig::new(Duration::from_millis(10), &b"ACK"[..]),
//!     local,
//!     Arc::new(|opcode: u8, value: f32| println!("command {opcode}: {value}")),
//!     Arc::new(|payload: &[u8]| println!("{} bytes", payload.len())),
//! )?;
//!
//! connection.send_command(1, 0.5)?;
//! connection.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod protocol;
pub mod transport;

pub use connection::{
    BinaryCallback, CommandCallback, Connection, ConnectionConfig, ConnectionError,
    ConnectionEvent, ConnectionResult, ConnectionState, ConnectionStats, Priority,
};
pub use protocol::{Acknowledgement, DecodingError, EncodingError, Frame, PROTOCOL_VERSION};
pub use transport::{
    DataFetchError, MemoryTransport, SendError, Transport, UdpTransport, UdpTransportConfig,
};
