//! Crate-level error type.
//!
//! Only unrecoverable conditions surface here. Segment loss, duplication
//! and reordering are handled inside the protocol and never reach the
//! caller.

use thiserror::Error;

use crate::packet::PacketError;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The datagram channel failed.
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// Reading the source or writing the sink failed.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A segment violated the wire format limits at admission.
    #[error("invalid segment: {0}")]
    Packet(#[from] PacketError),
    /// The acknowledgment task panicked or was cancelled unexpectedly.
    #[error("acknowledgment task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// The stream grew past the 32-bit sequence space.
    #[error("stream exceeds {} bytes", u32::MAX)]
    StreamTooLong,
}
