//! `rdt-over-udp` — reliable one-way file transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────────────────┐            ┌────────────────────┐
//!  │ SenderEngine                │  segments  │ receive()          │
//!  │  SendState (window, RTO,    │───────────▶│  Reassembler       │
//!  │   congestion, timer)        │            │  (receive_base +   │
//!  │  AckProcessor task          │◀───────────│   sorted buffer)   │
//!  └──────────────┬──────────────┘    ACKs    └─────────┬──────────┘
//!                 │ Transport                           │ Transport
//!  ┌──────────────▼──────────────┐            ┌─────────▼──────────┐
//!  │ Socket / Simulator<Socket>  │            │ Socket             │
//!  └─────────────────────────────┘            └────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — wire format (serialise / deserialise)
//! - [`buffer`]      — ordered, duplicate-free segment buffer
//! - [`rto`]         — RTT estimation and retransmission timeout
//! - [`congestion`]  — slow start / congestion avoidance / fast retransmit
//! - [`timer`]       — single retransmission timer delivering events
//! - [`sender`]      — shared send-side window state
//! - [`ack`]         — acknowledgment processing and duplicate detection
//! - [`engine`]      — the sending loop
//! - [`receiver`]    — reassembly and the receiving loop
//! - [`telemetry`]   — congestion window CSV log
//! - [`simulator`]   — optional lossy/reorder network layer for testing
//! - [`socket`]      — transport abstraction and async UDP socket
//! - [`config`]      — tunable protocol parameters
//! - [`error`]       — crate-level error type

pub mod ack;
pub mod buffer;
pub mod config;
pub mod congestion;
pub mod engine;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod rto;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod telemetry;
pub mod timer;

pub use config::{RtoConfig, SenderConfig};
pub use engine::SenderEngine;
pub use error::TransferError;
pub use receiver::{receive, ReceiveReport};
pub use sender::TransferStats;
pub use socket::{Socket, Transport};
