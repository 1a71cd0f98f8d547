//! Acknowledgment processor.
//!
//! Runs as its own task next to the sender engine. For each acknowledgment
//! `A` echoing sequence number `E`:
//!
//! 1. the congestion controller sees an "ack received" transition;
//! 2. if `A > send_base` the window slides to `A` (RTT sample, timer
//!    restart, cumulative removal);
//! 3. if `A < E` the receiver is holding data past a gap: this counts as a
//!    duplicate, the segment at `E` is sampled, and the third consecutive
//!    duplicate triggers a fast retransmit of the oldest segment.
//!
//! The task ends once the source is exhausted and fully acknowledged.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};

use crate::error::TransferError;
use crate::packet::{Header, Packet};
use crate::sender::SendState;
use crate::socket::{SocketError, Transport};

/// Duplicate acknowledgments that trigger a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
pub struct AckProcessor {
    duplicate_acks: u32,
}

impl AckProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one acknowledgment to `state`.
    ///
    /// Returns the segment to retransmit when this ack completes a run of
    /// duplicates.
    pub fn on_ack(&mut self, state: &mut SendState, header: &Header, now: Instant) -> Option<Packet> {
        let (ack, echo) = (header.ack, header.seq);
        state.record_ack();

        if state.advance(ack, now) {
            self.duplicate_acks = 0;
            log::debug!(
                "[ack] ← ACK ack={ack} echo={echo} send_base={} in_flight={}",
                state.send_base(),
                state.in_flight()
            );
        }

        if ack < echo {
            self.duplicate_acks += 1;
            state.sample_echo(echo, now);
            log::debug!("[ack] duplicate #{} ack={ack} echo={echo}", self.duplicate_acks);

            if self.duplicate_acks == DUP_ACK_THRESHOLD {
                self.duplicate_acks = 0;
                return state.fast_retransmit(now);
            }
        }
        None
    }

    pub fn duplicate_acks(&self) -> u32 {
        self.duplicate_acks
    }

    /// Consume acknowledgments from `transport` until the transfer completes.
    ///
    /// Datagrams from other addresses, data segments and undecodable
    /// datagrams are ignored. Socket I/O errors end the task with an error.
    pub async fn run<T: Transport>(
        mut self,
        transport: Arc<T>,
        peer: SocketAddr,
        state: Arc<Mutex<SendState>>,
        progress: Arc<Notify>,
    ) -> Result<(), TransferError> {
        loop {
            let (pkt, addr) = match transport.recv_from().await {
                Ok(v) => v,
                Err(SocketError::Packet(e)) => {
                    log::warn!("[ack] discarding malformed datagram: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if addr != peer || !pkt.is_ack() {
                log::debug!("[ack] ignoring datagram from {addr}");
                continue;
            }

            let mut st = state.lock().await;
            if let Some(resend) = self.on_ack(&mut st, &pkt.header, Instant::now()) {
                transport.send_to(&resend, peer).await?;
            }
            let complete = st.is_complete();
            drop(st);

            progress.notify_one();
            if complete {
                log::info!("[ack] all data acknowledged");
                return Ok(());
            }
        }
    }
}
