//! Send-side window state.
//!
//! [`SendState`] holds everything the sender engine, the acknowledgment
//! task and the retransmission timer mutate: the in-flight buffer, the
//! send window edges, congestion and RTT state, and the timer handle. It
//! lives behind one `tokio::sync::Mutex` and every method runs with that
//! lock held, so a retransmission can never race the removal of the
//! segment it targets.
//!
//! This module only manages state; methods hand back the [`Packet`]s that
//! must go on the wire and the caller transmits them (still under the
//! lock).
//!
//! # Sequence-number layout
//!
//! ```text
//!  send_base          next_seqno
//!      │                  │
//!  ────┼──────────────────┼──────────────────▶ byte offset
//!      │ <── in flight ──▶│ <── unread source
//! ```

use std::time::Instant;

use crate::buffer::{Segment, SegmentBuffer};
use crate::config::SenderConfig;
use crate::congestion::{CongestionController, LossSignal, Phase};
use crate::packet::{Packet, PacketError, DATA_SIZE};
use crate::rto::RttEstimator;
use crate::telemetry::CwndLog;
use crate::timer::{RetransmitTimer, TimerEvent};

/// Counters reported at the end of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// First transmissions of data segments.
    pub segments_sent: u64,
    /// Retransmissions for any reason.
    pub retransmissions: u64,
    pub timeouts: u64,
    pub fast_retransmits: u64,
    pub bytes_acked: u64,
}

#[derive(Debug)]
pub struct SendState {
    buffer: SegmentBuffer,
    next_seqno: u32,
    send_base: u32,
    congestion: CongestionController,
    estimator: RttEstimator,
    timer: RetransmitTimer,
    telemetry: Option<CwndLog>,
    /// Set once the source has been read to the end.
    exhausted: bool,
    stats: TransferStats,
}

impl SendState {
    pub fn new(config: &SenderConfig, timer: RetransmitTimer, telemetry: Option<CwndLog>) -> Self {
        Self {
            buffer: SegmentBuffer::new(),
            next_seqno: 0,
            send_base: 0,
            congestion: CongestionController::new(config.initial_ssthresh),
            estimator: RttEstimator::new(config.rto),
            timer,
            telemetry,
            exhausted: false,
            stats: TransferStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Admission (sender engine)
    // -----------------------------------------------------------------------

    /// `true` while the buffer holds no more than `floor(window)` segments.
    pub fn can_admit(&self) -> bool {
        self.buffer.len() <= self.congestion.permitted()
    }

    /// Assign the next sequence number to `payload`, buffer it, and return
    /// the segment to transmit.
    ///
    /// Starts the retransmission timer if it is not already running.
    pub fn admit(&mut self, payload: Vec<u8>, now: Instant) -> Result<Packet, PacketError> {
        if payload.len() > DATA_SIZE {
            return Err(PacketError::PayloadTooLarge(payload.len()));
        }
        let seq = self.next_seqno;
        let mut segment = Segment::new(seq, payload);
        segment.sent_at = Some(now);
        let packet = Packet::data(seq, segment.payload.clone());

        self.next_seqno = segment.end();
        self.buffer.append(segment);
        self.stats.segments_sent += 1;

        if !self.timer.is_armed() {
            self.timer.start(self.estimator.timeout());
        }
        Ok(packet)
    }

    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Every byte of an exhausted source has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.exhausted && self.send_base == self.next_seqno
    }

    pub fn end_of_stream(&self) -> Packet {
        Packet::end_of_stream(self.next_seqno)
    }

    // -----------------------------------------------------------------------
    // Acknowledgment handling (see `crate::ack`)
    // -----------------------------------------------------------------------

    /// Congestion transition for any received acknowledgment.
    pub fn record_ack(&mut self) {
        self.congestion.on_ack();
        self.log_congestion();
    }

    /// Slide the window to cumulative ack `ack`.
    ///
    /// Returns `false` (and changes nothing) unless `ack > send_base`.
    pub fn advance(&mut self, ack: u32, now: Instant) -> bool {
        if ack <= self.send_base {
            return false;
        }
        let ack = ack.min(self.next_seqno);
        self.stats.bytes_acked += u64::from(ack - self.send_base);
        self.send_base = ack;
        self.timer.stop();

        if let Some(oldest) = self.buffer.front() {
            if let Some(rto) = self.estimator.sample_segment(oldest, now) {
                log::debug!("[sender] rtt sample seq={} → rto {rto:?}", oldest.sequence_number);
                self.timer.start(rto);
            }
        }
        self.buffer.remove_up_to(ack);

        if !self.buffer.is_empty() && !self.timer.is_armed() {
            self.timer.start(self.estimator.timeout());
        }
        true
    }

    /// Take a round-trip sample from the buffered segment at `seq`.
    ///
    /// Restarts the timer with the new RTO when a sample was taken.
    pub fn sample_echo(&mut self, seq: u32, now: Instant) -> bool {
        let Some(segment) = self.buffer.find(seq).and_then(|h| self.buffer.get(h)) else {
            return false;
        };
        match self.estimator.sample_segment(segment, now) {
            Some(rto) => {
                self.timer.reset(rto);
                true
            }
            None => false,
        }
    }

    /// Duplicate-ack path: retransmit the oldest unacknowledged segment and
    /// restart the timer.
    ///
    /// Only the oldest segment is resent; the rest of the buffer is kept.
    pub fn fast_retransmit(&mut self, now: Instant) -> Option<Packet> {
        self.timer.stop();
        let packet = self.retransmit_oldest(LossSignal::DuplicateAcks, now);
        if packet.is_some() {
            self.stats.fast_retransmits += 1;
            self.timer.start(self.estimator.timeout());
        }
        packet
    }

    // -----------------------------------------------------------------------
    // Timer expiry (sender engine)
    // -----------------------------------------------------------------------

    /// Handle a retransmission-timer expiry.
    ///
    /// Stale events and expiries with an empty buffer do nothing and leave
    /// the timer disarmed. Otherwise the oldest segment is returned for
    /// retransmission and the timer is re-armed, backed off from the
    /// second consecutive timeout of that segment onwards.
    pub fn on_timeout(&mut self, event: TimerEvent, now: Instant) -> Option<Packet> {
        if !self.timer.claim(event) {
            return None;
        }
        if self.buffer.is_empty() {
            log::debug!("[sender] timeout with empty window");
            return None;
        }

        let packet = self.retransmit_oldest(LossSignal::Timeout, now)?;
        self.stats.timeouts += 1;

        let timeouts = self.buffer.front().map_or(0, |s| s.timeout_count);
        let rto = if timeouts >= 2 {
            let backed_off = self.estimator.back_off();
            log::info!("[sender] exponential backoff: rto {backed_off:?}");
            backed_off
        } else {
            self.estimator.timeout()
        };
        self.timer.start(rto);
        Some(packet)
    }

    fn retransmit_oldest(&mut self, signal: LossSignal, now: Instant) -> Option<Packet> {
        let oldest = self.buffer.front_mut()?;
        oldest.retransmit_count += 1;
        if signal == LossSignal::Timeout {
            oldest.timeout_count += 1;
        }
        oldest.sent_at = Some(now);
        let packet = Packet::data(oldest.sequence_number, oldest.payload.clone());
        log::debug!(
            "[sender] {signal:?}: resend seq={} (retransmits={})",
            oldest.sequence_number,
            oldest.retransmit_count
        );

        self.stats.retransmissions += 1;
        self.congestion.on_loss(signal);
        self.log_congestion();
        Some(packet)
    }

    fn log_congestion(&mut self) {
        if let Some(log) = self.telemetry.as_mut() {
            log.record(&self.congestion);
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seqno(&self) -> u32 {
        self.next_seqno
    }

    pub fn in_flight(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &SegmentBuffer {
        &self.buffer
    }

    pub fn congestion(&self) -> &CongestionController {
        &self.congestion
    }

    pub fn phase(&self) -> Phase {
        self.congestion.phase()
    }

    pub fn estimator(&self) -> &RttEstimator {
        &self.estimator
    }

    pub fn timer(&self) -> &RetransmitTimer {
        &self.timer
    }

    /// Disarm the timer ahead of shutdown.
    pub fn stop_timer(&mut self) {
        self.timer.stop();
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    pub fn flush_telemetry(&mut self) {
        if let Some(log) = self.telemetry.as_mut() {
            log.flush();
        }
    }
}
