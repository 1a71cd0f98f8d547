//! Congestion window state machine.
//!
//! ```text
//!              window ≥ ssthresh
//!  SlowStart ─────────────────────▶ CongestionAvoidance
//!      ▲  │                                │
//!      │  └──────────┐   timeout /         │
//!  next│             ▼   3 dup acks        │
//!   ack└──── FastRetransmit ◀──────────────┘
//! ```
//!
//! The window is counted in segments and kept as a float so that the
//! additive increase of congestion avoidance (`1/window` per ack) is not
//! lost to rounding. The sender may have `floor(window)` segments
//! outstanding.

use std::fmt;

/// Current phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SlowStart,
    CongestionAvoidance,
    /// A loss was just detected; the window has collapsed and the next
    /// acknowledgment resumes slow start.
    FastRetransmit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What triggered a fast-retransmit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossSignal {
    /// The retransmission timer expired.
    Timeout,
    /// Three duplicate acknowledgments arrived.
    DuplicateAcks,
}

#[derive(Debug, Clone)]
pub struct CongestionController {
    window_size: f64,
    ssthresh: u32,
    phase: Phase,
}

impl CongestionController {
    /// Start in slow start with a one-segment window.
    pub fn new(initial_ssthresh: u32) -> Self {
        Self {
            window_size: 1.0,
            ssthresh: initial_ssthresh,
            phase: Phase::SlowStart,
        }
    }

    /// Apply the per-acknowledgment transition.
    ///
    /// An acknowledgment arriving in fast retransmit resumes slow start.
    pub fn on_ack(&mut self) {
        match self.phase {
            Phase::SlowStart | Phase::FastRetransmit => {
                self.window_size += 1.0;
                self.phase = if self.window_size >= f64::from(self.ssthresh) {
                    Phase::CongestionAvoidance
                } else {
                    Phase::SlowStart
                };
            }
            Phase::CongestionAvoidance => {
                self.window_size += 1.0 / self.window_size;
            }
        }
    }

    /// Enter fast retransmit: halve the threshold (never below 2) and
    /// collapse the window to one segment.
    pub fn on_loss(&mut self, signal: LossSignal) {
        let before = self.window_size;
        self.ssthresh = ((self.window_size / 2.0) as u32).max(2);
        self.window_size = 1.0;
        self.phase = Phase::FastRetransmit;
        log::debug!(
            "[cc] {signal:?}: window {before:.3} → 1, ssthresh → {}",
            self.ssthresh
        );
    }

    pub fn window_size(&self) -> f64 {
        self.window_size
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of segments the sender may keep outstanding.
    pub fn permitted(&self) -> usize {
        self.window_size.floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_slow_start_with_window_one() {
        let cc = CongestionController::new(64);
        assert_eq!(cc.window_size(), 1.0);
        assert_eq!(cc.phase(), Phase::SlowStart);
        assert_eq!(cc.permitted(), 1);
    }

    #[test]
    fn slow_start_adds_one_per_ack() {
        let mut cc = CongestionController::new(64);
        for expected in 2..=10 {
            cc.on_ack();
            assert_eq!(cc.window_size(), expected as f64);
        }
        assert_eq!(cc.phase(), Phase::SlowStart);
    }

    #[test]
    fn threshold_switches_to_congestion_avoidance() {
        let mut cc = CongestionController::new(4);
        cc.on_ack();
        cc.on_ack();
        assert_eq!(cc.phase(), Phase::SlowStart);
        cc.on_ack();
        assert_eq!(cc.window_size(), 4.0);
        assert_eq!(cc.phase(), Phase::CongestionAvoidance);

        cc.on_ack();
        assert!((cc.window_size() - 4.25).abs() < 1e-9);
        assert_eq!(cc.permitted(), 4);
    }

    #[test]
    fn congestion_avoidance_grows_one_segment_per_window() {
        let mut cc = CongestionController::new(2);
        cc.on_ack();
        assert_eq!(cc.phase(), Phase::CongestionAvoidance);
        let start = cc.window_size();
        for _ in 0..start as usize {
            cc.on_ack();
        }
        assert!(cc.window_size() > start + 0.8 && cc.window_size() <= start + 1.0);
    }

    #[test]
    fn window_never_decreases_without_loss() {
        let mut cc = CongestionController::new(16);
        let mut previous = cc.window_size();
        for _ in 0..500 {
            cc.on_ack();
            assert!(cc.window_size() >= previous);
            previous = cc.window_size();
        }
    }

    #[test]
    fn timeout_halves_threshold_and_resets_window() {
        let mut cc = CongestionController::new(64);
        for _ in 0..19 {
            cc.on_ack();
        }
        assert_eq!(cc.window_size(), 20.0);
        cc.on_loss(LossSignal::Timeout);
        assert_eq!(cc.window_size(), 1.0);
        assert_eq!(cc.ssthresh(), 10);
        assert_eq!(cc.phase(), Phase::FastRetransmit);
    }

    #[test]
    fn threshold_floor_is_two() {
        let mut cc = CongestionController::new(64);
        cc.on_ack();
        cc.on_ack();
        cc.on_loss(LossSignal::DuplicateAcks);
        assert_eq!(cc.ssthresh(), 2);
        cc.on_loss(LossSignal::Timeout);
        assert_eq!(cc.ssthresh(), 2);
        assert_eq!(cc.window_size(), 1.0);
    }

    #[test]
    fn next_ack_after_loss_resumes_slow_start() {
        let mut cc = CongestionController::new(64);
        for _ in 0..9 {
            cc.on_ack();
        }
        cc.on_loss(LossSignal::Timeout);
        cc.on_ack();
        assert_eq!(cc.phase(), Phase::SlowStart);
        assert_eq!(cc.window_size(), 2.0);
        for _ in 0..3 {
            cc.on_ack();
        }
        // ssthresh is 5 after halving a window of 10.
        assert_eq!(cc.phase(), Phase::CongestionAvoidance);
    }

    #[test]
    fn every_loss_resets_to_exactly_one() {
        let mut cc = CongestionController::new(8);
        for round in 0..20 {
            for _ in 0..round {
                cc.on_ack();
            }
            cc.on_loss(if round % 2 == 0 {
                LossSignal::Timeout
            } else {
                LossSignal::DuplicateAcks
            });
            assert_eq!(cc.window_size(), 1.0);
        }
    }
}
