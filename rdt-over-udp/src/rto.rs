//! Round-trip time estimation and retransmission timeout (RTO).
//!
//! Follows Jacobson's algorithm:
//!
//! ```text
//! EstimatedRTT = (1 − α)·EstimatedRTT + α·SampleRTT           α = 1/8
//! DevRTT       = (1 − β)·DevRTT + β·|SampleRTT − EstimatedRTT|  β = 1/4
//! RTO          = EstimatedRTT + 4·DevRTT
//! ```
//!
//! Both estimates start at zero and are updated in that order, so the
//! deviation term uses the freshly updated `EstimatedRTT`.
//!
//! Round trips are only measured on segments that were transmitted exactly
//! once (Karn's algorithm); an acknowledgment arriving for a retransmitted
//! segment cannot be matched to a particular transmission.

use std::time::{Duration, Instant};

use crate::buffer::Segment;
use crate::config::RtoConfig;

const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

/// Smoothed RTT state and the timeout derived from it.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    config: RtoConfig,
    /// Smoothed RTT in milliseconds.
    estimated_rtt: f64,
    /// RTT deviation in milliseconds.
    deviation_rtt: f64,
    rto: Duration,
    /// Set while consecutive timeouts on one segment are being backed off.
    backed_off_rto: Option<Duration>,
}

impl RttEstimator {
    pub fn new(config: RtoConfig) -> Self {
        Self {
            config,
            estimated_rtt: 0.0,
            deviation_rtt: 0.0,
            rto: config.initial.min(config.max),
            backed_off_rto: None,
        }
    }

    /// Fold one round-trip sample into the estimate.
    ///
    /// Clears any exponential back-off and returns the new RTO.
    pub fn observe(&mut self, sample: Duration) -> Duration {
        let sample_ms = sample.as_secs_f64() * 1000.0;

        self.estimated_rtt = (1.0 - ALPHA) * self.estimated_rtt + ALPHA * sample_ms;
        self.deviation_rtt = (1.0 - BETA) * self.deviation_rtt
            + BETA * (sample_ms - self.estimated_rtt).abs();

        let rto_ms = self.estimated_rtt + 4.0 * self.deviation_rtt;
        self.rto = Duration::from_secs_f64(rto_ms / 1000.0).clamp(self.config.min, self.config.max);
        self.backed_off_rto = None;
        self.rto
    }

    /// Measure the round trip of `segment` acknowledged at `now`.
    ///
    /// Returns `None` without touching the estimate if the segment was ever
    /// retransmitted or never sent.
    pub fn sample_segment(&mut self, segment: &Segment, now: Instant) -> Option<Duration> {
        if segment.retransmit_count > 0 {
            return None;
        }
        let sent_at = segment.sent_at?;
        Some(self.observe(now.saturating_duration_since(sent_at)))
    }

    /// Double the active timeout, capped at the configured maximum.
    ///
    /// The first call doubles the estimator's RTO; later calls double the
    /// previously backed-off value.
    pub fn back_off(&mut self) -> Duration {
        let previous = self.timeout();
        let doubled = previous.saturating_mul(2).min(self.config.max);
        self.backed_off_rto = Some(doubled);
        doubled
    }

    /// Timeout the retransmission timer should be armed with.
    pub fn timeout(&self) -> Duration {
        self.backed_off_rto.unwrap_or(self.rto)
    }

    /// RTO computed from samples, ignoring back-off.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn backed_off_rto(&self) -> Option<Duration> {
        self.backed_off_rto
    }

    /// Smoothed RTT in milliseconds.
    pub fn estimated_rtt(&self) -> f64 {
        self.estimated_rtt
    }

    /// RTT deviation in milliseconds.
    pub fn deviation_rtt(&self) -> f64 {
        self.deviation_rtt
    }
}
