//! Tunable protocol parameters.
//!
//! Defaults are the protocol constants; the binaries override individual
//! fields from CLI flags.

use std::path::PathBuf;
use std::time::Duration;

/// Retransmission-timeout bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtoConfig {
    /// RTO before any RTT sample is available.
    pub initial: Duration,
    /// Lower clamp on the computed RTO. `Duration::ZERO` leaves
    /// `estimated_rtt + 4 * deviation_rtt` unclamped from below.
    pub min: Duration,
    /// Upper clamp on the computed and backed-off RTO.
    pub max: Duration,
}

impl Default for RtoConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(3000),
            min: Duration::from_millis(10),
            max: Duration::from_millis(240_000),
        }
    }
}

/// Sender-side configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub rto: RtoConfig,
    /// Slow-start threshold before the first loss, in segments.
    pub initial_ssthresh: u32,
    /// How many times the end-of-stream marker is transmitted.
    pub eos_repeats: u32,
    /// Where to write the congestion-window CSV log, if anywhere.
    pub cwnd_log: Option<PathBuf>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            rto: RtoConfig::default(),
            initial_ssthresh: 64,
            eos_repeats: 10,
            cwnd_log: None,
        }
    }
}
