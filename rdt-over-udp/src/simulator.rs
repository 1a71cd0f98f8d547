//! Fault-injecting transport for testing.
//!
//! Real networks drop, reorder, and duplicate packets. To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] wraps another [`Transport`] and applies a fault model to
//! every outgoing datagram:
//!
//! | Fault            | Deterministic           | Probabilistic     |
//! |------------------|-------------------------|-------------------|
//! | Packet loss      | every `drop_every`-th   | `loss_rate`       |
//! | Duplication      | every `duplicate_every`-th | `duplicate_rate` |
//! | Reordering       | every `reorder_every`-th is held back and sent after the next datagram | — |
//!
//! Datagrams are counted from 1. When a datagram matches several periodic
//! faults, loss wins over duplication, which wins over reordering.
//! Probabilistic faults draw from a `StdRng` seeded from
//! [`SimulatorConfig::seed`] so failures are reproducible.
//!
//! Receives pass straight through to the inner transport.

use std::net::SocketAddr;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::Packet;
use crate::socket::{SocketError, Transport};

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub drop_every: Option<u64>,
    pub duplicate_every: Option<u64>,
    pub reorder_every: Option<u64>,
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            drop_every: None,
            duplicate_every: None,
            reorder_every: None,
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// Fault counters, for asserting that a test actually exercised recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Deliver,
    Drop,
    Duplicate,
    HoldBack,
}

struct FaultState {
    count: u64,
    rng: StdRng,
    held: Option<(Packet, SocketAddr)>,
    stats: SimulatorStats,
}

/// A fault-injecting wrapper around another transport.
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    state: Mutex<FaultState>,
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            state: Mutex::new(FaultState {
                count: 0,
                rng,
                held: None,
                stats: SimulatorStats::default(),
            }),
        }
    }

    pub fn stats(&self) -> SimulatorStats {
        self.lock().stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FaultState> {
        // A panic while holding this lock cannot leave the counters torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decide the fate of the next datagram and take any datagram that was
    /// being held back.
    fn next_fault(&self, packet: &Packet, dest: SocketAddr) -> (Fault, Option<(Packet, SocketAddr)>) {
        let mut state = self.lock();
        state.count += 1;
        state.stats.sent += 1;
        let n = state.count;
        let hits = |period: Option<u64>| period.is_some_and(|p| p > 0 && n % p == 0);

        let fault = if hits(self.config.drop_every) || roll(&mut state.rng, self.config.loss_rate) {
            Fault::Drop
        } else if hits(self.config.duplicate_every)
            || roll(&mut state.rng, self.config.duplicate_rate)
        {
            Fault::Duplicate
        } else if hits(self.config.reorder_every) && state.held.is_none() {
            Fault::HoldBack
        } else {
            Fault::Deliver
        };

        match fault {
            Fault::Drop => state.stats.dropped += 1,
            Fault::Duplicate => state.stats.duplicated += 1,
            Fault::HoldBack => state.stats.reordered += 1,
            Fault::Deliver => {}
        }

        if fault == Fault::HoldBack {
            state.held = Some((packet.clone(), dest));
            (fault, None)
        } else {
            (fault, state.held.take())
        }
    }
}

fn roll(rng: &mut StdRng, probability: f64) -> bool {
    probability > 0.0 && rng.random_bool(probability.min(1.0))
}

impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        let (fault, released) = self.next_fault(packet, dest);
        match fault {
            Fault::Drop => {
                log::trace!("[sim] drop seq={} ack={}", packet.header.seq, packet.header.ack);
            }
            Fault::Duplicate => {
                log::trace!("[sim] duplicate seq={}", packet.header.seq);
                self.inner.send_to(packet, dest).await?;
                self.inner.send_to(packet, dest).await?;
            }
            Fault::HoldBack => {
                log::trace!("[sim] hold back seq={}", packet.header.seq);
            }
            Fault::Deliver => self.inner.send_to(packet, dest).await?,
        }
        if let Some((held, held_dest)) = released {
            self.inner.send_to(&held, held_dest).await?;
        }
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        self.inner.recv_from().await
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}
