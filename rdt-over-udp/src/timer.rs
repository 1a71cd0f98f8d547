//! Retransmission timer.
//!
//! [`RetransmitTimer`] is a single-shot alarm. Arming it spawns a tokio task
//! that sleeps for the requested duration and then posts a [`TimerEvent`]
//! on an mpsc channel; the owner of the receiving end (the sender engine)
//! handles the expiry in its own task, under the same lock as every other
//! window mutation.
//!
//! Every arming gets a fresh generation number. An expiry is only honoured
//! if it is [`claim`](RetransmitTimer::claim)ed while its generation is still
//! the armed one, so an event that was already in the channel when the
//! timer was stopped or re-armed is discarded.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Expiry notification posted by an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    generation: u64,
}

struct Armed {
    generation: u64,
    duration: Duration,
    task: JoinHandle<()>,
}

/// Handle owned by the sender's shared window state.
pub struct RetransmitTimer {
    events: mpsc::UnboundedSender<TimerEvent>,
    generation: u64,
    armed: Option<Armed>,
}

impl RetransmitTimer {
    /// Create a disarmed timer and the channel its expiries arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                generation: 0,
                armed: None,
            },
            rx,
        )
    }

    /// Arm the timer to fire once after `duration`.
    ///
    /// A timer that is already armed is disarmed first.
    pub fn start(&mut self, duration: Duration) {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(TimerEvent { generation });
        });
        log::trace!("[timer] armed gen={generation} for {duration:?}");
        self.armed = Some(Armed {
            generation,
            duration,
            task,
        });
    }

    /// Disarm without firing. No-op when not armed.
    pub fn stop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
            log::trace!("[timer] stopped gen={}", armed.generation);
        }
    }

    /// Stop, then start with `duration`.
    pub fn reset(&mut self, duration: Duration) {
        self.stop();
        self.start(duration);
    }

    /// Accept an expiry event.
    ///
    /// Returns `true` (and leaves the timer disarmed) only if `event` came
    /// from the current arming; stale events return `false`.
    pub fn claim(&mut self, event: TimerEvent) -> bool {
        match &self.armed {
            Some(armed) if armed.generation == event.generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Duration of the current arming, if armed.
    pub fn armed_for(&self) -> Option<Duration> {
        self.armed.as_ref().map(|a| a.duration)
    }
}

impl Drop for RetransmitTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RetransmitTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetransmitTimer")
            .field("generation", &self.generation)
            .field("armed_for", &self.armed_for())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Instant};

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_duration() {
        let (mut timer, mut rx) = RetransmitTimer::new();
        let started = Instant::now();
        timer.start(Duration::from_millis(300));

        let event = rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(timer.claim(event));
        assert!(!timer.is_armed());

        // Single shot: nothing else arrives.
        assert!(timeout(Duration::from_secs(10), rx.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_expiry() {
        let (mut timer, mut rx) = RetransmitTimer::new();
        timer.start(Duration::from_millis(100));
        timer.stop();
        assert!(!timer.is_armed());
        assert!(timeout(Duration::from_secs(1), rx.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_replaces_deadline() {
        let (mut timer, mut rx) = RetransmitTimer::new();
        let started = Instant::now();
        timer.start(Duration::from_millis(100));
        timer.reset(Duration::from_millis(500));
        assert_eq!(timer.armed_for(), Some(Duration::from_millis(500)));

        let event = rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(timer.claim(event));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_event_is_not_claimed() {
        let (mut timer, mut rx) = RetransmitTimer::new();
        timer.start(Duration::from_millis(50));
        let stale = rx.recv().await.unwrap();

        // Re-armed before the expiry was handled.
        timer.start(Duration::from_millis(50));
        assert!(!timer.claim(stale));
        assert!(timer.is_armed());

        let fresh = rx.recv().await.unwrap();
        assert!(timer.claim(fresh));
        assert!(!timer.claim(fresh));
    }
}
