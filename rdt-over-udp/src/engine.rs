//! Sender engine: the transmission loop of one file transfer.
//!
//! # Architecture
//!
//! ```text
//!   source (AsyncRead)
//!      │ chunks ≤ DATA_SIZE
//!      ▼
//!  SenderEngine::run ──────────────┐        AckProcessor::run (task)
//!   ├─ admit while window allows   │           │ recv ACKs
//!   ├─ handle TimerEvent ◀── timer │           │
//!   └─ wait for progress ◀─────────┼─ Notify ──┤
//!                                  ▼           ▼
//!                      Arc<Mutex<SendState>> (single critical region)
//! ```
//!
//! The engine owns the receiving end of the timer channel, so a timer
//! expiry is handled as an ordinary event in this task rather than
//! preempting it. Once every byte is acknowledged the engine sends the
//! end-of-stream marker a fixed number of times (it is never acknowledged)
//! and stops the acknowledgment task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::ack::AckProcessor;
use crate::config::SenderConfig;
use crate::error::TransferError;
use crate::packet::DATA_SIZE;
use crate::sender::{SendState, TransferStats};
use crate::socket::Transport;
use crate::telemetry::CwndLog;
use crate::timer::{RetransmitTimer, TimerEvent};

pub struct SenderEngine<T> {
    transport: Arc<T>,
    peer: SocketAddr,
    state: Arc<Mutex<SendState>>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    progress: Arc<Notify>,
    eos_repeats: u32,
}

impl<T: Transport> SenderEngine<T> {
    /// Build an engine sending to `peer` over `transport`.
    ///
    /// Opens the congestion-window log if `config.cwnd_log` is set.
    pub fn new(
        transport: Arc<T>,
        peer: SocketAddr,
        config: &SenderConfig,
    ) -> Result<Self, TransferError> {
        let telemetry = match &config.cwnd_log {
            Some(path) => Some(CwndLog::create(path)?),
            None => None,
        };
        Ok(Self::with_telemetry(transport, peer, config, telemetry))
    }

    pub fn with_telemetry(
        transport: Arc<T>,
        peer: SocketAddr,
        config: &SenderConfig,
        telemetry: Option<CwndLog>,
    ) -> Self {
        let (timer, timer_rx) = RetransmitTimer::new();
        Self {
            transport,
            peer,
            state: Arc::new(Mutex::new(SendState::new(config, timer, telemetry))),
            timer_rx,
            progress: Arc::new(Notify::new()),
            eos_repeats: config.eos_repeats,
        }
    }

    /// Transfer everything `source` yields and return the transfer counters.
    pub async fn run<R: AsyncRead + Unpin>(
        mut self,
        mut source: R,
    ) -> Result<TransferStats, TransferError> {
        let acks = tokio::spawn(AckProcessor::new().run(
            Arc::clone(&self.transport),
            self.peer,
            Arc::clone(&self.state),
            Arc::clone(&self.progress),
        ));
        let result = self.transmit(&mut source, acks).await;

        let mut st = self.state.lock().await;
        st.stop_timer();
        st.flush_telemetry();
        let stats = st.stats();
        drop(st);
        result?;

        log::info!(
            "[sender] done: {} bytes, {} segments, {} retransmissions ({} timeouts, {} fast)",
            stats.bytes_acked,
            stats.segments_sent,
            stats.retransmissions,
            stats.timeouts,
            stats.fast_retransmits
        );
        Ok(stats)
    }

    async fn transmit<R: AsyncRead + Unpin>(
        &mut self,
        source: &mut R,
        mut acks: JoinHandle<Result<(), TransferError>>,
    ) -> Result<(), TransferError> {
        let result = self.pump(source, &mut acks).await;
        acks.abort();
        result?;
        self.send_end_of_stream().await;
        Ok(())
    }

    /// Admit, send and recover until every byte of `source` is acknowledged.
    async fn pump<R: AsyncRead + Unpin>(
        &mut self,
        source: &mut R,
        acks: &mut JoinHandle<Result<(), TransferError>>,
    ) -> Result<(), TransferError> {
        let mut pending: Option<Vec<u8>> = None;
        let mut acks_done = false;

        loop {
            while let Ok(event) = self.timer_rx.try_recv() {
                self.handle_timeout(event).await?;
            }

            if pending.is_none() && !self.state.lock().await.is_exhausted() {
                let chunk = read_chunk(source).await?;
                if chunk.is_empty() {
                    log::info!("[sender] end of source reached");
                    self.state.lock().await.mark_exhausted();
                } else {
                    pending = Some(chunk);
                }
            }

            {
                let mut st = self.state.lock().await;
                if st.can_admit() {
                    if let Some(chunk) = pending.take() {
                        if u64::from(st.next_seqno()) + chunk.len() as u64 > u64::from(u32::MAX) {
                            return Err(TransferError::StreamTooLong);
                        }
                        let pkt = st.admit(chunk, Instant::now())?;
                        self.transport.send_to(&pkt, self.peer).await?;
                        log::debug!(
                            "[sender] → DATA seq={} len={} in_flight={} cwnd={:.2}",
                            pkt.header.seq,
                            pkt.payload.len(),
                            st.in_flight(),
                            st.congestion().window_size()
                        );
                        continue;
                    }
                }
                if st.is_complete() {
                    return Ok(());
                }
            }

            tokio::select! {
                Some(event) = self.timer_rx.recv() => {
                    self.handle_timeout(event).await?;
                }
                _ = self.progress.notified() => {}
                joined = &mut *acks, if !acks_done => {
                    acks_done = true;
                    joined??;
                }
            }
        }
    }

    async fn handle_timeout(&self, event: TimerEvent) -> Result<(), TransferError> {
        let mut st = self.state.lock().await;
        if let Some(pkt) = st.on_timeout(event, Instant::now()) {
            log::debug!("[sender] timeout → resend seq={}", pkt.header.seq);
            self.transport.send_to(&pkt, self.peer).await?;
        }
        Ok(())
    }

    /// Send the end-of-stream marker `eos_repeats` times. Best effort.
    async fn send_end_of_stream(&self) {
        let eos = self.state.lock().await.end_of_stream();
        for _ in 0..self.eos_repeats {
            if let Err(e) = self.transport.send_to(&eos, self.peer).await {
                log::debug!("[sender] end-of-stream send failed: {e}");
            }
        }
        log::info!("[sender] → EOS seq={} x{}", eos.header.seq, self.eos_repeats);
    }
}

/// Read up to [`DATA_SIZE`] bytes, short only at end of input.
async fn read_chunk<R: AsyncRead + Unpin>(source: &mut R) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; DATA_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
