//! Receive-side reassembly.
//!
//! [`Reassembler`] keeps segments that arrived ahead of a gap and releases
//! the contiguous prefix as soon as the gap fills:
//!
//! ```text
//!  receive_base = 100
//!  buffered:  [200..300) [300..400)
//!  arrives:   [100..200)  → flush 100, 200, 300 → receive_base = 400
//! ```
//!
//! Every data segment is answered with one cumulative ACK carrying
//! `receive_base` and echoing the segment's sequence number, so the sender
//! can tell a duplicate (ack < echo) from progress. The zero-length
//! end-of-stream segment is neither buffered nor acknowledged.
//!
//! [`Reassembler`] only manages state; [`receive`] drives it from a
//! transport and writes flushed bytes to the sink.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::buffer::{Segment, SegmentBuffer};
use crate::error::TransferError;
use crate::packet::Packet;
use crate::socket::{SocketError, Transport};

// ---------------------------------------------------------------------------
// Reassembler
// ---------------------------------------------------------------------------

/// What one data segment did to the receive state.
#[derive(Debug)]
pub struct Reassembly {
    /// In-order segments released by this arrival, lowest first.
    pub flushed: Vec<Segment>,
    /// Cumulative acknowledgment to send back.
    pub ack: Packet,
    /// The segment lay entirely below `receive_base` or was already buffered.
    pub duplicate: bool,
}

#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: SegmentBuffer,
    /// Next byte expected in order; everything below it has been delivered.
    receive_base: u32,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a data segment and return the bytes it releases.
    pub fn accept(&mut self, packet: &Packet) -> Reassembly {
        let seq = packet.header.seq;

        if seq < self.receive_base {
            return Reassembly {
                flushed: Vec::new(),
                ack: Packet::ack(seq, self.receive_base),
                duplicate: true,
            };
        }

        let segment = Segment::new(seq, packet.payload.clone());
        let duplicate = self.buffer.insert_sorted(segment).is_none();

        let mut flushed = Vec::new();
        while self
            .buffer
            .front()
            .is_some_and(|s| s.sequence_number == self.receive_base)
        {
            let Some(segment) = self.buffer.pop_front() else {
                break;
            };
            self.receive_base = segment.end();
            flushed.push(segment);
        }

        Reassembly {
            flushed,
            ack: Packet::ack(seq, self.receive_base),
            duplicate,
        }
    }

    pub fn receive_base(&self) -> u32 {
        self.receive_base
    }

    /// Segments held back waiting for a gap to fill.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

/// Counters returned by [`receive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    pub bytes_written: u64,
    pub segments_accepted: u64,
    pub duplicates: u64,
    /// Segments that had to wait in the buffer for an earlier one.
    pub out_of_order: u64,
}

/// Receive one stream from `transport` into `sink` until end of stream.
///
/// Acknowledgments go back to whichever address sent the segment.
pub async fn receive<T, W>(transport: &T, sink: &mut W) -> Result<ReceiveReport, TransferError>
where
    T: Transport,
    W: AsyncWrite + Unpin,
{
    let mut reassembler = Reassembler::new();
    let mut report = ReceiveReport::default();
    log::info!("[receiver] listening on {}", transport.local_addr());

    loop {
        let (pkt, from) = match transport.recv_from().await {
            Ok(v) => v,
            Err(SocketError::Packet(e)) => {
                log::warn!("[receiver] discarding malformed datagram: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if pkt.is_ack() {
            log::debug!("[receiver] ignoring ACK from {from}");
            continue;
        }
        if pkt.is_end_of_stream() {
            if pkt.header.seq != reassembler.receive_base() {
                log::warn!(
                    "[receiver] end of stream at seq={} but receive_base={}",
                    pkt.header.seq,
                    reassembler.receive_base()
                );
            }
            break;
        }

        log::trace!(
            "[receiver] {} {} {}",
            epoch_millis(),
            pkt.payload.len(),
            pkt.header.seq
        );

        let outcome = reassembler.accept(&pkt);
        if outcome.duplicate {
            report.duplicates += 1;
        } else {
            report.segments_accepted += 1;
            if outcome.flushed.first().map(|s| s.sequence_number) != Some(pkt.header.seq) {
                report.out_of_order += 1;
            }
        }

        for segment in &outcome.flushed {
            sink.write_all(&segment.payload).await?;
            report.bytes_written += segment.len() as u64;
        }

        log::debug!(
            "[receiver] → ACK ack={} echo={} buffered={}",
            outcome.ack.header.ack,
            pkt.header.seq,
            reassembler.buffered()
        );
        transport.send_to(&outcome.ack, from).await?;
    }

    sink.flush().await?;
    log::info!(
        "[receiver] done: {} bytes, {} duplicates, {} out of order",
        report.bytes_written,
        report.duplicates,
        report.out_of_order
    );
    Ok(report)
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(seq: u32, len: usize) -> Packet {
        Packet::data(seq, vec![(seq % 251) as u8; len])
    }

    fn flushed_seqs(r: &Reassembly) -> Vec<u32> {
        r.flushed.iter().map(|s| s.sequence_number).collect()
    }

    #[test]
    fn in_order_segment_flushes_immediately() {
        let mut r = Reassembler::new();
        let out = r.accept(&seg(0, 100));
        assert_eq!(flushed_seqs(&out), vec![0]);
        assert_eq!(out.ack.header.ack, 100);
        assert_eq!(out.ack.header.seq, 0);
        assert!(out.ack.is_ack());
        assert_eq!(r.receive_base(), 100);
    }

    #[test]
    fn gap_fill_releases_buffered_run() {
        let mut r = Reassembler::new();
        r.accept(&seg(0, 100));

        let out = r.accept(&seg(200, 100));
        assert!(out.flushed.is_empty());
        assert_eq!((out.ack.header.ack, out.ack.header.seq), (100, 200));
        let out = r.accept(&seg(300, 50));
        assert!(out.flushed.is_empty());
        assert_eq!(r.buffered(), 2);

        let out = r.accept(&seg(100, 100));
        assert_eq!(flushed_seqs(&out), vec![100, 200, 300]);
        assert_eq!(out.ack.header.ack, 350);
        assert_eq!(r.receive_base(), 350);
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn segment_below_base_is_duplicate() {
        let mut r = Reassembler::new();
        r.accept(&seg(0, 100));
        r.accept(&seg(100, 100));

        let out = r.accept(&seg(0, 100));
        assert!(out.duplicate);
        assert!(out.flushed.is_empty());
        assert_eq!((out.ack.header.ack, out.ack.header.seq), (200, 0));
    }

    #[test]
    fn repeated_out_of_order_segment_is_buffered_once() {
        let mut r = Reassembler::new();
        assert!(!r.accept(&seg(100, 100)).duplicate);
        assert!(r.accept(&seg(100, 100)).duplicate);
        assert_eq!(r.buffered(), 1);

        let out = r.accept(&seg(0, 100));
        assert_eq!(flushed_seqs(&out), vec![0, 100]);
    }

    #[tokio::test]
    async fn receive_writes_stream_and_stops_at_end_of_stream() {
        use crate::socket::Socket;

        let rx = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let tx = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let dest = rx.local_addr();

        let peer = tokio::spawn(async move {
            tx.send_to(&Packet::data(3, b"def".to_vec()), dest).await.unwrap();
            tx.send_to(&Packet::data(0, b"abc".to_vec()), dest).await.unwrap();
            let mut acks = Vec::new();
            for _ in 0..2 {
                let (pkt, _) = tx.recv_from().await.unwrap();
                acks.push((pkt.header.ack, pkt.header.seq));
            }
            tx.send_to(&Packet::end_of_stream(6), dest).await.unwrap();
            acks
        });

        let mut sink = Vec::new();
        let report = receive(&rx, &mut sink).await.unwrap();
        let acks = peer.await.unwrap();

        assert_eq!(sink, b"abcdef");
        assert_eq!(acks, vec![(0, 3), (6, 0)]);
        assert_eq!(report.bytes_written, 6);
        assert_eq!(report.segments_accepted, 2);
        assert_eq!(report.out_of_order, 1);
    }
}
