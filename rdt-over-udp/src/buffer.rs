//! Ordered segment buffer shared by both roles.
//!
//! The sender keeps every in-flight segment here until it is cumulatively
//! acknowledged; the receiver parks out-of-order segments here until the
//! gap in front of them is filled.
//!
//! Segments are keyed by sequence number in a `BTreeMap`, so iteration is
//! always in ascending order and a sequence number can appear at most once.
//! Callers refer to a buffered segment through a [`SegmentHandle`]; every
//! access through a handle is a lookup, so a handle to a segment that has
//! since been removed simply resolves to `None`.
//!
//! ```text
//!  front (oldest)                                   back (newest)
//!      │                                                 │
//!  ┌───▼───┐   ┌───────┐   ┌───────┐         ┌───────┐   │
//!  │ seq 0 │ → │ 1456  │ → │ 2912  │ → ... → │  N    │ ◀─┘
//!  └───────┘   └───────┘   └───────┘         └───────┘
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One unit of payload data in flight or awaiting reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset of the first payload byte within the stream.
    pub sequence_number: u32,
    pub payload: Vec<u8>,
    /// Time of the most recent transmission. Sender side only.
    pub sent_at: Option<Instant>,
    /// Number of retransmissions, for any reason. Sender side only.
    pub retransmit_count: u32,
    /// Number of timer-driven retransmissions. Sender side only.
    pub timeout_count: u32,
}

impl Segment {
    pub fn new(sequence_number: u32, payload: Vec<u8>) -> Self {
        Self {
            sequence_number,
            payload,
            sent_at: None,
            retransmit_count: 0,
            timeout_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First sequence number after this segment's payload.
    pub fn end(&self) -> u32 {
        self.sequence_number.wrapping_add(self.payload.len() as u32)
    }

    pub fn handle(&self) -> SegmentHandle {
        SegmentHandle(self.sequence_number)
    }
}

/// Opaque reference to a buffered segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentHandle(u32);

impl SegmentHandle {
    pub fn sequence_number(self) -> u32 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// SegmentBuffer
// ---------------------------------------------------------------------------

/// Segments ordered by sequence number, unique per sequence number.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    segments: BTreeMap<u32, Segment>,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `segment` at its sorted position.
    ///
    /// Returns `None` and drops `segment` if a segment with the same sequence
    /// number is already buffered.
    pub fn insert_sorted(&mut self, segment: Segment) -> Option<SegmentHandle> {
        use std::collections::btree_map::Entry;

        match self.segments.entry(segment.sequence_number) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let handle = segment.handle();
                slot.insert(segment);
                Some(handle)
            }
        }
    }

    /// Add `segment` behind every buffered segment.
    ///
    /// The sender assigns sequence numbers monotonically, so the new
    /// segment always belongs at the tail.
    pub fn append(&mut self, segment: Segment) -> SegmentHandle {
        debug_assert!(
            self.back()
                .map_or(true, |last| last.sequence_number < segment.sequence_number),
            "append of seq={} behind tail",
            segment.sequence_number
        );
        let handle = segment.handle();
        self.segments.insert(segment.sequence_number, segment);
        handle
    }

    /// Detach and return the segment behind `handle`, if it is still buffered.
    pub fn remove(&mut self, handle: SegmentHandle) -> Option<Segment> {
        self.segments.remove(&handle.0)
    }

    /// Remove every segment with `sequence_number < ack_number`.
    ///
    /// Segments at or beyond `ack_number` are untouched. Returns the removed
    /// segments oldest first.
    pub fn remove_up_to(&mut self, ack_number: u32) -> Vec<Segment> {
        let retained = self.segments.split_off(&ack_number);
        let removed = std::mem::replace(&mut self.segments, retained);
        removed.into_values().collect()
    }

    pub fn pop_front(&mut self) -> Option<Segment> {
        self.segments.pop_first().map(|(_, segment)| segment)
    }

    pub fn front(&self) -> Option<&Segment> {
        self.segments.values().next()
    }

    pub fn front_mut(&mut self) -> Option<&mut Segment> {
        self.segments.values_mut().next()
    }

    pub fn back(&self) -> Option<&Segment> {
        self.segments.values().next_back()
    }

    pub fn get(&self, handle: SegmentHandle) -> Option<&Segment> {
        self.segments.get(&handle.0)
    }

    /// Handle of the segment starting exactly at `sequence_number`.
    pub fn find(&self, sequence_number: u32) -> Option<SegmentHandle> {
        self.segments
            .contains_key(&sequence_number)
            .then_some(SegmentHandle(sequence_number))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate from lowest to highest sequence number.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn seg(seq: u32, len: usize) -> Segment {
        Segment::new(seq, vec![0u8; len])
    }

    fn seqs(buf: &SegmentBuffer) -> Vec<u32> {
        buf.iter().map(|s| s.sequence_number).collect()
    }

    #[test]
    fn insert_sorted_orders_out_of_order_arrivals() {
        let mut buf = SegmentBuffer::new();
        for seq in [30, 10, 50, 20, 40] {
            assert!(buf.insert_sorted(seg(seq, 10)).is_some());
        }
        assert_eq!(seqs(&buf), vec![10, 20, 30, 40, 50]);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn insert_sorted_discards_duplicate() {
        let mut buf = SegmentBuffer::new();
        buf.insert_sorted(Segment::new(100, b"first".to_vec()));
        assert!(buf.insert_sorted(Segment::new(100, b"second".to_vec())).is_none());
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.front().unwrap().payload, b"first");
    }

    #[test]
    fn random_insertions_stay_sorted_and_unique() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut buf = SegmentBuffer::new();
            let mut expected = std::collections::BTreeSet::new();
            for _ in 0..200 {
                let seq = rng.random_range(0..64u32) * 100;
                let inserted = buf.insert_sorted(seg(seq, 100)).is_some();
                assert_eq!(inserted, expected.insert(seq));
            }
            let got = seqs(&buf);
            assert!(got.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn append_keeps_tail_order() {
        let mut buf = SegmentBuffer::new();
        let a = buf.append(seg(0, 5));
        let b = buf.append(seg(5, 5));
        assert_eq!(buf.front().unwrap().handle(), a);
        assert_eq!(buf.back().unwrap().handle(), b);
    }

    #[test]
    fn remove_by_handle_then_handle_is_stale() {
        let mut buf = SegmentBuffer::new();
        let h = buf.append(seg(0, 5));
        buf.append(seg(5, 5));
        assert_eq!(buf.remove(h).unwrap().sequence_number, 0);
        assert!(buf.get(h).is_none());
        assert!(buf.remove(h).is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn remove_up_to_is_exact_for_every_ack() {
        let all: Vec<u32> = (0..8).map(|i| i * 10).collect();
        for ack in 0..=90 {
            let mut buf = SegmentBuffer::new();
            for &seq in &all {
                buf.append(seg(seq, 10));
            }
            let removed: Vec<u32> = buf
                .remove_up_to(ack)
                .iter()
                .map(|s| s.sequence_number)
                .collect();
            let below: Vec<u32> = all.iter().copied().filter(|&s| s < ack).collect();
            let rest: Vec<u32> = all.iter().copied().filter(|&s| s >= ack).collect();
            assert_eq!(removed, below, "ack={ack}");
            assert_eq!(seqs(&buf), rest, "ack={ack}");
        }
    }

    #[test]
    fn remove_up_to_leaves_out_of_order_tail() {
        let mut buf = SegmentBuffer::new();
        for seq in [0, 10, 40, 50] {
            buf.insert_sorted(seg(seq, 10));
        }
        buf.remove_up_to(20);
        assert_eq!(seqs(&buf), vec![40, 50]);
    }

    #[test]
    fn find_and_get() {
        let mut buf = SegmentBuffer::new();
        buf.append(seg(0, 4));
        let h = buf.find(0).unwrap();
        assert_eq!(buf.get(h).unwrap().len(), 4);
        assert!(buf.find(1).is_none());
    }

    #[test]
    fn segment_end() {
        assert_eq!(seg(1456, 1456).end(), 2912);
        assert_eq!(seg(10, 0).end(), 10);
    }

    #[test]
    fn pop_front_drains_in_order() {
        let mut buf = SegmentBuffer::new();
        buf.append(seg(0, 1));
        buf.append(seg(1, 1));
        assert_eq!(buf.pop_front().unwrap().sequence_number, 0);
        assert_eq!(buf.pop_front().unwrap().sequence_number, 1);
        assert!(buf.is_empty());
        assert!(buf.pop_front().is_none());
    }
}
