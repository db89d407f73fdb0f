//! Bounded byte ring between the receive path and the pacing loop.
//!
//! The buffer absorbs jitter between network arrival and device consumption.
//! It is the only shared-mutable state between the session task (producer)
//! and the driver task (consumer): a mutex guards the cursor arithmetic and
//! memcpy, overrun accounting goes through [`SharedStats`] atomics.
//!
//! Overflow policy is oldest-drop: a `push` never blocks and never rejects
//! data; when free space runs out the oldest buffered bytes are discarded so
//! playback stays close to live. Stale audio is worse than a click.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::types::SharedStats;

/// Notification that a `push` displaced buffered data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overrun {
    /// Oldest bytes discarded to make room (includes the head of an incoming
    /// payload larger than the whole buffer).
    pub dropped: usize,
}

struct Ring {
    buf: Box<[u8]>,
    read: usize,
    len: usize,
}

impl Ring {
    /// Appends `data`, discarding oldest bytes as needed. Returns how many
    /// bytes were displaced.
    fn push(&mut self, data: &[u8]) -> usize {
        let cap = self.buf.len();
        let mut dropped = 0;

        // A payload larger than the ring keeps only its newest `cap` bytes.
        let data = if data.len() > cap {
            dropped += data.len() - cap;
            &data[data.len() - cap..]
        } else {
            data
        };

        let free = cap - self.len;
        if data.len() > free {
            let evict = data.len() - free;
            self.read = (self.read + evict) % cap;
            self.len -= evict;
            dropped += evict;
        }

        let write = (self.read + self.len) % cap;
        let first = data.len().min(cap - write);
        self.buf[write..write + first].copy_from_slice(&data[..first]);
        self.buf[..data.len() - first].copy_from_slice(&data[first..]);
        self.len += data.len();

        dropped
    }

    /// Removes up to `n` oldest bytes in FIFO order.
    fn pull(&mut self, n: usize) -> Vec<u8> {
        let cap = self.buf.len();
        let take = n.min(self.len);
        let mut out = Vec::with_capacity(take);

        let first = take.min(cap - self.read);
        out.extend_from_slice(&self.buf[self.read..self.read + first]);
        out.extend_from_slice(&self.buf[..take - first]);

        self.read = (self.read + take) % cap;
        self.len -= take;
        out
    }
}

struct Shared {
    ring: Mutex<Ring>,
    closed: AtomicBool,
    stats: Arc<SharedStats>,
}

/// Fixed-capacity PCM byte ring. Capacity is set at construction; no resize.
pub struct FrameBuffer {
    shared: Arc<Shared>,
}

impl FrameBuffer {
    /// Creates a ring holding exactly `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; config validation rejects that earlier.
    pub fn new(capacity: usize, stats: Arc<SharedStats>) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring {
                    buf: vec![0u8; capacity].into_boxed_slice(),
                    read: 0,
                    len: 0,
                }),
                closed: AtomicBool::new(false),
                stats,
            }),
        }
    }

    /// Splits into producer and consumer halves.
    ///
    /// The producer half lives on the session task, the consumer half on the
    /// driver task. Each half can move to its task independently.
    pub fn split(self) -> (BufferProducer, BufferConsumer) {
        let consumer = BufferConsumer { shared: Arc::clone(&self.shared) };
        let producer = BufferProducer { shared: self.shared };
        (producer, consumer)
    }
}

/// Write half, owned by the receive path.
pub struct BufferProducer {
    shared: Arc<Shared>,
}

impl BufferProducer {
    /// Appends sample bytes without blocking.
    ///
    /// On insufficient free space the oldest buffered bytes are discarded,
    /// the overrun counter increments once, and `Err(Overrun)` reports how
    /// much was displaced. The new data is always accepted (capped to the
    /// newest `capacity` bytes of the payload).
    pub fn push(&self, data: &[u8]) -> Result<(), Overrun> {
        if data.is_empty() {
            return Ok(());
        }
        let dropped = {
            let mut ring = self.shared.ring.lock().expect("ring mutex poisoned");
            ring.push(data)
        };
        if dropped > 0 {
            self.shared.stats.record_overrun();
            trace!(dropped, "ring overrun, oldest bytes discarded");
            return Err(Overrun { dropped });
        }
        Ok(())
    }

    /// Marks the producer side closed; the consumer drains what remains.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

impl Drop for BufferProducer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read half, owned by the pacing loop.
pub struct BufferConsumer {
    shared: Arc<Shared>,
}

impl BufferConsumer {
    /// Removes up to `n` bytes without blocking. A short result is the
    /// caller's silence budget; the driver decides whether it counts as an
    /// underrun.
    pub fn pull(&self, n: usize) -> Vec<u8> {
        let mut ring = self.shared.ring.lock().expect("ring mutex poisoned");
        ring.pull(n)
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.shared.ring.lock().expect("ring mutex poisoned").len
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.lock().expect("ring mutex poisoned").buf.len()
    }

    /// Whether the producer side has closed (session reached a terminal
    /// state); remaining bytes are still pullable.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(capacity: usize) -> (BufferProducer, BufferConsumer) {
        FrameBuffer::new(capacity, Arc::new(SharedStats::default())).split()
    }

    fn buffer_with_stats(capacity: usize) -> (BufferProducer, BufferConsumer, Arc<SharedStats>) {
        let stats = Arc::new(SharedStats::default());
        let (tx, rx) = FrameBuffer::new(capacity, Arc::clone(&stats)).split();
        (tx, rx, stats)
    }

    #[test]
    fn round_trip_preserves_bytes_in_order() {
        let (tx, rx) = buffer(1024);
        let data: Vec<u8> = (0..=255).collect();
        tx.push(&data).unwrap();
        assert_eq!(rx.pull(256), data);
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn pull_on_empty_never_blocks_and_returns_empty_twice() {
        let (_tx, rx) = buffer(128);
        assert!(rx.pull(64).is_empty());
        assert!(rx.pull(64).is_empty());
    }

    #[test]
    fn overflow_drops_oldest_and_counts_one_overrun() {
        // Capacity 1000, push 600 (A) then 600 (B); the ring
        // holds the last 1000 bytes spanning the tail of A and all of B.
        let (tx, rx, stats) = buffer_with_stats(1000);
        let a = vec![0xAAu8; 600];
        let b = vec![0xBBu8; 600];

        tx.push(&a).unwrap();
        let err = tx.push(&b).unwrap_err();
        assert_eq!(err.dropped, 200);

        let content = rx.pull(1000);
        assert_eq!(content.len(), 1000);
        assert_eq!(&content[..400], &vec![0xAAu8; 400][..]);
        assert_eq!(&content[400..], &vec![0xBBu8; 600][..]);

        assert_eq!(stats.snapshot().overruns, 1);
    }

    #[test]
    fn oversize_payload_keeps_its_newest_capacity_bytes() {
        let (tx, rx, stats) = buffer_with_stats(100);
        let data: Vec<u8> = (0..250).map(|i| (i % 256) as u8).collect();

        let err = tx.push(&data).unwrap_err();
        assert_eq!(err.dropped, 150);

        assert_eq!(rx.pull(100), &data[150..]);
        assert_eq!(stats.snapshot().overruns, 1);
    }

    #[test]
    fn short_pull_returns_what_exists() {
        let (tx, rx) = buffer(64);
        tx.push(&[1, 2, 3]).unwrap();
        assert_eq!(rx.pull(10), vec![1, 2, 3]);
    }

    #[test]
    fn wraparound_preserves_order() {
        let (tx, rx) = buffer(8);
        tx.push(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(rx.pull(4), vec![1, 2, 3, 4]);
        // Write crosses the end of the backing slice
        tx.push(&[7, 8, 9, 10]).unwrap();
        assert_eq!(rx.pull(8), vec![5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn empty_push_is_a_no_op() {
        let (tx, rx, stats) = buffer_with_stats(16);
        tx.push(&[]).unwrap();
        assert_eq!(rx.buffered(), 0);
        assert_eq!(stats.snapshot().overruns, 0);
    }

    #[test]
    fn close_is_visible_to_the_consumer_and_drains() {
        let (tx, rx) = buffer(64);
        tx.push(&[9; 10]).unwrap();
        assert!(!rx.is_closed());
        tx.close();
        assert!(rx.is_closed());
        assert_eq!(rx.pull(10).len(), 10);
    }

    #[test]
    fn dropping_the_producer_closes_the_buffer() {
        let (tx, rx) = buffer(64);
        drop(tx);
        assert!(rx.is_closed());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::VecDeque;

        proptest! {
            #[test]
            fn retains_exactly_the_newest_capacity_bytes(
                capacity in 1usize..512,
                pushes in prop::collection::vec(
                    prop::collection::vec(any::<u8>(), 0..300), 0..20
                ),
            ) {
                let (tx, rx) = buffer(capacity);

                // Reference model: unbounded queue truncated from the front
                let mut model: VecDeque<u8> = VecDeque::new();
                for chunk in &pushes {
                    let _ = tx.push(chunk);
                    model.extend(chunk.iter().copied());
                    while model.len() > capacity {
                        model.pop_front();
                    }
                }

                let got = rx.pull(capacity);
                let want: Vec<u8> = model.into_iter().collect();
                prop_assert_eq!(got, want);
            }

            #[test]
            fn under_capacity_pushes_round_trip_in_order(
                chunks in prop::collection::vec(
                    prop::collection::vec(any::<u8>(), 1..32), 1..8
                ),
            ) {
                let total: usize = chunks.iter().map(Vec::len).sum();
                let (tx, rx) = buffer(total.max(1));

                for chunk in &chunks {
                    prop_assert!(tx.push(chunk).is_ok());
                }

                let expected: Vec<u8> = chunks.concat();
                prop_assert_eq!(rx.pull(total), expected);
            }
        }
    }
}
