//! Lock-free single-producer/single-consumer byte queue.
//!
//! The storage is `capacity + 1` bytes so a full buffer is distinguishable
//! from an empty one without a separate counter: `head == tail` is empty,
//! `tail + 1 == head` (mod storage) is full. `tail` is stored only by the
//! producer; `head` normally only by the consumer, except that the producer
//! advances it (compare-exchange, forward only, up to `tail`) when it drops
//! the queue. Both cursors are published with release stores and observed
//! with acquire loads.
//!
//! The producer is the core's audio callback and must never block, so a write
//! that does not fit discards everything queued and keeps only the incoming
//! data (drop-and-clear). The drop is logged; it is an audible degrade, not
//! an error.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Shared {
    data: Box<[UnsafeCell<u8>]>,
    /// Consumer cursor: next byte to read. Advanced by the consumer, and by
    /// the producer (via compare-exchange) when it drops the queue.
    head: AtomicUsize,
    /// Producer cursor: next byte to write. Producer-only.
    tail: AtomicUsize,
}

// The UnsafeCell storage is only touched in the disjoint [head, tail) /
// [tail, head) windows each side owns.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn storage_len(&self) -> usize {
        self.data.len()
    }

    fn occupied(&self, head: usize, tail: usize) -> usize {
        (tail + self.storage_len() - head) % self.storage_len()
    }

    /// Copies `src` into the storage starting at `at`, wrapping once.
    unsafe fn copy_in(&self, at: usize, src: &[u8]) {
        let n = self.storage_len();
        let first = src.len().min(n - at);
        unsafe {
            let base = self.data.as_ptr() as *mut u8;
            std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(at), first);
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), base, src.len() - first);
        }
    }

    /// Copies storage bytes starting at `at` into `dst`, wrapping once.
    unsafe fn copy_out(&self, at: usize, dst: &mut [u8]) {
        let n = self.storage_len();
        let first = dst.len().min(n - at);
        unsafe {
            let base = self.data.as_ptr() as *const u8;
            std::ptr::copy_nonoverlapping(base.add(at), dst.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(base, dst.as_mut_ptr().add(first), dst.len() - first);
        }
    }
}

/// Creates a ring able to hold `capacity` bytes and splits it into its two
/// single-owner endpoints.
pub fn ring(capacity: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity > 0, "ring capacity must be non-zero");
    let data = (0..capacity + 1)
        .map(|_| UnsafeCell::new(0))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let shared = Arc::new(Shared {
        data,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        RingProducer {
            shared: shared.clone(),
        },
        RingConsumer { shared },
    )
}

pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Queues `src`, returning the number of bytes accepted.
    ///
    /// When `src` does not fit next to the already-queued bytes, everything
    /// previously queued is discarded first; when `src` alone exceeds the
    /// capacity it is dropped entirely and 0 is returned.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = self.shared.storage_len();
        if src.len() > n - 1 {
            tracing::warn!(
                incoming = src.len(),
                capacity = n - 1,
                "write exceeds ring capacity, dropped whole"
            );
            return 0;
        }
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let mut head = self.shared.head.load(Ordering::Acquire);

        if src.len() > n - 1 - self.shared.occupied(head, tail) {
            tracing::warn!(
                queued = self.shared.occupied(head, tail),
                incoming = src.len(),
                "audio ring overflow, dropping queued samples"
            );
            // Drop-and-clear by advancing the consumer cursor up to the
            // producer's. The consumer moves `head` concurrently, so this
            // must be an exchange: a failed one means the consumer freed
            // space, and the fit is re-checked against its fresh position.
            while src.len() > n - 1 - self.shared.occupied(head, tail) {
                match self.shared.head.compare_exchange(
                    head,
                    tail,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => head = tail,
                    Err(current) => head = current,
                }
            }
        }

        unsafe { self.shared.copy_in(tail, src) };
        self.shared
            .tail
            .store((tail + src.len()) % n, Ordering::Release);
        src.len()
    }

    pub fn len(&self) -> usize {
        let head = self.shared.head.load(Ordering::Acquire);
        let tail = self.shared.tail.load(Ordering::Acquire);
        self.shared.occupied(head, tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Dequeues up to `dst.len()` bytes in FIFO order, returning the count.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = self.shared.storage_len();
        loop {
            let head = self.shared.head.load(Ordering::Acquire);
            let tail = self.shared.tail.load(Ordering::Acquire);
            let take = self.shared.occupied(head, tail).min(dst.len());
            if take == 0 {
                return 0;
            }

            unsafe { self.shared.copy_out(head, &mut dst[..take]) };
            // The producer moves `head` itself when it drops the queue; if
            // it did, the bytes just copied were condemned, so discard them
            // and retry against the new cursors.
            if self
                .shared
                .head
                .compare_exchange(head, (head + take) % n, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return take;
            }
        }
    }

    /// Dequeues exactly `dst.len()` bytes, or nothing at all when fewer are
    /// queued. Keeps multi-byte records whole across underruns.
    pub fn read_exact(&mut self, dst: &mut [u8]) -> bool {
        let n = self.shared.storage_len();
        loop {
            let head = self.shared.head.load(Ordering::Acquire);
            let tail = self.shared.tail.load(Ordering::Acquire);
            if self.shared.occupied(head, tail) < dst.len() {
                return false;
            }

            unsafe { self.shared.copy_out(head, dst) };
            if self
                .shared
                .head
                .compare_exchange(
                    head,
                    (head + dst.len()) % n,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Drops everything currently queued.
    pub fn clear(&mut self) {
        let mut head = self.shared.head.load(Ordering::Acquire);
        loop {
            let tail = self.shared.tail.load(Ordering::Acquire);
            if head == tail {
                return;
            }
            match self
                .shared
                .head
                .compare_exchange(head, tail, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    pub fn len(&self) -> usize {
        let head = self.shared.head.load(Ordering::Acquire);
        let tail = self.shared.tail.load(Ordering::Acquire);
        self.shared.occupied(head, tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_round_trip() {
        let (mut tx, mut rx) = ring(64);
        assert_eq!(tx.write(b"hello"), 5);
        assert_eq!(tx.write(b" world"), 6);
        assert_eq!(rx.len(), 11);

        let mut out = [0u8; 11];
        assert_eq!(rx.read(&mut out), 11);
        assert_eq!(&out, b"hello world");
        assert_eq!(rx.len(), 0);
        assert!(tx.is_empty());
    }

    #[test]
    fn read_is_bounded_by_available_bytes() {
        let (mut tx, mut rx) = ring(16);
        tx.write(b"abc");
        let mut out = [0u8; 8];
        assert_eq!(rx.read(&mut out), 3);
        assert_eq!(&out[..3], b"abc");
        assert_eq!(rx.read(&mut out), 0);
    }

    #[test]
    fn wraps_across_the_storage_boundary() {
        let (mut tx, mut rx) = ring(8);
        let mut out = [0u8; 8];
        // Push the cursors near the end of storage, then wrap.
        assert_eq!(tx.write(b"123456"), 6);
        assert_eq!(rx.read(&mut out[..6]), 6);
        assert_eq!(tx.write(b"abcdefgh"), 8);
        assert_eq!(rx.read(&mut out), 8);
        assert_eq!(&out, b"abcdefgh");
    }

    #[test]
    fn overflow_clears_queued_bytes_and_keeps_incoming() {
        let (mut tx, mut rx) = ring(8);
        assert_eq!(tx.write(b"12345678"), 8);
        // Does not fit alongside the queued data: queue is dropped first.
        assert_eq!(tx.write(b"abcd"), 4);
        assert_eq!(rx.len(), 4);

        let mut out = [0u8; 8];
        assert_eq!(rx.read(&mut out), 4);
        assert_eq!(&out[..4], b"abcd");
    }

    #[test]
    fn oversized_write_is_dropped_whole() {
        let (mut tx, rx) = ring(4);
        assert_eq!(tx.write(b"way too large"), 0);
        assert_eq!(rx.len(), 0);
    }

    #[test]
    fn read_exact_leaves_short_data_queued() {
        let (mut tx, mut rx) = ring(16);
        tx.write(b"abcdef");

        let mut frame = [0u8; 4];
        assert!(rx.read_exact(&mut frame));
        assert_eq!(&frame, b"abcd");

        // Two bytes left: an exact read of four takes nothing.
        assert!(!rx.read_exact(&mut frame));
        assert_eq!(rx.len(), 2);

        tx.write(b"gh");
        assert!(rx.read_exact(&mut frame));
        assert_eq!(&frame, b"efgh");
    }

    /// Overflow clears race the consumer: the dropped span must never expose
    /// unpublished bytes or split a 4-byte record. Frames carry a strictly
    /// increasing counter, so any stale or phantom read breaks monotonicity.
    #[test]
    fn overflow_drops_whole_frames_under_contention() {
        let (mut tx, mut rx) = ring(64);
        const FRAMES: u32 = 20_000;
        let writer = std::thread::spawn(move || {
            for i in 1..=FRAMES {
                tx.write(&i.to_le_bytes());
            }
        });

        let mut last = 0u32;
        let mut frame = [0u8; 4];
        loop {
            if rx.read_exact(&mut frame) {
                let value = u32::from_le_bytes(frame);
                assert!(value > last, "read frame {value} after {last}");
                assert!(value <= FRAMES);
                last = value;
            } else if writer.is_finished() && rx.is_empty() {
                break;
            }
        }
        writer.join().unwrap();
        assert!(last > 0);
    }

    #[test]
    fn producer_never_blocks_across_threads() {
        let (mut tx, mut rx) = ring(1024);
        let writer = std::thread::spawn(move || {
            for i in 0..100u32 {
                tx.write(&i.to_le_bytes());
            }
        });

        let mut seen = Vec::new();
        let mut buf = [0u8; 64];
        while seen.len() < 400 {
            let got = rx.read(&mut buf);
            seen.extend_from_slice(&buf[..got]);
            if got == 0 && writer.is_finished() && rx.is_empty() {
                break;
            }
        }
        writer.join().unwrap();

        // 1 KiB capacity fits all 400 bytes, so nothing was dropped and the
        // values arrive in order.
        assert_eq!(seen.len(), 400);
        for (i, chunk) in seen.chunks_exact(4).enumerate() {
            assert_eq!(u32::from_le_bytes(chunk.try_into().unwrap()), i as u32);
        }
    }
}
