use crate::invariants::{
    debug_assert_bounded_count, debug_assert_monotonic, debug_assert_read_not_past_write,
};
use crate::{Backoff, RingError, RingMetrics, RingMetricsSnapshot};
use crossbeam_utils::CachePadded;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This MPMC ring buffer stores owning pointers in atomic slots and coordinates
// producers and consumers through two unbounded u64 position counters.
//
// ## Sequence Numbers (ABA Prevention)
//
// `write_pos` and `read_pos` are monotonically increasing u64 sequence
// numbers, never wrapped indices. With 2^64 values, wrap-around is practically
// impossible; the slot index is computed as `pos & mask` only at access time.
//
// ## Protocol
//
// **Producer:**
// 1. Load `write_pos` (Relaxed) and `cached_read` (Relaxed)
// 2. If the cached view says full, refresh from `read_pos` (Acquire)
// 3. CAS `write_pos` forward to claim one position (or a whole range)
// 4. Wait for the claimed slot to be null (a consumer from the previous lap
//    may still hold it), then `store` the pointer with Release
//
// **Consumer:**
// 1. Load `read_pos` (Relaxed) and `cached_write` (Relaxed)
// 2. If the cached view says empty, refresh from `write_pos` (Acquire)
// 3. CAS `read_pos` forward to claim one position (or a scanned-ready range)
// 4. `swap` the slot to null with Acquire; if the producer claimed the
//    position but has not published yet, spin-yield until the pointer appears
//
// The slot Release/Acquire pair is what publishes the pointee: a consumer
// that observes a non-null pointer also observes every write the producer
// made to the boxed value before storing it.
//
// Cached mirrors (`cached_read` for producers, `cached_write` for consumers)
// are refreshed only when the cached view would fail the operation, cutting
// cross-core counter traffic roughly in half in the uncontended case. They
// are plain shared atomics here (unlike an SPSC design) because any producer
// or consumer may refresh them; a stale mirror is always conservative.
//
// =============================================================================

/// Lock-free MPMC ring buffer of owning pointers.
///
/// Fixed power-of-two capacity. Items enter and leave as `Box<T>`; only the
/// pointer moves between producer and consumer, never the pointee.
pub struct Ring<T> {
    // === PRODUCER HOT ===
    write_pos: CachePadded<AtomicU64>,
    /// Producers' cached view of `read_pos`.
    cached_read: CachePadded<AtomicU64>,

    // === CONSUMER HOT ===
    read_pos: CachePadded<AtomicU64>,
    /// Consumers' cached view of `write_pos`.
    cached_write: CachePadded<AtomicU64>,

    /// Atomic owning-pointer slots; null means empty.
    slots: Box<[AtomicPtr<T>]>,
    mask: u64,
    metrics: Option<RingMetrics>,
}

// Safety: the protocol hands each Box<T> from exactly one thread to exactly
// one other thread through a Release store / Acquire swap pair.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Creates a ring with the given capacity.
    ///
    /// The capacity must be a power of two greater than zero.
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        Self::build(capacity, None)
    }

    /// Creates a ring with per-ring counters enabled.
    pub fn with_metrics(capacity: usize) -> Result<Self, RingError> {
        Self::build(capacity, Some(RingMetrics::new()))
    }

    fn build(capacity: usize, metrics: Option<RingMetrics>) -> Result<Self, RingError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingError::InvalidCapacity(capacity));
        }

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || AtomicPtr::new(ptr::null_mut()));

        Ok(Self {
            write_pos: CachePadded::new(AtomicU64::new(0)),
            cached_read: CachePadded::new(AtomicU64::new(0)),
            read_pos: CachePadded::new(AtomicU64::new(0)),
            cached_write: CachePadded::new(AtomicU64::new(0)),
            slots: slots.into_boxed_slice(),
            mask: (capacity - 1) as u64,
            metrics,
        })
    }

    /// Returns the ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        (self.mask + 1) as usize
    }

    /// Returns the current number of items.
    ///
    /// Under concurrent traffic this is a point-in-time estimate.
    #[inline]
    pub fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Relaxed);
        write.saturating_sub(read) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Fill ratio in `[0.0, 1.0]`.
    #[inline]
    pub fn usage(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    #[inline]
    fn free(&self) -> usize {
        self.capacity().saturating_sub(self.len())
    }

    /// Per-ring counters, if enabled at construction.
    pub fn metrics(&self) -> RingMetricsSnapshot {
        self.metrics
            .as_ref()
            .map_or_else(RingMetricsSnapshot::default, RingMetrics::snapshot)
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Attempts to enqueue one item.
    ///
    /// Returns the item back on a full ring; never blocks on capacity.
    pub fn try_put(&self, item: Box<T>) -> Result<(), Box<T>> {
        let ptr = Box::into_raw(item);
        let mut backoff = Backoff::new();

        loop {
            let write = self.write_pos.load(Ordering::Relaxed);
            let mut read = self.cached_read.load(Ordering::Relaxed);

            if write.wrapping_sub(read) >= self.capacity() as u64 {
                // Cached view says full; refresh from the authoritative counter.
                read = self.read_pos.load(Ordering::Acquire);
                self.cached_read.store(read, Ordering::Relaxed);
                if write.wrapping_sub(read) >= self.capacity() as u64 {
                    if let Some(m) = &self.metrics {
                        m.record_full_reject();
                    }
                    // SAFETY: ptr came from Box::into_raw above and was never
                    // published to a slot.
                    return Err(unsafe { Box::from_raw(ptr) });
                }
            }

            match self.write_pos.compare_exchange_weak(
                write,
                write + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    debug_assert_monotonic!("write_pos", write, write + 1);
                    self.publish(write, ptr);
                    if let Some(m) = &self.metrics {
                        m.add_puts(1);
                    }
                    return Ok(());
                }
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Enqueues as many items as currently fit, claiming the whole range with
    /// one CAS on `write_pos`.
    ///
    /// Drains the inserted prefix from `items` and returns its length; the
    /// rejected remainder stays in the vec.
    pub fn put_batch(&self, items: &mut Vec<Box<T>>) -> usize {
        if items.is_empty() {
            return 0;
        }
        let mut backoff = Backoff::new();

        loop {
            let write = self.write_pos.load(Ordering::Relaxed);
            let mut read = self.cached_read.load(Ordering::Relaxed);
            let mut space = (self.capacity() as u64).saturating_sub(write.wrapping_sub(read));

            if (space as usize) < items.len() {
                read = self.read_pos.load(Ordering::Acquire);
                self.cached_read.store(read, Ordering::Relaxed);
                space = (self.capacity() as u64).saturating_sub(write.wrapping_sub(read));
            }

            let n = (space as usize).min(items.len());
            if n == 0 {
                if let Some(m) = &self.metrics {
                    m.record_full_reject();
                }
                return 0;
            }

            debug_assert_bounded_count!(
                (write + n as u64).wrapping_sub(read) as usize,
                self.capacity()
            );

            match self.write_pos.compare_exchange(
                write,
                write + n as u64,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    for (i, item) in items.drain(..n).enumerate() {
                        self.publish(write + i as u64, Box::into_raw(item));
                    }
                    if let Some(m) = &self.metrics {
                        m.add_puts(n as u64);
                        m.record_batch_put();
                    }
                    return n;
                }
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Stores a pointer into its claimed slot, waiting out a lagging consumer
    /// from the previous lap.
    #[inline]
    fn publish(&self, pos: u64, ptr: *mut T) {
        let slot = &self.slots[(pos & self.mask) as usize];
        let mut spin = Backoff::new();
        while !slot.load(Ordering::Acquire).is_null() {
            spin.snooze();
        }
        slot.store(ptr, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Attempts to dequeue one item. Returns `None` on an empty ring.
    pub fn try_get(&self) -> Option<Box<T>> {
        let mut backoff = Backoff::new();

        loop {
            let read = self.read_pos.load(Ordering::Relaxed);
            let mut write = self.cached_write.load(Ordering::Relaxed);

            if write.wrapping_sub(read) == 0 {
                write = self.write_pos.load(Ordering::Acquire);
                self.cached_write.store(write, Ordering::Relaxed);
                if write.wrapping_sub(read) == 0 {
                    return None;
                }
            }

            debug_assert_read_not_past_write!(read + 1, write);

            match self.read_pos.compare_exchange_weak(
                read,
                read + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let item = self.take(read);
                    if let Some(m) = &self.metrics {
                        m.add_gets(1);
                    }
                    return Some(item);
                }
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Dequeues up to `max` items into `out`, in producer claim order.
    ///
    /// Only the contiguous ready prefix is claimed: a producer that has
    /// claimed a position but not yet published it bounds the batch rather
    /// than blocking it. Returns the number of items appended.
    pub fn get_batch(&self, out: &mut Vec<Box<T>>, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        let mut backoff = Backoff::new();

        loop {
            let read = self.read_pos.load(Ordering::Relaxed);
            let mut write = self.cached_write.load(Ordering::Relaxed);

            if write.wrapping_sub(read) == 0 {
                write = self.write_pos.load(Ordering::Acquire);
                self.cached_write.store(write, Ordering::Relaxed);
            }

            let avail = write.wrapping_sub(read) as usize;
            if avail == 0 {
                return 0;
            }

            let want = avail.min(max);

            // Scan the contiguous ready prefix; a claimed-but-unpublished
            // slot ends the batch early.
            let mut ready = 0usize;
            while ready < want {
                let idx = ((read + ready as u64) & self.mask) as usize;
                if self.slots[idx].load(Ordering::Acquire).is_null() {
                    break;
                }
                ready += 1;
            }

            if ready == 0 {
                // Availability is non-zero but the head producer is mid-publish.
                backoff.snooze();
                continue;
            }

            match self.read_pos.compare_exchange(
                read,
                read + ready as u64,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    for i in 0..ready {
                        out.push(self.take(read + i as u64));
                    }
                    if let Some(m) = &self.metrics {
                        m.add_gets(ready as u64);
                        m.record_batch_get();
                    }
                    return ready;
                }
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Swaps a claimed slot to null, spinning out an in-flight publish.
    #[inline]
    fn take(&self, pos: u64) -> Box<T> {
        let slot = &self.slots[(pos & self.mask) as usize];
        let mut spin = Backoff::new();
        loop {
            let p = slot.swap(ptr::null_mut(), Ordering::Acquire);
            if !p.is_null() {
                // SAFETY: the pointer was produced by Box::into_raw in
                // publish(), and the successful read_pos CAS made this
                // consumer the sole owner of the position.
                return unsafe { Box::from_raw(p) };
            }
            spin.snooze();
        }
    }

    // ---------------------------------------------------------------------
    // CAPACITY MANAGEMENT
    // ---------------------------------------------------------------------

    /// Pops oldest items through `on_drop` until at least `n` slots are free
    /// (clamped to capacity) or the ring is empty. Returns the dropped count.
    pub fn ensure_capacity_or_drop_oldest<F>(&self, n: usize, mut on_drop: F) -> usize
    where
        F: FnMut(Box<T>),
    {
        let n = n.min(self.capacity());
        let mut dropped = 0usize;

        while self.free() < n {
            match self.try_get() {
                Some(item) => {
                    on_drop(item);
                    dropped += 1;
                }
                None => break,
            }
        }

        if dropped > 0 {
            if let Some(m) = &self.metrics {
                m.add_dropped_oldest(dropped as u64);
            }
        }
        dropped
    }

    /// Repeatedly dequeues into `sink` until the ring is empty.
    pub fn drain_to<F>(&self, mut sink: F) -> usize
    where
        F: FnMut(Box<T>),
    {
        let mut count = 0usize;
        while let Some(item) = self.try_get() {
            sink(item);
            count += 1;
        }
        count
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // Free everything still sitting in a slot, regardless of counters.
        for slot in self.slots.iter() {
            let p = slot.swap(ptr::null_mut(), Ordering::Relaxed);
            if !p.is_null() {
                // SAFETY: non-null slot pointers always originate from
                // Box::into_raw and are owned by the ring until taken.
                drop(unsafe { Box::from_raw(p) });
            }
        }
    }
}

impl<T> std::fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
