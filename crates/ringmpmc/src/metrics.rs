use std::sync::atomic::{AtomicU64, Ordering};

/// Lightweight per-ring counters for observability.
///
/// All counters are `Relaxed` atomics; a snapshot reads each field once and
/// makes no cross-field consistency claim.
#[derive(Debug, Default)]
pub struct RingMetrics {
    puts: AtomicU64,
    gets: AtomicU64,
    batch_puts: AtomicU64,
    batch_gets: AtomicU64,
    full_rejects: AtomicU64,
    dropped_oldest: AtomicU64,
}

impl RingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_puts(&self, n: u64) {
        self.puts.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_gets(&self, n: u64) {
        self.gets.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_batch_put(&self) {
        self.batch_puts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_batch_get(&self) {
        self.batch_gets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_full_reject(&self) {
        self.full_rejects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_dropped_oldest(&self, n: u64) {
        self.dropped_oldest.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RingMetricsSnapshot {
        RingMetricsSnapshot {
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            batch_puts: self.batch_puts.load(Ordering::Relaxed),
            batch_gets: self.batch_gets.load(Ordering::Relaxed),
            full_rejects: self.full_rejects.load(Ordering::Relaxed),
            dropped_oldest: self.dropped_oldest.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`RingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingMetricsSnapshot {
    pub puts: u64,
    pub gets: u64,
    pub batch_puts: u64,
    pub batch_gets: u64,
    pub full_rejects: u64,
    pub dropped_oldest: u64,
}

impl std::fmt::Display for RingMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "puts={} gets={} batch_puts={} batch_gets={} full={} dropped={}",
            self.puts,
            self.gets,
            self.batch_puts,
            self.batch_gets,
            self.full_rejects,
            self.dropped_oldest
        )
    }
}
