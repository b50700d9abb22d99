//! Atomic metrics facade for the bridge.
//!
//! Counters and gauges are `Relaxed` atomics. A snapshot reads each field
//! once; it is consistent per-field, not across fields.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A gauge with a clamp ceiling.
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
    max: u64,
}

impl Gauge {
    pub fn new(max: u64) -> Self {
        Self {
            value: AtomicU64::new(0),
            max,
        }
    }

    /// Stores `value`, clamped to the gauge maximum.
    #[inline]
    pub fn set(&self, value: u64) {
        self.value.store(value.min(self.max), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters and gauges for the whole pipeline.
#[derive(Debug)]
pub struct BridgeMetrics {
    started_at: Instant,

    messages_received: AtomicU64,
    messages_published: AtomicU64,
    messages_acked: AtomicU64,
    messages_dropped: AtomicU64,
    backpressure_dropped: AtomicU64,
    broker_errors: AtomicU64,
    transport_errors: AtomicU64,
    processing_time_ns: AtomicU64,

    /// Buffer fill percentage, 0..=100.
    pub buffer_utilization: Gauge,
    pub active_workers: Gauge,
    pub queue_depth: Gauge,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            messages_received: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            messages_acked: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            backpressure_dropped: AtomicU64::new(0),
            broker_errors: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            processing_time_ns: AtomicU64::new(0),
            buffer_utilization: Gauge::new(100),
            active_workers: Gauge::new(1_000_000),
            queue_depth: Gauge::new(u64::MAX),
        }
    }

    #[inline]
    pub fn add_received(&self, n: u64) {
        self.messages_received.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_acked(&self) {
        self.messages_acked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dropped(&self, n: u64) {
        self.messages_dropped.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_backpressure_dropped(&self) {
        self.backpressure_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_broker_errors(&self) {
        self.broker_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_transport_errors(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_processing_ns(&self, ns: u64) {
        self.processing_time_ns.fetch_add(ns, Ordering::Relaxed);
    }

    /// Point-in-time snapshot with derived rates and averages.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.started_at.elapsed().as_secs_f64().max(f64::EPSILON);
        let received = self.messages_received.load(Ordering::Relaxed);
        let published = self.messages_published.load(Ordering::Relaxed);
        let processing_time_ns = self.processing_time_ns.load(Ordering::Relaxed);

        MetricsSnapshot {
            messages_received: received,
            messages_published: published,
            messages_acked: self.messages_acked.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            backpressure_dropped: self.backpressure_dropped.load(Ordering::Relaxed),
            broker_errors: self.broker_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            processing_time_ns,
            buffer_utilization: self.buffer_utilization.get(),
            active_workers: self.active_workers.get(),
            queue_depth: self.queue_depth.get(),
            receive_rate: received as f64 / elapsed,
            publish_rate: published as f64 / elapsed,
            avg_processing_ns: processing_time_ns / published.max(1),
        }
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`BridgeMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_published: u64,
    pub messages_acked: u64,
    pub messages_dropped: u64,
    pub backpressure_dropped: u64,
    pub broker_errors: u64,
    pub transport_errors: u64,
    pub processing_time_ns: u64,
    pub buffer_utilization: u64,
    pub active_workers: u64,
    pub queue_depth: u64,
    pub receive_rate: f64,
    pub publish_rate: f64,
    pub avg_processing_ns: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rx={} pub={} ack={} drop={} bp_drop={} util={}% workers={} qdepth={}",
            self.messages_received,
            self.messages_published,
            self.messages_acked,
            self.messages_dropped,
            self.backpressure_dropped,
            self.buffer_utilization,
            self.active_workers,
            self.queue_depth
        )
    }
}
