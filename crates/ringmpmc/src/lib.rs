//! RingMPMC - Lock-Free Multi-Producer Multi-Consumer Ring Buffer
//!
//! A fixed-capacity ring of atomic owning-pointer slots coordinated by two
//! monotonic u64 position counters. Items move through the ring as `Box<T>`:
//! ownership transfers, payload bytes are never copied.
//!
//! # Key Features
//!
//! - Cache-line padded position counters with cached cross-role mirrors
//! - Batch put/get: one CAS claims a whole range, per-slot stores stay individual
//! - Drop-oldest capacity management for backpressure policies
//! - Adaptive backoff (spin → yield) on CAS contention
//!
//! # Example
//!
//! ```
//! use ringmpmc::Ring;
//!
//! let ring = Ring::<u64>::new(8).unwrap();
//!
//! ring.try_put(Box::new(42)).unwrap();
//!
//! let mut batch: Vec<Box<u64>> = (0..4u64).map(Box::new).collect();
//! ring.put_batch(&mut batch);
//!
//! let mut out = Vec::new();
//! ring.get_batch(&mut out, 64);
//! assert_eq!(*out[0], 42);
//! ```

mod backoff;
mod error;
mod invariants;
mod metrics;
mod ring;

pub use backoff::Backoff;
pub use error::RingError;
pub use metrics::{RingMetrics, RingMetricsSnapshot};
pub use ring::Ring;
