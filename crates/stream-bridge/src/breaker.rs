//! Circuit breaker capability wrapping publish calls.
//!
//! When the transport fails repeatedly the circuit "opens" and publishes
//! fail fast without touching the transport. After a cooldown the circuit
//! enters "half-open" and lets a probe through.
//!
//! # State Transitions
//!
//! ```text
//! ┌────────┐  failure_threshold  ┌────────┐
//! │ Closed │ ──────────────────► │  Open  │
//! └────────┘                     └────────┘
//!     ▲                              │
//!     │ success_threshold            │ reset_timeout
//!     │                              ▼
//!     │                         ┌──────────┐
//!     └──────────────────────── │ HalfOpen │ ──failure──► Open
//!           success             └──────────┘
//! ```

use crate::error::PublishError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A publish operation handed to the breaker.
pub type BreakerOp = Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send>>;

pub type BreakerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; requests flow through.
    Closed,
    /// Transport unhealthy; requests fail fast.
    Open,
    /// Probing whether the transport recovered.
    HalfOpen,
}

/// Point-in-time breaker statistics.
#[derive(Debug, Clone, Copy)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub times_opened: u32,
}

/// Capability wrapping a single publish call; must be safe for concurrent
/// `execute`.
pub trait CircuitBreaker: Send + Sync {
    fn execute(&self, op: BreakerOp) -> BreakerFuture<'_>;

    fn state(&self) -> BreakerState;

    fn stats(&self) -> BreakerStats;
}

/// Configuration for [`ThresholdBreaker`].
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to wait before transitioning from Open to HalfOpen.
    pub reset_timeout: Duration,
    /// Successes in HalfOpen required to close the circuit.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
}

/// Default consecutive-failure circuit breaker.
pub struct ThresholdBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    times_opened: AtomicU32,
}

impl ThresholdBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_time: None,
            }),
            times_opened: AtomicU32::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BreakerConfig::default())
    }

    /// Returns how many times the circuit has opened.
    pub fn times_opened(&self) -> u32 {
        self.times_opened.load(Ordering::Relaxed)
    }

    /// Checks whether a request may proceed, transitioning Open → HalfOpen
    /// when the reset timeout has elapsed.
    fn should_allow_request(&self) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if let Some(last_failure) = inner.last_failure_time {
                    if last_failure.elapsed() >= self.config.reset_timeout {
                        inner.state = BreakerState::HalfOpen;
                        inner.consecutive_successes = 0;
                        return true;
                    }
                }
                false
            }
        }
    }

    fn record_success(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                }
            }
            BreakerState::Open => {
                // A success can only come from a request admitted while the
                // state was not Open; treat it as recovery.
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        inner.last_failure_time = Some(Instant::now());
        inner.consecutive_successes = 0;

        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    self.times_opened.fetch_add(1, Ordering::Relaxed);
                }
            }
            BreakerState::HalfOpen => {
                // Single failure in half-open reopens the circuit.
                inner.state = BreakerState::Open;
                self.times_opened.fetch_add(1, Ordering::Relaxed);
            }
            BreakerState::Open => {}
        }
    }
}

impl CircuitBreaker for ThresholdBreaker {
    fn execute(&self, op: BreakerOp) -> BreakerFuture<'_> {
        Box::pin(async move {
            if !self.should_allow_request() {
                return Err(PublishError::CircuitOpen);
            }

            match op.await {
                Ok(()) => {
                    self.record_success();
                    Ok(())
                }
                Err(e) => {
                    self.record_failure();
                    Err(e)
                }
            }
        })
    }

    fn state(&self) -> BreakerState {
        match self.inner.lock() {
            Ok(guard) => guard.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    fn stats(&self) -> BreakerStats {
        let (state, consecutive_failures) = match self.inner.lock() {
            Ok(guard) => (guard.state, guard.consecutive_failures),
            Err(poisoned) => {
                let guard = poisoned.into_inner();
                (guard.state, guard.consecutive_failures)
            }
        };
        BreakerStats {
            state,
            consecutive_failures,
            times_opened: self.times_opened(),
        }
    }
}
