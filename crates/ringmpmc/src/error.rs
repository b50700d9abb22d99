use thiserror::Error;

/// Errors produced when constructing a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// Capacity must be a power of two greater than zero.
    #[error("invalid capacity {0}: must be a power of two >= 1")]
    InvalidCapacity(usize),
}
