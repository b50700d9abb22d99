//! Owned message records and reusable byte buffers.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Instant;

/// A message pulled from the broker, owned by exactly one holder at a time.
///
/// The payload travels from ingress to egress by ownership transfer; the
/// bytes themselves are copied only when the publish payload is built.
#[derive(Debug)]
pub struct Message {
    /// Opaque identifier assigned by the broker.
    pub id: String,
    /// When this record entered the bridge.
    pub received_at: Instant,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Publish attempts so far.
    pub attempts: u32,
}

impl Message {
    pub fn new(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            received_at: Instant::now(),
            payload,
            attempts: 0,
        }
    }

    /// Clears the record for reuse, preserving the payload buffer's capacity.
    pub fn reset(&mut self) {
        self.id.clear();
        self.payload.clear();
        self.attempts = 0;
        self.received_at = Instant::now();
    }
}

/// Out-of-band acknowledgment received on the subscription topic.
///
/// Wire form: `{"id":"<identifier>","ack":true|false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub id: String,
    pub ack: bool,
}

/// A shared pool of reusable byte buffers for building publish payloads.
///
/// Buffers are cleared before going back into the pool; callers copy the
/// finished payload out before release so a pooled buffer never escapes.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
    initial_capacity: usize,
}

impl BufferPool {
    pub fn new(max_pooled: usize, initial_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_pooled)),
            max_pooled,
            initial_capacity,
        }
    }

    /// Takes a buffer from the pool, or allocates a fresh one.
    pub fn acquire(&self) -> Vec<u8> {
        if let Ok(mut guard) = self.buffers.lock() {
            if let Some(buf) = guard.pop() {
                return buf;
            }
        }
        Vec::with_capacity(self.initial_capacity)
    }

    /// Returns a buffer to the pool, cleared but with capacity intact.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if let Ok(mut guard) = self.buffers.lock() {
            if guard.len() < self.max_pooled {
                guard.push(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_preserves_capacity() {
        let mut msg = Message::new("1-1", Vec::with_capacity(256));
        msg.payload.extend_from_slice(b"hello");
        msg.attempts = 2;

        let cap = msg.payload.capacity();
        msg.reset();

        assert!(msg.id.is_empty());
        assert!(msg.payload.is_empty());
        assert_eq!(msg.attempts, 0);
        assert_eq!(msg.payload.capacity(), cap);
    }

    #[test]
    fn test_buffer_pool_reuses() {
        let pool = BufferPool::new(2, 64);

        let mut a = pool.acquire();
        a.extend_from_slice(b"payload");
        let cap = a.capacity();
        pool.release(a);

        let b = pool.acquire();
        assert!(b.is_empty());
        assert_eq!(b.capacity(), cap);
    }

    #[test]
    fn test_buffer_pool_bounded() {
        let pool = BufferPool::new(1, 16);
        pool.release(Vec::with_capacity(16));
        pool.release(Vec::with_capacity(16));

        // Only one buffer is retained.
        let _first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(second.capacity(), 16); // freshly allocated
    }
}
