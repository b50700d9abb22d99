//! Worker fast-path queue: a thin specialization of the MPMC ring over
//! message records.

use crate::message::Message;
use ringmpmc::Ring;

/// Lock-free queue of owned message records feeding the worker pool.
#[derive(Debug)]
pub struct MessageQueue {
    ring: Ring<Message>,
}

impl MessageQueue {
    /// Creates a queue; the requested capacity is rounded up to the next
    /// power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(1);
        // Capacity is a power of two by construction.
        let ring = Ring::new(capacity).expect("rounded capacity is a power of two");
        Self { ring }
    }

    #[inline]
    pub fn push(&self, msg: Box<Message>) -> Result<(), Box<Message>> {
        self.ring.try_put(msg)
    }

    /// Enqueues a prefix of `msgs` as far as space allows; returns the count.
    #[inline]
    pub fn push_batch(&self, msgs: &mut Vec<Box<Message>>) -> usize {
        self.ring.put_batch(msgs)
    }

    #[inline]
    pub fn pop(&self) -> Option<Box<Message>> {
        self.ring.try_get()
    }

    /// Dequeues up to `max` messages into `out`; returns the count.
    #[inline]
    pub fn pop_batch(&self, out: &mut Vec<Box<Message>>, max: usize) -> usize {
        self.ring.get_batch(out, max)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}
