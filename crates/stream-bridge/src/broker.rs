//! Stream broker capability.
//!
//! Object-safe async trait using boxed futures so implementations can be
//! passed around as `Arc<dyn StreamBroker>`. Cancellation is carried by the
//! future itself: dropping the future abandons the call.

use crate::error::BrokerError;
use crate::message::Message;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// A consumer registered in the group, as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub name: String,
    /// Messages delivered to this consumer but not yet acknowledged.
    pub pending: u64,
    /// Time since this consumer last interacted with the broker.
    pub idle: Duration,
}

/// Consumer-group summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub last_delivered_id: String,
    pub consumers: u64,
    pub pending: u64,
}

/// Capability over a persistent stream-based broker with consumer-group
/// semantics and per-message identifiers.
pub trait StreamBroker: Send + Sync {
    /// Creates the consumer group if it does not exist. Idempotent.
    fn create_consumer_group<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
        start_id: &'a str,
    ) -> BrokerFuture<'a, ()>;

    /// Blocking read of up to `batch_size` new messages, waiting at most
    /// `block_time`.
    fn read_messages<'a>(
        &'a self,
        group: &'a str,
        consumer: &'a str,
        stream: &'a str,
        batch_size: usize,
        block_time: Duration,
    ) -> BrokerFuture<'a, Vec<Message>>;

    fn ack_messages<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
        ids: &'a [String],
    ) -> BrokerFuture<'a, ()>;

    fn delete_messages<'a>(&'a self, stream: &'a str, ids: &'a [String]) -> BrokerFuture<'a, ()>;

    /// Reassigns pending messages idle for at least `min_idle` to this
    /// consumer.
    fn claim_pending_messages<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
        consumer: &'a str,
        min_idle: Duration,
        batch: usize,
    ) -> BrokerFuture<'a, Vec<Message>>;

    fn get_consumers<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
    ) -> BrokerFuture<'a, Vec<ConsumerInfo>>;

    fn remove_consumer<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
        name: &'a str,
    ) -> BrokerFuture<'a, ()>;

    /// Reads raw stream messages starting after `start_id`, outside of group
    /// delivery.
    fn read_stream_messages<'a>(
        &'a self,
        stream: &'a str,
        start_id: &'a str,
        batch: usize,
    ) -> BrokerFuture<'a, Vec<Message>>;

    fn get_consumer_group_info<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
    ) -> BrokerFuture<'a, GroupInfo>;

    /// This client's consumer name within the group.
    fn consumer_name(&self) -> String;

    fn ping(&self) -> BrokerFuture<'_, ()>;

    fn close(&self) -> BrokerFuture<'_, ()>;
}
