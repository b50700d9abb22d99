//! Lossy pub/sub transport capability.

use crate::error::PublishError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, PublishError>> + Send + 'a>>;

/// Callback invoked for each message arriving on a subscribed topic.
///
/// The handler is synchronous; implementations that need async work spawn it.
pub type SubscribeHandler = Arc<dyn Fn(String, Vec<u8>) + Send + Sync>;

/// Capability over a best-effort topic-based transport with QoS levels.
pub trait PubSubTransport: Send + Sync {
    fn connect(&self) -> TransportFuture<'_, ()>;

    fn disconnect(&self, grace: Duration) -> TransportFuture<'_, ()>;

    fn is_connected(&self) -> bool;

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        qos: u8,
        retained: bool,
        payload: Vec<u8>,
    ) -> TransportFuture<'a, ()>;

    fn subscribe<'a>(
        &'a self,
        topic: &'a str,
        qos: u8,
        handler: SubscribeHandler,
    ) -> TransportFuture<'a, ()>;

    fn unsubscribe<'a>(&'a self, topics: &'a [String]) -> TransportFuture<'a, ()>;

    /// Per-user topic prefix, if the transport namespaces clients.
    fn user_prefix(&self) -> String;
}
