//! Stream-to-PubSub Bridge
//!
//! A high-throughput bridge between a persistent stream-based broker
//! (consumer-group ingress) and a lossy publish/subscribe transport
//! (topic-based egress with out-of-band acknowledgments). Built on the
//! lock-free MPMC ring from `ringmpmc`: payload ownership moves from
//! ingress to egress with no copy.
//!
//! # Architecture
//!
//! ```text
//! broker ─▶ consume loop ─▶ ring buffer ─▶ process loop ─▶ worker queue
//!                                                              │
//! broker ◀─ ack handler ◀─ subscription      transport ◀─ worker publish
//! ```
//!
//! External collaborators (broker, transport, circuit breaker) are consumed
//! through capability traits and passed by handle; see [`StreamBroker`],
//! [`PubSubTransport`], and [`CircuitBreaker`].

pub mod breaker;
pub mod broker;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod payload;
pub mod processor;
pub mod queue;
pub mod shutdown;
pub mod transport;
pub mod worker_pool;

// Re-export main types
pub use breaker::{
    BreakerConfig, BreakerFuture, BreakerOp, BreakerState, BreakerStats, CircuitBreaker,
    ThresholdBreaker,
};
pub use broker::{BrokerFuture, ConsumerInfo, GroupInfo, StreamBroker};
pub use config::{
    AppConfig, BridgeConfig, BrokerConfig, DlqConfig, DropPolicy, PipelineConfig, ResourceConfig,
    RetryConfig, TransportConfig,
};
pub use error::{BridgeError, BrokerError, PublishError, SubmitError};
pub use message::{Ack, BufferPool, Message};
pub use metrics::{BridgeMetrics, Gauge, MetricsSnapshot};
pub use payload::{build_dlq_envelope, build_publish_payload, parse_ack, DlqEnvelope};
pub use processor::{ProcessorState, StreamProcessor};
pub use queue::MessageQueue;
pub use shutdown::CancelToken;
pub use transport::{PubSubTransport, SubscribeHandler, TransportFuture};
pub use worker_pool::{MessageHandler, Task, WorkerPool};
