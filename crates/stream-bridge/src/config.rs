//! Configuration for the bridge pipeline, broker, transport, and resources.
//!
//! Structs are serde-deserializable so an outer loader can feed them;
//! loading itself lives outside this crate. Durations deserialize from
//! integer milliseconds.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

fn de_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// What to do when the in-memory buffer is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// Proactively evict the oldest buffered messages to admit new ones.
    Oldest,
    /// Reject new inserts; the buffer keeps what it has.
    Newest,
    /// Best effort; rely on natural upstream backpressure.
    None,
}

/// Retry behavior for failed publishes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    #[serde(deserialize_with = "de_millis")]
    pub initial_backoff: Duration,
    #[serde(deserialize_with = "de_millis")]
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for a message that has already failed
    /// `prior_attempts` times, capped at `max_backoff`.
    pub fn backoff_for(&self, prior_attempts: u32) -> Duration {
        let ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(prior_attempts as i32);
        Duration::from_millis(ms as u64).min(self.max_backoff)
    }
}

/// Dead-letter topic routing for messages that exhausted retries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DlqConfig {
    pub enabled: bool,
    pub topic: String,
}

/// Core pipeline tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Requested ring buffer size; rounded up to the next power of two.
    pub buffer_size: usize,
    /// Target batch size for the process loop.
    pub batch_size: usize,
    #[serde(deserialize_with = "de_millis")]
    pub flush_interval: Duration,
    /// Buffer usage ratio in `(0, 1)` above which backpressure engages.
    pub backpressure_threshold: f64,
    pub drop_policy: DropPolicy,
    #[serde(deserialize_with = "de_millis")]
    pub backpressure_poll_interval: Duration,
    #[serde(deserialize_with = "de_millis")]
    pub idle_poll_sleep: Duration,
    /// Capacity of the worker fast-path queue.
    pub worker_queue_size: usize,
    pub retry: RetryConfig,
    pub dlq: DlqConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            batch_size: 100,
            flush_interval: Duration::from_millis(200),
            backpressure_threshold: 0.8,
            drop_policy: DropPolicy::Oldest,
            backpressure_poll_interval: Duration::from_secs(1),
            idle_poll_sleep: Duration::from_millis(10),
            worker_queue_size: 1024,
            retry: RetryConfig::default(),
            dlq: DlqConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Effective ring capacity: `buffer_size` rounded up to a power of two.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_size.next_power_of_two().max(1)
    }
}

/// Stream broker consumption and maintenance settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub stream_name: String,
    pub consumer_group: String,
    pub batch_size: usize,
    #[serde(deserialize_with = "de_millis")]
    pub block_time: Duration,
    #[serde(deserialize_with = "de_millis")]
    pub retry_interval: Duration,
    pub aggressive_claim: bool,
    #[serde(deserialize_with = "de_millis")]
    pub claim_interval: Duration,
    #[serde(deserialize_with = "de_millis")]
    pub claim_min_idle_time: Duration,
    pub claim_batch_size: usize,
    #[serde(deserialize_with = "de_millis")]
    pub claim_cycle_delay: Duration,
    pub drain_enabled: bool,
    #[serde(deserialize_with = "de_millis")]
    pub drain_interval: Duration,
    pub drain_batch_size: usize,
    pub consumer_cleanup_enabled: bool,
    #[serde(deserialize_with = "de_millis")]
    pub consumer_idle_timeout: Duration,
    #[serde(deserialize_with = "de_millis")]
    pub consumer_cleanup_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            stream_name: "events".to_string(),
            consumer_group: "bridge".to_string(),
            batch_size: 100,
            block_time: Duration::from_secs(5),
            retry_interval: Duration::from_secs(1),
            aggressive_claim: false,
            claim_interval: Duration::from_secs(30),
            claim_min_idle_time: Duration::from_secs(60),
            claim_batch_size: 100,
            claim_cycle_delay: Duration::ZERO,
            drain_enabled: false,
            drain_interval: Duration::from_secs(60),
            drain_batch_size: 100,
            consumer_cleanup_enabled: false,
            consumer_idle_timeout: Duration::from_secs(300),
            consumer_cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Pub/sub transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub qos: u8,
    pub retained: bool,
    pub publish_topic: String,
    pub subscribe_topic: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            qos: 1,
            retained: false,
            publish_topic: "bridge/out".to_string(),
            subscribe_topic: "bridge/ack".to_string(),
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub min_workers: usize,
    pub max_workers: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 8,
        }
    }
}

/// Application-level settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(deserialize_with = "de_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub pipeline: PipelineConfig,
    pub broker: BrokerConfig,
    pub transport: TransportConfig,
    pub resource: ResourceConfig,
    pub app: AppConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_capacity_rounds_up() {
        let mut cfg = PipelineConfig::default();
        cfg.buffer_size = 1000;
        assert_eq!(cfg.buffer_capacity(), 1024);

        cfg.buffer_size = 1024;
        assert_eq!(cfg.buffer_capacity(), 1024);

        cfg.buffer_size = 0;
        assert_eq!(cfg.buffer_capacity(), 1);
    }

    #[test]
    fn test_backoff_exponential_and_capped() {
        let retry = RetryConfig {
            enabled: true,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1500),
            multiplier: 2.0,
        };

        assert_eq!(retry.backoff_for(0), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(1), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(400));
        // Capped at max_backoff.
        assert_eq!(retry.backoff_for(10), Duration::from_millis(1500));
    }

    #[test]
    fn test_deserialize_with_millis_and_policy() {
        let json = r#"{
            "pipeline": {
                "buffer_size": 100,
                "flush_interval": 50,
                "drop_policy": "newest"
            },
            "broker": { "block_time": 2000 }
        }"#;

        let cfg: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.pipeline.buffer_capacity(), 128);
        assert_eq!(cfg.pipeline.flush_interval, Duration::from_millis(50));
        assert_eq!(cfg.pipeline.drop_policy, DropPolicy::Newest);
        assert_eq!(cfg.broker.block_time, Duration::from_secs(2));
        // Untouched sections keep their defaults.
        assert_eq!(cfg.resource.min_workers, 2);
    }
}
