//! Stream processor: the state machine orchestrating consume, process,
//! claim, drain, consumer-cleanup, and backpressure loops, plus the
//! retry/DLQ/acknowledgment protocol.
//!
//! Data flow: broker → consume loop → ring buffer → process loop → worker
//! queue → worker handler → transport publish. Acknowledgments arrive
//! out-of-band on a subscription topic and are correlated back to broker
//! acknowledge-and-delete by identifier.

use crate::breaker::{BreakerOp, CircuitBreaker};
use crate::broker::StreamBroker;
use crate::config::{BridgeConfig, DropPolicy, PipelineConfig, TransportConfig};
use crate::error::{BridgeError, PublishError};
use crate::message::{BufferPool, Message};
use crate::metrics::BridgeMetrics;
use crate::payload;
use crate::shutdown::CancelToken;
use crate::transport::{PubSubTransport, SubscribeHandler};
use crate::worker_pool::{MessageHandler, WorkerPool};
use ringmpmc::Ring;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Number of pooled scratch buffers for payload building.
const PAYLOAD_POOL_SIZE: usize = 16;
/// Initial capacity of each pooled scratch buffer.
const PAYLOAD_BUFFER_CAPACITY: usize = 4096;
/// Start reading the stream from the beginning when creating the group.
const GROUP_START_ID: &str = "0";

/// Processor lifecycle states. Transitions are CAS-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessorState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Stopping = 3,
    Stopped = 4,
}

impl ProcessorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct AtomicState(AtomicU8);

impl AtomicState {
    fn new(state: ProcessorState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ProcessorState {
        ProcessorState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: ProcessorState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// CAS transition; on failure the state is unchanged and the actual
    /// state is reported.
    fn transition(&self, from: ProcessorState, to: ProcessorState) -> Result<(), BridgeError> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| BridgeError::InvalidTransition {
                from: ProcessorState::from_u8(actual),
                to,
            })
    }
}

/// Per-message worker handler: builds the publish payload, runs it through
/// the circuit breaker, and routes failures to retry/DLQ/drop.
struct MessagePublisher {
    transport: Arc<dyn PubSubTransport>,
    breaker: Arc<dyn CircuitBreaker>,
    buffer: Arc<Ring<Message>>,
    metrics: Arc<BridgeMetrics>,
    buffers: BufferPool,
    pipeline: PipelineConfig,
    transport_cfg: TransportConfig,
    cancel: CancelToken,
    processed: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
    observer: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl MessagePublisher {
    async fn process_message(&self, msg: Box<Message>) {
        let start = Instant::now();

        let mut scratch = self.buffers.acquire();
        let wire = payload::build_publish_payload(&msg, &mut scratch);
        self.buffers.release(scratch);

        let transport = Arc::clone(&self.transport);
        let topic = self.transport_cfg.publish_topic.clone();
        let qos = self.transport_cfg.qos;
        let retained = self.transport_cfg.retained;
        let op: BreakerOp =
            Box::pin(async move { transport.publish(&topic, qos, retained, wire).await });

        match self.breaker.execute(op).await {
            Ok(()) => {
                self.metrics.inc_published();
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.notify_observer(&msg.id);
                self.metrics
                    .add_processing_ns(start.elapsed().as_nanos() as u64);
            }
            Err(e) => {
                self.metrics.inc_transport_errors();
                self.errors.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut guard) = self.last_error.lock() {
                    *guard = Some(e.to_string());
                }
                self.handle_publish_failure(msg, &e).await;
            }
        }
    }

    async fn handle_publish_failure(&self, mut msg: Box<Message>, err: &PublishError) {
        msg.attempts += 1;
        let retry = &self.pipeline.retry;

        if retry.enabled && msg.attempts <= retry.max_attempts {
            let backoff = retry.backoff_for(msg.attempts - 1);
            debug!(
                id = %msg.id,
                attempts = msg.attempts,
                backoff_ms = backoff.as_millis() as u64,
                "scheduling publish retry"
            );

            // Deferred re-buffer: a timer raced against cancellation, never
            // tied to a worker.
            let buffer = Arc::clone(&self.buffer);
            let metrics = Arc::clone(&self.metrics);
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {
                        buffer.ensure_capacity_or_drop_oldest(1, |old| {
                            metrics.add_dropped(1);
                            drop(old);
                        });
                        if buffer.try_put(msg).is_err() {
                            metrics.add_dropped(1);
                        }
                    }
                    () = cancel.cancelled() => {
                        metrics.add_dropped(1);
                    }
                }
            });
            return;
        }

        if self.pipeline.dlq.enabled {
            let envelope = payload::build_dlq_envelope(&msg, &err.to_string());
            match serde_json::to_vec(&envelope) {
                Ok(bytes) => {
                    // DLQ publishes bypass the circuit breaker.
                    let result = self
                        .transport
                        .publish(&self.pipeline.dlq.topic, self.transport_cfg.qos, false, bytes)
                        .await;
                    match result {
                        Ok(()) => {
                            debug!(id = %msg.id, "message routed to dead-letter topic");
                        }
                        Err(e) => {
                            warn!(id = %msg.id, error = %e, "dead-letter publish failed");
                            self.metrics.add_dropped(1);
                        }
                    }
                }
                Err(e) => {
                    warn!(id = %msg.id, error = %e, "dead-letter envelope serialization failed");
                    self.metrics.add_dropped(1);
                }
            }
            return;
        }

        warn!(id = %msg.id, error = %err, "dropping message after publish failure");
        self.metrics.add_dropped(1);
    }

    fn notify_observer(&self, id: &str) {
        if let Ok(guard) = self.observer.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(id.to_string());
            }
        }
    }
}

impl MessageHandler for MessagePublisher {
    fn handle(&self, msg: Box<Message>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.process_message(msg))
    }
}

struct ProcessorInner {
    state: AtomicState,
    config: BridgeConfig,
    broker: Arc<dyn StreamBroker>,
    transport: Arc<dyn PubSubTransport>,
    buffer: Arc<Ring<Message>>,
    publisher: Arc<MessagePublisher>,
    pool: WorkerPool,
    metrics: Arc<BridgeMetrics>,
    cancel: CancelToken,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessorInner {
    fn is_paused(&self) -> bool {
        self.state.load() == ProcessorState::Paused
    }

    async fn sleep_cancellable(&self, duration: Duration) {
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = self.cancel.cancelled() => {}
        }
    }

    /// Admits a batch into the ring under the configured drop policy.
    fn buffer_batch(&self, messages: Vec<Message>, reason: &str) {
        let incoming = messages.len();
        if incoming == 0 {
            return;
        }
        let mut boxed: Vec<Box<Message>> = messages.into_iter().map(Box::new).collect();

        if self.config.pipeline.drop_policy == DropPolicy::Oldest {
            let evicted = self.buffer.ensure_capacity_or_drop_oldest(incoming, |old| {
                self.metrics.add_dropped(1);
                drop(old);
            });
            if evicted > 0 {
                debug!(evicted, reason, "evicted oldest buffered messages");
            }
        }

        let inserted = self.buffer.put_batch(&mut boxed);
        let rejected = boxed.len();
        if rejected > 0 {
            self.metrics.add_dropped(rejected as u64);
            warn!(inserted, dropped = rejected, reason, "buffer full, dropping messages");
        }
    }

    // -----------------------------------------------------------------
    // Background loops
    // -----------------------------------------------------------------

    async fn consume_loop(self: Arc<Self>) {
        let broker_cfg = self.config.broker.clone();
        let consumer = self.broker.consumer_name();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.is_paused() {
                self.sleep_cancellable(self.config.pipeline.idle_poll_sleep).await;
                continue;
            }

            let read = self.broker.read_messages(
                &broker_cfg.consumer_group,
                &consumer,
                &broker_cfg.stream_name,
                broker_cfg.batch_size,
                broker_cfg.block_time,
            );
            let result = tokio::select! {
                result = read => result,
                () = self.cancel.cancelled() => break,
            };

            match result {
                Ok(batch) => {
                    if batch.is_empty() {
                        continue;
                    }
                    self.metrics.add_received(batch.len() as u64);
                    self.buffer_batch(batch, "consume");
                }
                Err(e) => {
                    self.metrics.inc_broker_errors();
                    warn!(error = %e, "broker read failed");
                    self.sleep_cancellable(broker_cfg.retry_interval).await;
                }
            }
        }
    }

    async fn process_loop(self: Arc<Self>) {
        let batch_size = self.config.pipeline.batch_size.max(1);
        let flush_interval = self.config.pipeline.flush_interval;
        let idle_sleep = self.config.pipeline.idle_poll_sleep;
        let mut batch: Vec<Box<Message>> = Vec::with_capacity(batch_size);
        let mut last_flush = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.is_paused() {
                self.sleep_cancellable(idle_sleep).await;
                continue;
            }

            let remaining = batch_size - batch.len();
            let fetched = self.buffer.get_batch(&mut batch, remaining);

            if batch.len() >= batch_size {
                self.flush_batch(&mut batch);
                last_flush = Instant::now();
            } else if last_flush.elapsed() >= flush_interval {
                if !batch.is_empty() {
                    self.flush_batch(&mut batch);
                }
                last_flush = Instant::now();
            }

            if fetched == 0 {
                self.sleep_cancellable(idle_sleep).await;
            }
        }

        // Hand off whatever is in flight before exiting.
        if !batch.is_empty() {
            self.flush_batch(&mut batch);
        }
    }

    /// Submits a batch to the workers; the rejected remainder is dropped
    /// rather than spilled to a slower path.
    fn flush_batch(&self, batch: &mut Vec<Box<Message>>) {
        let inserted = self.pool.submit_batch(batch);
        let rejected = batch.len();
        if rejected > 0 {
            self.metrics.add_dropped(rejected as u64);
            warn!(inserted, dropped = rejected, "worker queue full, dropping flush remainder");
            batch.clear();
        }
    }

    async fn claim_loop(self: Arc<Self>) {
        let period = self.config.broker.claim_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.cancel.cancelled() => break,
            }
            if self.config.broker.aggressive_claim {
                self.perform_aggressive_claim().await;
            } else {
                self.perform_claim().await;
            }
        }
    }

    async fn perform_claim(&self) {
        let b = &self.config.broker;
        let consumer = self.broker.consumer_name();
        match self
            .broker
            .claim_pending_messages(
                &b.stream_name,
                &b.consumer_group,
                &consumer,
                b.claim_min_idle_time,
                b.claim_batch_size,
            )
            .await
        {
            Ok(batch) => {
                if !batch.is_empty() {
                    self.buffer_batch(batch, "claim");
                }
            }
            Err(e) => {
                self.metrics.inc_broker_errors();
                warn!(error = %e, "claim failed");
            }
        }
    }

    /// Repeats claim cycles until an empty batch. The first error terminates
    /// the cycle; no error state carries over to the next tick.
    async fn perform_aggressive_claim(&self) {
        let b = &self.config.broker;
        let consumer = self.broker.consumer_name();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self
                .broker
                .claim_pending_messages(
                    &b.stream_name,
                    &b.consumer_group,
                    &consumer,
                    b.claim_min_idle_time,
                    b.claim_batch_size,
                )
                .await
            {
                Ok(batch) => {
                    if batch.is_empty() {
                        break;
                    }
                    self.buffer_batch(batch, "claim");
                    if !b.claim_cycle_delay.is_zero() {
                        self.sleep_cancellable(b.claim_cycle_delay).await;
                    }
                }
                Err(e) => {
                    self.metrics.inc_broker_errors();
                    warn!(error = %e, "aggressive claim cycle aborted");
                    break;
                }
            }
        }
    }

    async fn drain_loop(self: Arc<Self>) {
        let period = self.config.broker.drain_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.cancel.cancelled() => break,
            }
            self.perform_drain().await;
        }
    }

    /// Picks up messages the group has not delivered to anyone yet, starting
    /// from the group's last delivered id.
    async fn perform_drain(&self) {
        let b = &self.config.broker;
        let info = match self
            .broker
            .get_consumer_group_info(&b.stream_name, &b.consumer_group)
            .await
        {
            Ok(info) => info,
            Err(e) => {
                self.metrics.inc_broker_errors();
                warn!(error = %e, "drain: group info failed");
                return;
            }
        };

        match self
            .broker
            .read_stream_messages(&b.stream_name, &info.last_delivered_id, b.drain_batch_size)
            .await
        {
            Ok(batch) => {
                if !batch.is_empty() {
                    self.buffer_batch(batch, "drain");
                }
            }
            Err(e) => {
                self.metrics.inc_broker_errors();
                warn!(error = %e, "drain: stream read failed");
            }
        }
    }

    async fn cleanup_loop(self: Arc<Self>) {
        let period = self.config.broker.consumer_cleanup_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.cancel.cancelled() => break,
            }
            self.perform_consumer_cleanup().await;
        }
    }

    /// Removes idle peer consumers with no pending messages.
    async fn perform_consumer_cleanup(&self) {
        let b = &self.config.broker;
        let self_name = self.broker.consumer_name();

        let consumers = match self.broker.get_consumers(&b.stream_name, &b.consumer_group).await {
            Ok(consumers) => consumers,
            Err(e) => {
                self.metrics.inc_broker_errors();
                warn!(error = %e, "consumer cleanup: listing failed");
                return;
            }
        };

        for consumer in consumers {
            if consumer.name == self_name {
                continue;
            }
            if consumer.idle > b.consumer_idle_timeout && consumer.pending == 0 {
                match self
                    .broker
                    .remove_consumer(&b.stream_name, &b.consumer_group, &consumer.name)
                    .await
                {
                    Ok(()) => info!(consumer = %consumer.name, "removed idle consumer"),
                    Err(e) => {
                        warn!(consumer = %consumer.name, error = %e, "failed to remove idle consumer");
                    }
                }
            }
        }
    }

    async fn backpressure_loop(self: Arc<Self>) {
        let period = self.config.pipeline.backpressure_poll_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.cancel.cancelled() => break,
            }
            self.backpressure_tick();
        }
    }

    fn backpressure_tick(&self) {
        let p = &self.config.pipeline;
        let usage = self.buffer.usage();

        if usage > p.backpressure_threshold && p.drop_policy == DropPolicy::Newest {
            // Accounting only: the actual rejects happen at insertion time.
            self.metrics.inc_backpressure_dropped();
        }

        self.metrics.buffer_utilization.set((usage * 100.0) as u64);
        self.metrics.active_workers.set(self.pool.worker_count() as u64);
        self.metrics.queue_depth.set(self.pool.queue_depth() as u64);
    }

    // -----------------------------------------------------------------
    // Acknowledgments
    // -----------------------------------------------------------------

    /// Handles one acknowledgment payload from the subscription topic.
    async fn handle_ack(&self, payload_bytes: &[u8]) {
        let ack = match payload::parse_ack(payload_bytes) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "malformed acknowledgment payload");
                return;
            }
        };
        if ack.id.is_empty() {
            warn!("acknowledgment with empty id");
            return;
        }
        if !ack.ack {
            warn!(id = %ack.id, "negative acknowledgment received");
            return;
        }

        let b = &self.config.broker;
        let ids = [ack.id.clone()];
        match self
            .broker
            .ack_messages(&b.stream_name, &b.consumer_group, &ids)
            .await
        {
            Ok(()) => {
                self.metrics.inc_acked();
                if let Err(e) = self.broker.delete_messages(&b.stream_name, &ids).await {
                    self.metrics.inc_broker_errors();
                    warn!(id = %ack.id, error = %e, "delete after acknowledge failed");
                }
            }
            Err(e) => {
                self.metrics.inc_broker_errors();
                warn!(id = %ack.id, error = %e, "broker acknowledge failed");
            }
        }
    }
}

/// Top-level processor handle.
pub struct StreamProcessor {
    inner: Arc<ProcessorInner>,
}

impl StreamProcessor {
    pub fn new(
        config: BridgeConfig,
        broker: Arc<dyn StreamBroker>,
        transport: Arc<dyn PubSubTransport>,
        breaker: Arc<dyn CircuitBreaker>,
    ) -> Self {
        let cancel = CancelToken::new();
        let metrics = Arc::new(BridgeMetrics::new());

        let capacity = config.pipeline.buffer_capacity();
        // Capacity is a power of two by construction.
        let buffer =
            Arc::new(Ring::new(capacity).expect("rounded buffer capacity is a power of two"));

        let publisher = Arc::new(MessagePublisher {
            transport: Arc::clone(&transport),
            breaker,
            buffer: Arc::clone(&buffer),
            metrics: Arc::clone(&metrics),
            buffers: BufferPool::new(PAYLOAD_POOL_SIZE, PAYLOAD_BUFFER_CAPACITY),
            pipeline: config.pipeline.clone(),
            transport_cfg: config.transport.clone(),
            cancel: cancel.clone(),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
            observer: Mutex::new(None),
        });

        let pool = WorkerPool::new(
            config.resource.min_workers,
            config.resource.max_workers,
            config.pipeline.worker_queue_size,
            publisher.clone(),
            cancel.clone(),
        );

        Self {
            inner: Arc::new(ProcessorInner {
                state: AtomicState::new(ProcessorState::Idle),
                config,
                broker,
                transport,
                buffer,
                publisher,
                pool,
                metrics,
                cancel,
                tasks: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts the processor: `idle → running`.
    ///
    /// Creates the consumer group, subscribes to the acknowledgment topic,
    /// starts the worker pool, and spawns the background loops. Any sub-step
    /// error reverts the state to `idle`.
    pub async fn start(&self) -> Result<(), BridgeError> {
        self.inner
            .state
            .transition(ProcessorState::Idle, ProcessorState::Running)?;

        if let Err(e) = self.start_inner().await {
            self.inner.state.store(ProcessorState::Idle);
            return Err(e);
        }
        info!("stream processor started");
        Ok(())
    }

    async fn start_inner(&self) -> Result<(), BridgeError> {
        let inner = &self.inner;
        let b = &inner.config.broker;

        inner
            .broker
            .create_consumer_group(&b.stream_name, &b.consumer_group, GROUP_START_ID)
            .await?;

        // The subscription handler holds a weak reference so the transport
        // retaining it does not keep the processor alive.
        let weak = Arc::downgrade(&self.inner);
        let handler: SubscribeHandler = Arc::new(move |_topic, payload_bytes| {
            if let Some(inner) = weak.upgrade() {
                tokio::spawn(async move {
                    inner.handle_ack(&payload_bytes).await;
                });
            }
        });
        let t = &inner.config.transport;
        inner
            .transport
            .subscribe(&t.subscribe_topic, t.qos, handler)
            .await?;

        inner.pool.start();

        let mut tasks = inner.tasks.lock().await;
        tasks.push(tokio::spawn(Arc::clone(inner).consume_loop()));
        tasks.push(tokio::spawn(Arc::clone(inner).process_loop()));
        tasks.push(tokio::spawn(Arc::clone(inner).claim_loop()));
        if b.drain_enabled {
            tasks.push(tokio::spawn(Arc::clone(inner).drain_loop()));
        }
        if b.consumer_cleanup_enabled {
            tasks.push(tokio::spawn(Arc::clone(inner).cleanup_loop()));
        }
        tasks.push(tokio::spawn(Arc::clone(inner).backpressure_loop()));

        Ok(())
    }

    /// Stops the processor: `{running, paused} → stopping → stopped`.
    ///
    /// Waits for workers and background tasks under the shutdown deadline;
    /// on deadline the remaining tasks are warned about and abandoned.
    pub async fn stop(&self) -> Result<(), BridgeError> {
        if self
            .inner
            .state
            .transition(ProcessorState::Running, ProcessorState::Stopping)
            .is_err()
        {
            self.inner
                .state
                .transition(ProcessorState::Paused, ProcessorState::Stopping)?;
        }

        let deadline = self.inner.config.app.shutdown_timeout;
        self.inner.cancel.cancel();

        if !self.inner.pool.stop_with_timeout(deadline).await {
            warn!("worker pool did not stop before the shutdown deadline");
        }

        let topics = [self.inner.config.transport.subscribe_topic.clone()];
        if let Err(e) = self.inner.transport.unsubscribe(&topics).await {
            warn!(error = %e, "unsubscribe failed during shutdown");
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.tasks.lock().await;
            guard.drain(..).collect()
        };
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(deadline, wait_all).await.is_err() {
            warn!("background tasks did not finish before the shutdown deadline");
        }

        self.inner.state.store(ProcessorState::Stopped);
        info!("stream processor stopped");
        Ok(())
    }

    /// `running → paused`. Consume and process loops honor the pause.
    pub fn pause(&self) -> Result<(), BridgeError> {
        self.inner
            .state
            .transition(ProcessorState::Running, ProcessorState::Paused)
    }

    /// `paused → running`.
    pub fn resume(&self) -> Result<(), BridgeError> {
        self.inner
            .state
            .transition(ProcessorState::Paused, ProcessorState::Running)
    }

    pub fn state(&self) -> ProcessorState {
        self.inner.state.load()
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Messages processed successfully by workers.
    pub fn processed(&self) -> u64 {
        self.inner.publisher.processed.load(Ordering::Relaxed)
    }

    /// Publish failures observed by workers.
    pub fn errors(&self) -> u64 {
        self.inner.publisher.errors.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        match self.inner.publisher.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    /// Installs a channel that receives the id of every successfully
    /// published message. Intended for tests.
    pub fn set_observer(&self, tx: mpsc::UnboundedSender<String>) {
        if let Ok(mut guard) = self.inner.publisher.observer.lock() {
            *guard = Some(tx);
        }
    }
}
