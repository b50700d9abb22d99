//! End-to-end integration tests: scripted broker → processor → recording
//! transport, with acknowledgments fed back through the captured
//! subscription handler.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_bridge::{
    BridgeConfig, BrokerError, BrokerFuture, ConsumerInfo, GroupInfo, Message, ProcessorState,
    PubSubTransport, StreamBroker, StreamProcessor, SubscribeHandler, ThresholdBreaker,
    TransportFuture,
};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------

#[derive(Default)]
struct ScriptedBroker {
    reads: Mutex<VecDeque<Vec<Message>>>,
    acked: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedBroker {
    fn push_read(&self, batch: Vec<Message>) {
        self.reads.lock().unwrap().push_back(batch);
    }
}

impl StreamBroker for ScriptedBroker {
    fn create_consumer_group<'a>(
        &'a self,
        _stream: &'a str,
        _group: &'a str,
        _start_id: &'a str,
    ) -> BrokerFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn read_messages<'a>(
        &'a self,
        _group: &'a str,
        _consumer: &'a str,
        _stream: &'a str,
        _batch_size: usize,
        block_time: Duration,
    ) -> BrokerFuture<'a, Vec<Message>> {
        Box::pin(async move {
            let scripted = self.reads.lock().unwrap().pop_front();
            if let Some(batch) = scripted {
                return Ok(batch);
            }
            tokio::time::sleep(block_time).await;
            Ok(Vec::new())
        })
    }

    fn ack_messages<'a>(
        &'a self,
        _stream: &'a str,
        _group: &'a str,
        ids: &'a [String],
    ) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.acked.lock().unwrap().extend(ids.iter().cloned());
            Ok(())
        })
    }

    fn delete_messages<'a>(&'a self, _stream: &'a str, ids: &'a [String]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.deleted.lock().unwrap().extend(ids.iter().cloned());
            Ok(())
        })
    }

    fn claim_pending_messages<'a>(
        &'a self,
        _stream: &'a str,
        _group: &'a str,
        _consumer: &'a str,
        _min_idle: Duration,
        _batch: usize,
    ) -> BrokerFuture<'a, Vec<Message>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn get_consumers<'a>(
        &'a self,
        _stream: &'a str,
        _group: &'a str,
    ) -> BrokerFuture<'a, Vec<ConsumerInfo>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn remove_consumer<'a>(
        &'a self,
        _stream: &'a str,
        _group: &'a str,
        _name: &'a str,
    ) -> BrokerFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn read_stream_messages<'a>(
        &'a self,
        _stream: &'a str,
        _start_id: &'a str,
        _batch: usize,
    ) -> BrokerFuture<'a, Vec<Message>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn get_consumer_group_info<'a>(
        &'a self,
        _stream: &'a str,
        group: &'a str,
    ) -> BrokerFuture<'a, GroupInfo> {
        let name = group.to_string();
        Box::pin(async move {
            Ok(GroupInfo {
                name,
                last_delivered_id: "0-0".to_string(),
                consumers: 1,
                pending: 0,
            })
        })
    }

    fn consumer_name(&self) -> String {
        "bridge-consumer-1".to_string()
    }

    fn ping(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[derive(Default)]
struct RecordingTransport {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    handler: Mutex<Option<SubscribeHandler>>,
    unsubscribed: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    fn ack_handler(&self) -> SubscribeHandler {
        self.handler
            .lock()
            .unwrap()
            .clone()
            .expect("processor did not subscribe")
    }
}

impl PubSubTransport for RecordingTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&self, _grace: Duration) -> TransportFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        _qos: u8,
        _retained: bool,
        payload: Vec<u8>,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        _topic: &'a str,
        _qos: u8,
        handler: SubscribeHandler,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            *self.handler.lock().unwrap() = Some(handler);
            Ok(())
        })
    }

    fn unsubscribe<'a>(&'a self, topics: &'a [String]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.unsubscribed
                .lock()
                .unwrap()
                .extend(topics.iter().cloned());
            Ok(())
        })
    }

    fn user_prefix(&self) -> String {
        String::new()
    }
}

// ---------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------

fn fast_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.pipeline.batch_size = 10;
    config.pipeline.flush_interval = Duration::from_millis(20);
    config.pipeline.idle_poll_sleep = Duration::from_millis(5);
    config.pipeline.backpressure_poll_interval = Duration::from_millis(20);
    config.broker.block_time = Duration::from_millis(20);
    config.broker.claim_interval = Duration::from_millis(200);
    config.app.shutdown_timeout = Duration::from_secs(2);
    config
}

fn msg(id: &str) -> Message {
    Message::new(id, format!(r#"{{"seq":"{id}"}}"#).into_bytes())
}

async fn wait_for<F>(mut condition: F, timeout: Duration)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

// ---------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------

#[tokio::test]
async fn test_end_to_end_publish_and_ack() {
    let broker = Arc::new(ScriptedBroker::default());
    let transport = Arc::new(RecordingTransport::default());
    broker.push_read((0..5).map(|i| msg(&format!("1-{i}"))).collect());

    let processor = StreamProcessor::new(
        fast_config(),
        broker.clone(),
        transport.clone(),
        Arc::new(ThresholdBreaker::with_defaults()),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    processor.set_observer(tx);

    processor.start().await.unwrap();

    // All five messages come out on the publish topic.
    let mut seen = Vec::new();
    for _ in 0..5 {
        let id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("publish did not happen")
            .unwrap();
        seen.push(id);
    }
    seen.sort();
    assert_eq!(seen, (0..5).map(|i| format!("1-{i}")).collect::<Vec<_>>());

    let published = transport.published();
    assert_eq!(published.len(), 5);
    for (topic, body) in &published {
        assert_eq!(topic, "bridge/out");
        let value: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert!(value["message"]["payload"]["seq"].is_string());
        assert!(value["redis"]["payload"]["id"].is_string());
    }

    // Feed acknowledgments back through the captured subscription handler.
    let handler = transport.ack_handler();
    for i in 0..5 {
        handler(
            "bridge/ack".to_string(),
            format!(r#"{{"id":"1-{i}","ack":true}}"#).into_bytes(),
        );
    }

    wait_for(|| broker.deleted.lock().unwrap().len() == 5, Duration::from_secs(5)).await;
    assert_eq!(broker.acked.lock().unwrap().len(), 5);

    let snapshot = processor.metrics().snapshot();
    assert_eq!(snapshot.messages_received, 5);
    assert_eq!(snapshot.messages_published, 5);
    assert_eq!(snapshot.messages_acked, 5);
    assert_eq!(snapshot.messages_dropped, 0);

    processor.stop().await.unwrap();
    assert_eq!(processor.state(), ProcessorState::Stopped);
    assert_eq!(
        transport.unsubscribed.lock().unwrap().as_slice(),
        ["bridge/ack"]
    );
}

#[tokio::test]
async fn test_negative_ack_leaves_broker_untouched() {
    let broker = Arc::new(ScriptedBroker::default());
    let transport = Arc::new(RecordingTransport::default());

    let processor = StreamProcessor::new(
        fast_config(),
        broker.clone(),
        transport.clone(),
        Arc::new(ThresholdBreaker::with_defaults()),
    );
    processor.start().await.unwrap();

    let handler = transport.ack_handler();
    handler(
        "bridge/ack".to_string(),
        br#"{"id":"1-1","ack":false}"#.to_vec(),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(broker.acked.lock().unwrap().is_empty());
    assert!(broker.deleted.lock().unwrap().is_empty());
    assert_eq!(processor.metrics().snapshot().messages_acked, 0);

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn test_pause_gates_flow_and_resume_restores_it() {
    let broker = Arc::new(ScriptedBroker::default());
    let transport = Arc::new(RecordingTransport::default());

    let processor = StreamProcessor::new(
        fast_config(),
        broker.clone(),
        transport.clone(),
        Arc::new(ThresholdBreaker::with_defaults()),
    );
    processor.start().await.unwrap();
    processor.pause().unwrap();

    // Let the consume loop settle into the paused branch, then script work.
    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.push_read(vec![msg("p-1"), msg("p-2")]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        transport.published().is_empty(),
        "paused processor must not publish"
    );

    processor.resume().unwrap();
    wait_for(|| transport.published().len() == 2, Duration::from_secs(5)).await;

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn test_struct_data_rewrite_travels_to_transport() {
    let broker = Arc::new(ScriptedBroker::default());
    let transport = Arc::new(RecordingTransport::default());
    broker.push_read(vec![Message::new(
        "sd-1",
        br#"{"struct_data":"{\"nested\":true}"}"#.to_vec(),
    )]);

    let processor = StreamProcessor::new(
        fast_config(),
        broker,
        transport.clone(),
        Arc::new(ThresholdBreaker::with_defaults()),
    );
    processor.start().await.unwrap();

    wait_for(|| transport.published().len() == 1, Duration::from_secs(5)).await;

    let (_, body) = &transport.published()[0];
    let value: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(value["message"]["payload"]["struct_data"]["nested"], true);
    assert_eq!(value["redis"]["payload"]["id"], "sd-1");

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn test_backpressure_gauges_update_while_running() {
    let broker = Arc::new(ScriptedBroker::default());
    let transport = Arc::new(RecordingTransport::default());
    broker.push_read((0..8).map(|i| msg(&format!("g-{i}"))).collect());

    let processor = StreamProcessor::new(
        fast_config(),
        broker,
        transport.clone(),
        Arc::new(ThresholdBreaker::with_defaults()),
    );
    processor.start().await.unwrap();

    wait_for(|| transport.published().len() == 8, Duration::from_secs(5)).await;
    // Let at least one telemetry tick run after the burst.
    tokio::time::sleep(Duration::from_millis(60)).await;

    let snapshot = processor.metrics().snapshot();
    assert!(snapshot.active_workers >= 2, "min workers should be live");
    assert_eq!(snapshot.buffer_utilization, 0);

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn test_broker_read_errors_keep_pipeline_alive() {
    struct FlakyBroker {
        inner: ScriptedBroker,
        fail_first: Mutex<bool>,
    }

    impl StreamBroker for FlakyBroker {
        fn create_consumer_group<'a>(
            &'a self,
            stream: &'a str,
            group: &'a str,
            start_id: &'a str,
        ) -> BrokerFuture<'a, ()> {
            self.inner.create_consumer_group(stream, group, start_id)
        }

        fn read_messages<'a>(
            &'a self,
            group: &'a str,
            consumer: &'a str,
            stream: &'a str,
            batch_size: usize,
            block_time: Duration,
        ) -> BrokerFuture<'a, Vec<Message>> {
            let mut fail = self.fail_first.lock().unwrap();
            if *fail {
                *fail = false;
                return Box::pin(async { Err(BrokerError::Io("transient".into())) });
            }
            drop(fail);
            self.inner
                .read_messages(group, consumer, stream, batch_size, block_time)
        }

        fn ack_messages<'a>(
            &'a self,
            stream: &'a str,
            group: &'a str,
            ids: &'a [String],
        ) -> BrokerFuture<'a, ()> {
            self.inner.ack_messages(stream, group, ids)
        }

        fn delete_messages<'a>(
            &'a self,
            stream: &'a str,
            ids: &'a [String],
        ) -> BrokerFuture<'a, ()> {
            self.inner.delete_messages(stream, ids)
        }

        fn claim_pending_messages<'a>(
            &'a self,
            stream: &'a str,
            group: &'a str,
            consumer: &'a str,
            min_idle: Duration,
            batch: usize,
        ) -> BrokerFuture<'a, Vec<Message>> {
            self.inner
                .claim_pending_messages(stream, group, consumer, min_idle, batch)
        }

        fn get_consumers<'a>(
            &'a self,
            stream: &'a str,
            group: &'a str,
        ) -> BrokerFuture<'a, Vec<ConsumerInfo>> {
            self.inner.get_consumers(stream, group)
        }

        fn remove_consumer<'a>(
            &'a self,
            stream: &'a str,
            group: &'a str,
            name: &'a str,
        ) -> BrokerFuture<'a, ()> {
            self.inner.remove_consumer(stream, group, name)
        }

        fn read_stream_messages<'a>(
            &'a self,
            stream: &'a str,
            start_id: &'a str,
            batch: usize,
        ) -> BrokerFuture<'a, Vec<Message>> {
            self.inner.read_stream_messages(stream, start_id, batch)
        }

        fn get_consumer_group_info<'a>(
            &'a self,
            stream: &'a str,
            group: &'a str,
        ) -> BrokerFuture<'a, GroupInfo> {
            self.inner.get_consumer_group_info(stream, group)
        }

        fn consumer_name(&self) -> String {
            self.inner.consumer_name()
        }

        fn ping(&self) -> BrokerFuture<'_, ()> {
            self.inner.ping()
        }

        fn close(&self) -> BrokerFuture<'_, ()> {
            self.inner.close()
        }
    }

    let broker = Arc::new(FlakyBroker {
        inner: ScriptedBroker::default(),
        fail_first: Mutex::new(true),
    });
    broker.inner.push_read(vec![msg("f-1")]);

    let mut config = fast_config();
    config.broker.retry_interval = Duration::from_millis(10);

    let transport = Arc::new(RecordingTransport::default());
    let processor = StreamProcessor::new(
        config,
        broker,
        transport.clone(),
        Arc::new(ThresholdBreaker::with_defaults()),
    );
    processor.start().await.unwrap();

    // The first read fails; the loop sleeps and the next read delivers.
    wait_for(|| transport.published().len() == 1, Duration::from_secs(5)).await;

    let snapshot = processor.metrics().snapshot();
    assert_eq!(snapshot.broker_errors, 1);
    assert_eq!(snapshot.messages_published, 1);

    processor.stop().await.unwrap();
}
