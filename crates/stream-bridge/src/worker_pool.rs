//! Dynamically sized worker pool draining the message fast-path queue.
//!
//! Workers are tokio tasks. The fast path is the lock-free [`MessageQueue`];
//! a small bounded crossbeam channel serves as a fallback for general tasks.
//! A panicking handler never takes a worker down: every invocation runs
//! under a recovery boundary.

use crate::error::{BridgeError, SubmitError};
use crate::message::Message;
use crate::queue::MessageQueue;
use crate::shutdown::CancelToken;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Messages drained per worker loop iteration.
const WORKER_BATCH: usize = 64;
/// Capacity of the legacy task fallback channel.
const TASK_CHANNEL_CAP: usize = 64;

/// A general task accepted on the fallback channel.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Per-message handler invoked by workers.
///
/// Boxed-future form so the pool can hold `Arc<dyn MessageHandler>`.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, msg: Box<Message>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Dynamic pool of worker tasks.
pub struct WorkerPool {
    min_workers: usize,
    max_workers: usize,
    current: Arc<AtomicUsize>,
    started: AtomicBool,
    stopped: AtomicBool,
    cancel: CancelToken,
    queue: RwLock<Arc<MessageQueue>>,
    handler: Arc<dyn MessageHandler>,
    task_tx: Mutex<Option<crossbeam_channel::Sender<Task>>>,
    task_rx: crossbeam_channel::Receiver<Task>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        min_workers: usize,
        max_workers: usize,
        queue_capacity: usize,
        handler: Arc<dyn MessageHandler>,
        cancel: CancelToken,
    ) -> Self {
        let min_workers = min_workers.max(1);
        let max_workers = max_workers.max(min_workers);
        let (task_tx, task_rx) = crossbeam_channel::bounded(TASK_CHANNEL_CAP);

        Self {
            min_workers,
            max_workers,
            current: Arc::new(AtomicUsize::new(0)),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cancel,
            queue: RwLock::new(Arc::new(MessageQueue::new(queue_capacity))),
            handler,
            task_tx: Mutex::new(Some(task_tx)),
            task_rx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Starts the pool with `min_workers` workers. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for _ in 0..self.min_workers {
            self.try_reserve_and_spawn();
        }
    }

    /// Stops the pool, waiting for every worker to exit.
    pub async fn stop(&self) {
        self.begin_stop();
        for handle in self.take_handles() {
            let _ = handle.await;
        }
    }

    /// Stops the pool with a deadline. Returns `true` iff every worker
    /// exited in time. The task channel is closed either way.
    pub async fn stop_with_timeout(&self, timeout: Duration) -> bool {
        self.begin_stop();
        let handles = self.take_handles();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        match tokio::time::timeout(timeout, wait_all).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "worker pool stop deadline exceeded"
                );
                false
            }
        }
    }

    fn begin_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        // Dropping the sender disconnects the channel so receivers are
        // never left waiting on it.
        if let Ok(mut tx) = self.task_tx.lock() {
            tx.take();
        }
    }

    fn take_handles(&self) -> Vec<JoinHandle<()>> {
        match self.handles.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Enqueues a message on the fast path.
    pub fn submit_msg(&self, msg: Box<Message>) -> Result<(), SubmitError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubmitError::Stopped);
        }
        match self.shared_queue().push(msg) {
            Ok(()) => {
                self.maybe_spawn_worker();
                Ok(())
            }
            Err(_rejected) => Err(SubmitError::QueueFull),
        }
    }

    /// Enqueues a prefix of `msgs` as far as the queue accepts; returns the
    /// inserted count. The remainder stays in the vec.
    pub fn submit_batch(&self, msgs: &mut Vec<Box<Message>>) -> usize {
        if self.stopped.load(Ordering::SeqCst) {
            return 0;
        }
        let inserted = self.shared_queue().push_batch(msgs);
        if inserted > 0 {
            self.maybe_spawn_worker();
        }
        inserted
    }

    /// Enqueues a general task on the fallback channel.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubmitError::Stopped);
        }
        let guard = match self.task_tx.lock() {
            Ok(guard) => guard,
            Err(_) => return Err(SubmitError::Stopped),
        };
        match guard.as_ref() {
            Some(tx) => match tx.try_send(task) {
                Ok(()) => {
                    drop(guard);
                    self.maybe_spawn_worker();
                    Ok(())
                }
                Err(crossbeam_channel::TrySendError::Full(_)) => Err(SubmitError::QueueFull),
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                    Err(SubmitError::Stopped)
                }
            },
            None => Err(SubmitError::Stopped),
        }
    }

    /// Replaces the message queue; only legal before `start`.
    pub fn set_msg_queue_capacity(&self, capacity: usize) -> Result<(), BridgeError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(BridgeError::PoolStarted);
        }
        if let Ok(mut guard) = self.queue.write() {
            *guard = Arc::new(MessageQueue::new(capacity));
        }
        Ok(())
    }

    /// Grows the pool toward `n`, clamped to `[min_workers, max_workers]`.
    /// Never downsizes; workers retire only at shutdown.
    pub fn set_worker_count(&self, n: usize) {
        let target = n.clamp(self.min_workers, self.max_workers);
        loop {
            let cur = self.current.load(Ordering::Relaxed);
            if cur >= target {
                return;
            }
            if self
                .current
                .compare_exchange(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.spawn_worker_task();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.shared_queue().len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared_queue().capacity()
    }

    fn shared_queue(&self) -> Arc<MessageQueue> {
        match self.queue.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Spawn heuristic: fires after a successful enqueue when the fallback
    /// channel is more than half full or the message queue is non-empty,
    /// and the pool has headroom. Yield-backoff on CAS contention.
    fn maybe_spawn_worker(&self) {
        if !self.started.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let channel_pressure = self.task_rx.len() > TASK_CHANNEL_CAP / 2;
        let queue_busy = !self.shared_queue().is_empty();
        if !channel_pressure && !queue_busy {
            return;
        }
        loop {
            let cur = self.current.load(Ordering::Relaxed);
            if cur >= self.max_workers {
                return;
            }
            if self
                .current
                .compare_exchange(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.spawn_worker_task();
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Reserves a worker slot and spawns it, bounded by `max_workers`.
    fn try_reserve_and_spawn(&self) {
        loop {
            let cur = self.current.load(Ordering::Relaxed);
            if cur >= self.max_workers {
                return;
            }
            if self
                .current
                .compare_exchange(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.spawn_worker_task();
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Spawns the worker task for an already-reserved slot.
    fn spawn_worker_task(&self) {
        let queue = self.shared_queue();
        let rx = self.task_rx.clone();
        let handler = Arc::clone(&self.handler);
        let cancel = self.cancel.clone();
        let current = Arc::clone(&self.current);

        let handle = tokio::spawn(async move {
            worker_loop(queue, rx, handler, cancel).await;
            current.fetch_sub(1, Ordering::AcqRel);
        });

        if let Ok(mut guard) = self.handles.lock() {
            guard.push(handle);
        }
    }
}

async fn worker_loop(
    queue: Arc<MessageQueue>,
    rx: crossbeam_channel::Receiver<Task>,
    handler: Arc<dyn MessageHandler>,
    cancel: CancelToken,
) {
    let mut scratch: Vec<Box<Message>> = Vec::with_capacity(WORKER_BATCH);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let drained = queue.pop_batch(&mut scratch, WORKER_BATCH);
        if drained > 0 {
            for msg in scratch.drain(..) {
                if cancel.is_cancelled() {
                    // Shutting down; remaining messages are dropped.
                    continue;
                }
                let id = msg.id.clone();
                let outcome = AssertUnwindSafe(handler.handle(msg)).catch_unwind().await;
                if outcome.is_err() {
                    error!(id = %id, "message handler panicked; worker continues");
                }
            }
            continue;
        }

        match rx.try_recv() {
            Ok(task) => {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(task));
                if outcome.is_err() {
                    error!("fallback task panicked; worker continues");
                }
            }
            Err(crossbeam_channel::TryRecvError::Empty)
            | Err(crossbeam_channel::TryRecvError::Disconnected) => {
                tokio::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct CountingHandler {
        handled: AtomicU64,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                handled: AtomicU64::new(0),
            })
        }
    }

    impl MessageHandler for CountingHandler {
        fn handle(&self, _msg: Box<Message>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                self.handled.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    struct PanickingHandler {
        calls: AtomicU64,
    }

    impl MessageHandler for PanickingHandler {
        fn handle(&self, msg: Box<Message>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if msg.id == "bad" {
                    panic!("poison message");
                }
            })
        }
    }

    fn make_msg(id: &str) -> Box<Message> {
        Box::new(Message::new(id, b"payload".to_vec()))
    }

    #[tokio::test]
    async fn test_pool_processes_messages() {
        let handler = CountingHandler::new();
        let pool = WorkerPool::new(2, 4, 64, handler.clone(), CancelToken::new());
        pool.start();

        for i in 0..20 {
            pool.submit_msg(make_msg(&format!("1-{i}"))).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.handled.load(Ordering::SeqCst) < 20 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("messages were not all handled");

        assert!(pool.stop_with_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_submit_fails_after_stop() {
        let pool = WorkerPool::new(1, 2, 8, CountingHandler::new(), CancelToken::new());
        pool.start();
        assert!(pool.stop_with_timeout(Duration::from_secs(1)).await);

        assert_eq!(
            pool.submit_msg(make_msg("1-1")).unwrap_err(),
            SubmitError::Stopped
        );
        assert_eq!(
            pool.submit(Box::new(|| {})).unwrap_err(),
            SubmitError::Stopped
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let pool = WorkerPool::new(2, 4, 8, CountingHandler::new(), CancelToken::new());
        pool.start();
        let count = pool.worker_count();
        pool.start();
        assert_eq!(pool.worker_count(), count);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_submit_batch_returns_inserted_prefix() {
        let handler = CountingHandler::new();
        let pool = WorkerPool::new(1, 1, 4, handler, CancelToken::new());
        // Not started: no workers drain, so the queue fills deterministically.
        let mut msgs: Vec<Box<Message>> = (0..6).map(|i| make_msg(&format!("1-{i}"))).collect();
        let inserted = pool.submit_batch(&mut msgs);
        assert_eq!(inserted, 4);
        assert_eq!(msgs.len(), 2);
    }

    #[tokio::test]
    async fn test_panic_recovery_keeps_worker_alive() {
        let handler = Arc::new(PanickingHandler {
            calls: AtomicU64::new(0),
        });
        let pool = WorkerPool::new(1, 1, 64, handler.clone(), CancelToken::new());
        pool.start();

        pool.submit_msg(make_msg("bad")).unwrap();
        pool.submit_msg(make_msg("good")).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker died after panic");

        assert!(pool.stop_with_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_set_msg_queue_capacity_only_before_start() {
        let pool = WorkerPool::new(1, 2, 8, CountingHandler::new(), CancelToken::new());
        pool.set_msg_queue_capacity(256).unwrap();
        assert_eq!(pool.queue_capacity(), 256);

        pool.start();
        assert!(matches!(
            pool.set_msg_queue_capacity(512),
            Err(BridgeError::PoolStarted)
        ));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_set_worker_count_clamps_and_grows() {
        let pool = WorkerPool::new(2, 4, 8, CountingHandler::new(), CancelToken::new());
        pool.start();
        assert_eq!(pool.worker_count(), 2);

        pool.set_worker_count(100);
        assert_eq!(pool.worker_count(), 4);

        // Growing never shrinks.
        pool.set_worker_count(1);
        assert_eq!(pool.worker_count(), 4);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_fallback_task_runs() {
        let pool = WorkerPool::new(1, 2, 8, CountingHandler::new(), CancelToken::new());
        pool.start();

        let ran = Arc::new(AtomicU64::new(0));
        let flag = Arc::clone(&ran);
        pool.submit(Box::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while ran.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fallback task did not run");

        pool.stop().await;
    }
}
