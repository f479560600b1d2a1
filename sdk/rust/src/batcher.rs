//! Client-side event batching
//!
//! [`EventBatcher`] buffers events in memory and ships them through a
//! [`Transport`] either when a full batch accumulates or on a fixed interval.
//! Delivery is best effort: a failed batch goes back to the front of the
//! buffer and is retried on the next flush, and the buffer never grows past
//! its cap. Nothing here returns an error to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::buffer::RingBuffer;
use crate::event::LlmEvent;
use crate::transport::Transport;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_BUFFER: usize = 1000;

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_buffer: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

struct BatcherState {
    buffer: Mutex<RingBuffer<LlmEvent>>,
    flushing: AtomicBool,
    /// Signalled each time an in-flight flush finishes
    flush_done: Notify,
    transport: Arc<dyn Transport>,
    batch_size: usize,
}

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flushed {
    /// Another flush was in flight
    Busy,
    Empty,
    Sent,
    Failed,
}

/// Clears the in-flight flag even if the flush future is dropped mid-send
struct FlushGuard<'a>(&'a BatcherState);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.flushing.store(false, Ordering::Release);
        self.0.flush_done.notify_waiters();
    }
}

impl BatcherState {
    async fn flush(&self) -> Flushed {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Flushed::Busy;
        }
        let _guard = FlushGuard(self);

        let batch = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return Flushed::Empty;
            }
            buffer.take_front(self.batch_size)
        };

        let count = batch.len();
        match self.transport.send(&batch).await {
            Ok(()) => {
                tracing::debug!(count, "Flushed event batch");
                Flushed::Sent
            }
            Err(e) => {
                tracing::warn!(error = %e, count, "Failed to send events, re-buffering");
                let dropped = self.buffer.lock().requeue_front(batch);
                if dropped > 0 {
                    tracing::warn!(dropped, "Buffer full after re-buffering, dropped newest events");
                }
                Flushed::Failed
            }
        }
    }

    /// Wait until no flush is in flight
    async fn wait_idle(&self) {
        loop {
            // Registered before the flag check so a release in between is not missed
            let done = self.flush_done.notified();
            if !self.flushing.load(Ordering::Acquire) {
                return;
            }
            done.await;
        }
    }
}

/// Buffers events and delivers them in batches
pub struct EventBatcher {
    state: Arc<BatcherState>,
    cancel: CancellationToken,
}

impl EventBatcher {
    /// Create a batcher and start its periodic flush task.
    ///
    /// The task only holds a weak reference to the batcher state. Outside a
    /// tokio runtime no task is started and only size-triggered and explicit
    /// flushes apply.
    pub fn new(config: BatcherConfig, transport: Arc<dyn Transport>) -> Self {
        let batch_size = config.batch_size.max(1);
        let state = Arc::new(BatcherState {
            buffer: Mutex::new(RingBuffer::new(config.max_buffer)),
            flushing: AtomicBool::new(false),
            flush_done: Notify::new(),
            transport,
            batch_size,
        });
        let cancel = CancellationToken::new();

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_flush_timer(
                    Arc::downgrade(&state),
                    config.flush_interval,
                    cancel.clone(),
                ));
            }
            Err(_) => {
                tracing::warn!("No tokio runtime available, periodic flushing disabled");
            }
        }

        Self { state, cancel }
    }

    /// Queue one event. Never blocks and never fails.
    pub fn add(&self, event: LlmEvent) {
        let len = {
            let mut buffer = self.state.buffer.lock();
            let evicted = buffer.push_back(event);
            if evicted > 0 {
                tracing::warn!(
                    max_buffer = buffer.capacity(),
                    evicted,
                    "Event buffer full, dropping oldest"
                );
            }
            buffer.len()
        };

        if len >= self.state.batch_size
            && let Ok(handle) = Handle::try_current()
        {
            let state = Arc::clone(&self.state);
            handle.spawn(async move {
                state.flush().await;
            });
        }
    }

    /// Send up to one batch. A flush already in flight makes this a no-op.
    pub async fn flush(&self) {
        self.state.flush().await;
    }

    /// Stop the periodic task and drain the buffer
    ///
    /// Waits for a flush already in flight, then sends batches until the
    /// buffer is empty or a send fails. Events still buffered afterwards are
    /// logged and left in place.
    pub async fn destroy(&self) {
        self.cancel.cancel();
        loop {
            self.state.wait_idle().await;
            match self.state.flush().await {
                Flushed::Sent | Flushed::Busy => continue,
                Flushed::Empty | Flushed::Failed => break,
            }
        }

        let remaining = self.len();
        if remaining > 0 {
            tracing::warn!(remaining, "Batcher stopped with undelivered events");
        }
    }

    pub fn len(&self) -> usize {
        self.state.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for EventBatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_flush_timer(state: Weak<BatcherState>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(state) = state.upgrade() else { break };
                state.flush().await;
            }
        }
    }
    tracing::debug!("Flush timer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::SdkError;
    use crate::event::tests::sample_event;

    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<Vec<LlmEvent>>>,
        fail: AtomicBool,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<Vec<LlmEvent>> {
            self.batches.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, events: &[LlmEvent]) -> Result<(), SdkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SdkError::Status {
                    status: 500,
                    message: "Internal Server Error".to_string(),
                });
            }
            self.batches.lock().push(events.to_vec());
            Ok(())
        }
    }

    fn config(batch_size: usize, max_buffer: usize) -> BatcherConfig {
        BatcherConfig {
            batch_size,
            flush_interval: Duration::from_secs(3600),
            max_buffer,
        }
    }

    fn numbered(n: u64) -> LlmEvent {
        let mut event = sample_event("gpt-4o");
        event.input_tokens = n;
        event
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn test_explicit_flush_sends_one_batch() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = EventBatcher::new(config(10, 100), transport.clone());

        for i in 0..3 {
            batcher.add(numbered(i));
        }
        assert_eq!(batcher.len(), 3);
        assert!(transport.sent().is_empty());

        batcher.flush().await;
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 3);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_full_batch_triggers_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = EventBatcher::new(config(2, 100), transport.clone());

        batcher.add(numbered(1));
        batcher.add(numbered(2));

        wait_until(|| transport.sent().len() == 1).await;
        assert_eq!(transport.sent()[0].len(), 2);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_requeued_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let batcher = EventBatcher::new(config(2, 100), transport.clone());

        batcher.state.buffer.lock().push_back(numbered(1));
        batcher.state.buffer.lock().push_back(numbered(2));
        batcher.state.buffer.lock().push_back(numbered(3));

        batcher.flush().await;
        assert_eq!(batcher.len(), 3);

        transport.fail.store(false, Ordering::SeqCst);
        batcher.flush().await;
        let sent = transport.sent();
        let tokens: Vec<u64> = sent[0].iter().map(|e| e.input_tokens).collect();
        assert_eq!(tokens, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_overflow_keeps_newest() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = EventBatcher::new(config(100, 3), transport.clone());

        for i in 1..=5 {
            batcher.add(numbered(i));
        }
        assert_eq!(batcher.len(), 3);

        batcher.flush().await;
        let tokens: Vec<u64> = transport.sent()[0].iter().map(|e| e.input_tokens).collect();
        assert_eq!(tokens, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_timer_flushes_periodically() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = EventBatcher::new(
            BatcherConfig {
                batch_size: 10,
                flush_interval: Duration::from_millis(20),
                max_buffer: 100,
            },
            transport.clone(),
        );

        batcher.add(numbered(1));
        wait_until(|| transport.sent().len() == 1).await;
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_flushes_and_stops_timer() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = EventBatcher::new(
            BatcherConfig {
                batch_size: 10,
                flush_interval: Duration::from_millis(20),
                max_buffer: 100,
            },
            transport.clone(),
        );

        batcher.destroy().await;
        assert!(transport.sent().is_empty());

        batcher.add(numbered(1));
        batcher.destroy().await;
        assert_eq!(transport.sent().len(), 1);

        batcher.add(numbered(2));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(batcher.len(), 1);
    }

    /// Blocks every send until `release` is notified
    struct GatedTransport {
        started: mpsc::UnboundedSender<()>,
        release: Notify,
        calls: AtomicUsize,
        delivered: AtomicUsize,
    }

    impl GatedTransport {
        fn new(started: mpsc::UnboundedSender<()>) -> Self {
            Self {
                started,
                release: Notify::new(),
                calls: AtomicUsize::new(0),
                delivered: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, events: &[LlmEvent]) -> Result<(), SdkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.started.send(());
            self.release.notified().await;
            self.delivered.fetch_add(events.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_flush_is_noop() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(GatedTransport::new(started_tx));
        let batcher = Arc::new(EventBatcher::new(config(10, 100), transport.clone()));
        batcher.add(numbered(1));
        batcher.add(numbered(2));

        let in_flight = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move { batcher.flush().await })
        };
        started_rx.recv().await.unwrap();

        batcher.flush().await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        transport.release.notify_one();
        in_flight.await.unwrap();
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_waits_for_in_flight_flush_then_drains() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(GatedTransport::new(started_tx));
        let batcher = Arc::new(EventBatcher::new(config(10, 100), transport.clone()));
        for i in 0..12 {
            batcher.add(numbered(i));
        }
        // size-triggered flush holds the first ten
        started_rx.recv().await.unwrap();

        let destroying = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move { batcher.destroy().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!destroying.is_finished());

        transport.release.notify_one();
        started_rx.recv().await.unwrap();
        transport.release.notify_one();
        destroying.await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 12);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_stops_after_failed_send() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let batcher = EventBatcher::new(config(10, 100), transport.clone());
        batcher.add(numbered(1));
        batcher.add(numbered(2));

        batcher.destroy().await;
        assert!(transport.sent().is_empty());
        assert_eq!(batcher.len(), 2);
    }
}
