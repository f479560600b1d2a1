//! Live subscriber registry and upstream relay
//!
//! ```text
//! Idle ──add_subscriber (first)──► Active ──last subscriber removed──► Idle
//!           spawn upstream task               cancel upstream task
//! ```
//!
//! The upstream task subscribes to the cost-update topic, relays each parsed
//! message to every subscriber and sends a keepalive on a fixed interval. It
//! runs if and only if the subscriber set is non-empty. Leaving idle, the topic
//! subscription is opened before the snapshot is read and handed to the task,
//! so an update published after the snapshot always reaches the subscriber.
//!
//! A subscriber is a bounded channel. Writes use `try_send`, so a closed or
//! full channel is a failed write and the subscriber is removed. Removal is
//! idempotent: a write failure and a disconnect may race for the same id.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use chrono::Utc;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::message::{Snapshot, StreamMessage};
use super::{BroadcastConfig, BroadcastError};
use crate::data::counters::{CounterService, CounterTotals};
use crate::data::topics::{BroadcastSubscription, COST_UPDATES_TOPIC, TopicError, TopicService};

/// One frame written to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Serialized [`StreamMessage`]
    Message(Arc<str>),
    /// No-op frame that keeps intermediaries from timing the connection out
    Keepalive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastState {
    Idle,
    Active,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<u64, mpsc::Sender<StreamFrame>>,
    /// Present exactly while the upstream task runs
    upstream: Option<CancellationToken>,
}

struct Inner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    counters: Arc<CounterService>,
    topics: Arc<TopicService>,
    config: BroadcastConfig,
}

/// Fan-out of cost updates to live stream subscribers
#[derive(Clone)]
pub struct BroadcastManager {
    inner: Arc<Inner>,
}

impl BroadcastManager {
    pub fn new(
        counters: Arc<CounterService>,
        topics: Arc<TopicService>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
                counters,
                topics,
                config,
            }),
        }
    }

    pub fn state(&self) -> BroadcastState {
        if self.inner.registry.lock().upstream.is_some() {
            BroadcastState::Active
        } else {
            BroadcastState::Idle
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().subscribers.len()
    }

    pub fn max_subscribers(&self) -> usize {
        self.inner.config.max_subscribers
    }

    /// Register a new subscriber
    ///
    /// The snapshot frame is queued before the subscriber becomes visible to
    /// broadcasts, so it is always the first frame received.
    pub async fn add_subscriber(&self) -> Result<Subscription, BroadcastError> {
        let max = self.inner.config.max_subscribers;
        if self.subscriber_count() >= max {
            tracing::warn!(max_subscribers = max, "Stream subscriber limit reached");
            return Err(BroadcastError::Capacity { max });
        }

        // Opened before the totals read, so no update falls between the two
        let mut opened = None;
        if self.state() == BroadcastState::Idle {
            match self.inner.topics.subscribe(COST_UPDATES_TOPIC).await {
                Ok(subscription) => opened = Some(subscription),
                Err(e) => tracing::error!(error = %e, "Failed to subscribe to cost updates"),
            }
        }

        let totals = match self.inner.counters.totals().await {
            Ok(totals) => totals,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read totals for snapshot");
                CounterTotals::default()
            }
        };
        let snapshot = StreamMessage::Snapshot(Snapshot::from_totals(&totals, Utc::now()));
        let snapshot = snapshot.to_json().map_err(BroadcastError::Serialization)?;

        let (tx, rx) = mpsc::channel(self.inner.config.subscriber_buffer.max(1));
        // Fresh channel with capacity >= 1 always has room
        let _ = tx.try_send(StreamFrame::Message(snapshot.into()));

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = {
            let mut registry = self.inner.registry.lock();
            if registry.subscribers.len() >= max {
                return Err(BroadcastError::Capacity { max });
            }
            registry.subscribers.insert(id, tx);
            if registry.upstream.is_none() {
                let token = CancellationToken::new();
                registry.upstream = Some(token.clone());
                tokio::spawn(run_upstream(
                    Arc::clone(&self.inner),
                    token,
                    opened.take(),
                ));
                tracing::debug!("Broadcast manager active");
            }
            registry.subscribers.len()
        };

        tracing::info!(active_subscribers = active, "Stream subscriber connected");

        Ok(Subscription {
            id,
            receiver: rx,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Close every subscriber stream and stop the upstream task
    pub fn shutdown(&self) {
        let mut registry = self.inner.registry.lock();
        let closed = registry.subscribers.len();
        registry.subscribers.clear();
        if let Some(token) = registry.upstream.take() {
            token.cancel();
        }
        if closed > 0 {
            tracing::debug!(closed, "Closed stream subscribers on shutdown");
        }
    }
}

impl Inner {
    fn remove(&self, id: u64) {
        let mut registry = self.registry.lock();
        if registry.subscribers.remove(&id).is_none() {
            return;
        }
        let active = registry.subscribers.len();
        Self::stop_if_empty(&mut registry);
        drop(registry);
        tracing::info!(active_subscribers = active, "Stream subscriber disconnected");
    }

    /// Write a frame to every subscriber, dropping those whose write fails
    fn broadcast(&self, frame: StreamFrame) {
        let mut registry = self.registry.lock();
        let dead: Vec<u64> = registry
            .subscribers
            .iter()
            .filter(|(_, tx)| tx.try_send(frame.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();

        if dead.is_empty() {
            return;
        }
        for id in &dead {
            registry.subscribers.remove(id);
        }
        let active = registry.subscribers.len();
        Self::stop_if_empty(&mut registry);
        drop(registry);
        tracing::info!(
            removed = dead.len(),
            active_subscribers = active,
            "Removed dead stream subscribers"
        );
    }

    fn stop_if_empty(registry: &mut Registry) {
        if registry.subscribers.is_empty()
            && let Some(token) = registry.upstream.take()
        {
            token.cancel();
            tracing::debug!("Broadcast manager idle");
        }
    }

    fn relay(&self, payload: &[u8]) {
        let message: StreamMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed cost update");
                return;
            }
        };
        match message.to_json() {
            Ok(json) => self.broadcast(StreamFrame::Message(json.into())),
            Err(e) => tracing::error!(error = %e, "Failed to serialize cost update"),
        }
    }
}

/// Upstream subscription and heartbeat, until `token` is cancelled
///
/// `initial` is a subscription opened by the caller; the task opens its own
/// when it is absent or after the current one fails.
async fn run_upstream(
    inner: Arc<Inner>,
    token: CancellationToken,
    mut initial: Option<BroadcastSubscription>,
) {
    let period = inner.config.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'outer: loop {
        let subscribed = match initial.take() {
            Some(subscription) => Ok(subscription),
            None => tokio::select! {
                biased;
                _ = token.cancelled() => break 'outer,
                result = inner.topics.subscribe(COST_UPDATES_TOPIC) => result,
            },
        };

        match subscribed {
            Ok(mut subscription) => {
                tracing::debug!(topic = COST_UPDATES_TOPIC, "Subscribed to cost updates");
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break 'outer,
                        _ = heartbeat.tick() => inner.broadcast(StreamFrame::Keepalive),
                        next = subscription.receiver.next() => match next {
                            Some(Ok(payload)) => inner.relay(&payload),
                            Some(Err(TopicError::Lagged(n))) => {
                                tracing::warn!(lagged = n, "Cost update subscriber lagged behind");
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Cost update subscription failed");
                                break;
                            }
                            None => {
                                tracing::warn!("Cost update subscription ended");
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to subscribe to cost updates");
            }
        }

        let resubscribe = tokio::time::sleep(inner.config.resubscribe_delay);
        tokio::pin!(resubscribe);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break 'outer,
                _ = heartbeat.tick() => inner.broadcast(StreamFrame::Keepalive),
                _ = &mut resubscribe => break,
            }
        }
    }

    tracing::debug!(topic = COST_UPDATES_TOPIC, "Unsubscribed from cost updates");
}

/// A live subscriber's frame stream
///
/// Dropping it is the disconnect signal.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<StreamFrame>,
    inner: Arc<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Stream for Subscription {
    type Item = StreamFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.remove(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
