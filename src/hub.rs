//! Fan-out of live events to subscribed clients.
//!
//! Each subscription owns a bounded channel. Publishing waits briefly for a
//! slow consumer, then gives up on that subscription and removes it, so one
//! stalled client can never wedge the pipeline or the other clients.

use crate::defaults;
use crate::timeline::Segment;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Status condition carried by a [`Event::Status`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Recording,
    Stopped,
    BackpressureDrop,
    EngineError,
    InvalidFrame,
}

/// Event delivered to broadcast subscribers.
///
/// Serializes with a `type` tag so wire clients can dispatch on it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new finalized subtitle segment.
    Transcription { segment: Segment },
    /// A pipeline status change or degradation notice.
    Status { kind: StatusKind, message: String },
    /// The timeline was cleared; clients should drop displayed subtitles.
    Clear,
    /// Keepalive reply to a client ping.
    Pong,
}

impl Event {
    pub fn status(kind: StatusKind, message: impl Into<String>) -> Self {
        Event::Status {
            kind,
            message: message.into(),
        }
    }
}

/// A client's half of a hub subscription.
pub struct Subscription {
    id: u64,
    rx: Receiver<Event>,
    connected_at: std::time::Instant,
}

impl Subscription {
    /// Hub-assigned subscription id, for `unsubscribe` and `pong`.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When this subscription was registered.
    pub fn connected_at(&self) -> std::time::Instant {
        self.connected_at
    }

    /// Receiver to drain events from.
    pub fn receiver(&self) -> &Receiver<Event> {
        &self.rx
    }

    /// Blocks up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Broadcast hub. Cheap to share behind an `Arc`.
pub struct LiveBroadcastHub {
    subscribers: Mutex<HashMap<u64, Sender<Event>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    publish_timeout: Duration,
}

impl LiveBroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(defaults::SUBSCRIPTION_QUEUE_CAPACITY)
    }

    /// Creates a hub whose per-subscription queues hold `queue_capacity`
    /// events.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            publish_timeout: Duration::from_millis(defaults::PUBLISH_TIMEOUT_MS),
        }
    }

    /// Registers a new subscriber and returns its subscription.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = bounded(self.queue_capacity);
        self.lock().insert(id, tx);
        Subscription {
            id,
            rx,
            connected_at: std::time::Instant::now(),
        }
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Delivers an event to every subscriber.
    ///
    /// A first `try_send` pass keeps the common path wait-free. Subscribers
    /// whose queue was full get one more attempt against a single shared
    /// deadline, so the total wait is bounded by one publish timeout no
    /// matter how many of them are stalled. A subscriber still full at the
    /// deadline, or whose receiver is gone, is dropped from the hub. Returns
    /// how many subscribers received the event.
    pub fn publish(&self, event: &Event) -> usize {
        let mut subscribers = self.lock();
        let mut dead = Vec::new();
        let mut slow = Vec::new();
        let mut delivered = 0;

        for (&id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => slow.push(id),
                Err(TrySendError::Disconnected(_)) => dead.push(id),
            }
        }

        if !slow.is_empty() {
            let deadline = Instant::now() + self.publish_timeout;
            for id in slow {
                let Some(tx) = subscribers.get(&id) else {
                    continue;
                };
                match tx.send_deadline(event.clone(), deadline) {
                    Ok(()) => delivered += 1,
                    Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Disconnected(_)) => {
                        dead.push(id);
                    }
                }
            }
        }

        for id in dead {
            subscribers.remove(&id);
        }
        delivered
    }

    /// Sends a keepalive `Pong` to a single subscriber.
    ///
    /// Returns false if the subscription is unknown or its queue is wedged.
    pub fn pong(&self, id: u64) -> bool {
        let subscribers = self.lock();
        let Some(tx) = subscribers.get(&id) else {
            return false;
        };
        tx.send_timeout(Event::Pong, self.publish_timeout).is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Sender<Event>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LiveBroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
