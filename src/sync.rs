//! # Sync: Per-Topic Broadcast Hubs
//!
//! One hub task per [`Topic`] owns the set of connected websocket clients.
//! All registry changes and broadcasts arrive on a single control channel,
//! so they are applied strictly one at a time, and messages sent on a topic
//! reach every connection in send order.
//!
//! ## Back-pressure
//!
//! Each connection has a bounded outbound queue (256 by default). The hub
//! never waits on a client: an enqueue that would block, or a queue whose
//! reader has gone away, drops that connection and unregisters it. Other
//! connections still receive the message.
//!
//! ## Ownership
//!
//! Hubs are created by [`HubRegistry::new`] in the composition root and
//! handed to whoever needs them. There is no global hub.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::events::SyncEvent;
use crate::prom_metrics::{Metrics, TopicLabel};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Control channel depth. Callers wait for hub acceptance, so this only
/// bounds how many callers can be queued at once.
const CONTROL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Habits,
    Journal,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::Habits, Topic::Journal];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Habits => "habits",
            Topic::Journal => "journal",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Topic {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "habits" => Ok(Topic::Habits),
            "journal" => Ok(Topic::Journal),
            other => Err(SyncError::UnknownTopic(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0} hub has shut down")]
    HubClosed(Topic),
    #[error("{event} belongs to {expected}, not {hub}")]
    WrongTopic {
        event: &'static str,
        expected: Topic,
        hub: Topic,
    },
    #[error("unknown topic {0:?}")]
    UnknownTopic(String),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOut {
    pub attempted: usize,
    pub delivered: usize,
    pub dropped: usize,
}

pub type ConnectionId = u64;

/// A registered connection's end of its outbound queue.
#[derive(Debug)]
pub struct Subscription {
    pub id: ConnectionId,
    pub outbound: mpsc::Receiver<Arc<str>>,
}

enum Control {
    Register {
        outbound: mpsc::Sender<Arc<str>>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Unregister {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        message: Arc<str>,
        reply: oneshot::Sender<FanOut>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to a running hub. Cheap to clone; the hub task exits once every
/// handle is dropped.
#[derive(Clone)]
pub struct SyncHub {
    topic: Topic,
    capacity: usize,
    control: mpsc::Sender<Control>,
}

impl SyncHub {
    /// Start the hub task for `topic`. Must be called inside a Tokio runtime.
    pub fn spawn(topic: Topic, capacity: usize, metrics: Arc<Metrics>) -> Self {
        let (control, rx) = mpsc::channel(CONTROL_CAPACITY);
        tokio::spawn(run_hub(topic, rx, metrics));
        SyncHub {
            topic,
            capacity: capacity.max(1),
            control,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(build(tx))
            .await
            .map_err(|_| SyncError::HubClosed(self.topic))?;
        rx.await.map_err(|_| SyncError::HubClosed(self.topic))
    }

    /// Register an existing outbound queue. Returns once the hub has accepted it.
    pub async fn register(&self, outbound: mpsc::Sender<Arc<str>>) -> Result<ConnectionId, SyncError> {
        self.request(|reply| Control::Register { outbound, reply }).await
    }

    /// Create a queue of the hub's capacity and register it.
    pub async fn subscribe(&self) -> Result<Subscription, SyncError> {
        let (tx, outbound) = mpsc::channel(self.capacity);
        let id = self.register(tx).await?;
        Ok(Subscription { id, outbound })
    }

    /// Remove a connection. Returns whether it was still registered.
    pub async fn unregister(&self, id: ConnectionId) -> Result<bool, SyncError> {
        self.request(|reply| Control::Unregister { id, reply }).await
    }

    /// Fan a pre-serialized message out to every connection.
    pub async fn broadcast(&self, message: Arc<str>) -> Result<FanOut, SyncError> {
        self.request(|reply| Control::Broadcast { message, reply }).await
    }

    /// Serialize `event` once and broadcast it.
    pub async fn send(&self, event: &SyncEvent) -> Result<FanOut, SyncError> {
        if event.topic() != self.topic {
            return Err(SyncError::WrongTopic {
                event: event.kind(),
                expected: event.topic(),
                hub: self.topic,
            });
        }
        let frame: Arc<str> = serde_json::to_string(event)?.into();
        self.broadcast(frame).await
    }

    pub async fn subscriber_count(&self) -> Result<usize, SyncError> {
        self.request(|reply| Control::Count { reply }).await
    }
}

async fn run_hub(topic: Topic, mut rx: mpsc::Receiver<Control>, metrics: Arc<Metrics>) {
    let label = TopicLabel::new(topic);
    let mut connections: BTreeMap<ConnectionId, mpsc::Sender<Arc<str>>> = BTreeMap::new();
    let mut next_id: ConnectionId = 1;

    info!(topic = %topic, "sync hub started");
    while let Some(control) = rx.recv().await {
        match control {
            Control::Register { outbound, reply } => {
                let id = next_id;
                next_id += 1;
                connections.insert(id, outbound);
                metrics
                    .sync_subscribers
                    .get_or_create(&label)
                    .set(connections.len() as i64);
                debug!(topic = %topic, connection = id, subscribers = connections.len(), "connection registered");
                let _ = reply.send(id);
            }
            Control::Unregister { id, reply } => {
                let removed = connections.remove(&id).is_some();
                metrics
                    .sync_subscribers
                    .get_or_create(&label)
                    .set(connections.len() as i64);
                if removed {
                    debug!(topic = %topic, connection = id, subscribers = connections.len(), "connection unregistered");
                }
                let _ = reply.send(removed);
            }
            Control::Broadcast { message, reply } => {
                let fan_out = fan_out(topic, &mut connections, &message);
                metrics.sync_messages.get_or_create(&label).inc();
                if fan_out.dropped > 0 {
                    metrics
                        .sync_dropped_subscribers
                        .get_or_create(&label)
                        .inc_by(fan_out.dropped as u64);
                    metrics
                        .sync_subscribers
                        .get_or_create(&label)
                        .set(connections.len() as i64);
                }
                let _ = reply.send(fan_out);
            }
            Control::Count { reply } => {
                let _ = reply.send(connections.len());
            }
        }
    }
    info!(topic = %topic, "sync hub stopped");
}

fn fan_out(
    topic: Topic,
    connections: &mut BTreeMap<ConnectionId, mpsc::Sender<Arc<str>>>,
    message: &Arc<str>,
) -> FanOut {
    let mut result = FanOut {
        attempted: connections.len(),
        ..FanOut::default()
    };
    connections.retain(|id, outbound| match outbound.try_send(Arc::clone(message)) {
        Ok(()) => {
            result.delivered += 1;
            true
        }
        Err(e) => {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "queue closed",
            };
            warn!(topic = %topic, connection = *id, reason, "dropping sync connection");
            result.dropped += 1;
            false
        }
    });
    result
}

/// The hubs of every topic, created together.
#[derive(Clone)]
pub struct HubRegistry {
    habits: SyncHub,
    journal: SyncHub,
}

impl HubRegistry {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        HubRegistry {
            habits: SyncHub::spawn(Topic::Habits, capacity, Arc::clone(&metrics)),
            journal: SyncHub::spawn(Topic::Journal, capacity, metrics),
        }
    }

    pub fn hub(&self, topic: Topic) -> &SyncHub {
        match topic {
            Topic::Habits => &self.habits,
            Topic::Journal => &self.journal,
        }
    }

    /// Route `event` to the hub of its topic.
    pub async fn send(&self, event: &SyncEvent) -> Result<FanOut, SyncError> {
        self.hub(event.topic()).send(event).await
    }
}
