//! The broker seam.
//!
//! The fabric does not assume a specific wire protocol: it requires a
//! subject-based broker with core publish/subscribe, durable explicit-ack
//! consumers, request/reply, and a KV abstraction. Adapters implement
//! [`Broker`] and [`KvBucket`]; everything above the seam is broker-agnostic,
//! and tests inject an in-memory implementation.

use crate::error::FabricError;
use crate::topology::{ConsumerSpec, KvSpec, StreamSpec, TopologyOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Connection-lifecycle notifications surfaced to observers.
///
/// Emitted on a broadcast channel: slow listeners lag and drop, they never
/// block the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// An asynchronous broker error, e.g. a dropped connection.
    Error(String),
    /// The session closed and will not reconnect.
    Closed,
    /// A lost session was re-established.
    Reconnected,
}

/// One message delivered on an ephemeral subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Concrete subject the message arrived on.
    pub subject: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Reply inbox for request/reply traffic.
    pub reply: Option<String>,
}

/// Consumer verdict for one durable delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckVerdict {
    /// Processing succeeded; the broker forgets the message.
    Ack,
    /// Processing failed; the broker redelivers per the durable's policy.
    Nak,
}

/// One attempt at delivering a message to a durable consumer.
///
/// Dropping a delivery without a verdict counts as an ack timeout: the broker
/// redelivers after `ack_wait`, exactly as a crashed consumer would look.
#[derive(Debug)]
pub struct Delivery {
    /// Concrete subject the message was published on.
    pub subject: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// 1-based delivery attempt.
    pub attempt: u32,
    verdict: Option<oneshot::Sender<AckVerdict>>,
}

impl Delivery {
    /// Pair a delivery with the broker-side verdict receiver.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        payload: Vec<u8>,
        attempt: u32,
    ) -> (Self, oneshot::Receiver<AckVerdict>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                subject: subject.into(),
                payload,
                attempt,
                verdict: Some(tx),
            },
            rx,
        )
    }

    /// Acknowledge successful processing.
    pub fn ack(mut self) {
        if let Some(tx) = self.verdict.take() {
            let _ = tx.send(AckVerdict::Ack);
        }
    }

    /// Negatively acknowledge; the broker will redeliver.
    pub fn nak(mut self) {
        if let Some(tx) = self.verdict.take() {
            let _ = tx.send(AckVerdict::Nak);
        }
    }
}

/// Receiving end of an ephemeral subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Subject filter the subscription was created with.
    pub subject: String,
    rx: mpsc::Receiver<BrokerMessage>,
}

impl Subscription {
    /// Wrap a broker-side channel.
    #[must_use]
    pub fn new(subject: impl Into<String>, rx: mpsc::Receiver<BrokerMessage>) -> Self {
        Self {
            subject: subject.into(),
            rx,
        }
    }

    /// Next message, or `None` once the broker side closes.
    pub async fn recv(&mut self) -> Option<BrokerMessage> {
        self.rx.recv().await
    }
}

/// Receiving end of a durable push subscription.
#[derive(Debug)]
pub struct DurableSubscription {
    /// Durable name the subscription is bound to.
    pub durable: String,
    rx: mpsc::Receiver<Delivery>,
}

impl DurableSubscription {
    /// Wrap a broker-side channel.
    #[must_use]
    pub fn new(durable: impl Into<String>, rx: mpsc::Receiver<Delivery>) -> Self {
        Self {
            durable: durable.into(),
            rx,
        }
    }

    /// Next delivery, or `None` once the broker side closes.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// One revision observed on a KV watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Entry key.
    pub key: String,
    /// New value; `None` for deletions.
    pub value: Option<Vec<u8>>,
    /// Bucket-assigned revision.
    pub revision: u64,
}

/// A named key-value bucket layered on the broker.
#[async_trait]
pub trait KvBucket: Send + Sync {
    /// Store a value; returns the new revision.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, FabricError>;

    /// Fetch the latest value for a key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FabricError>;

    /// All live keys.
    async fn keys(&self) -> Result<Vec<String>, FabricError>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> Result<(), FabricError>;

    /// Watch keys matching a subject-style filter for changes.
    async fn watch(&self, key_filter: &str) -> Result<mpsc::Receiver<KvEntry>, FabricError>;
}

/// The broker feature set the fabric builds on.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish (or re-establish) the session.
    async fn connect(&self) -> Result<(), FabricError>;

    /// Whether a live session exists.
    fn is_connected(&self) -> bool;

    /// Best-effort core publish: fire and forget.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), FabricError>;

    /// Persistent, acknowledged publish into the covering stream. `msg_id`
    /// feeds the stream's duplicate window when present.
    async fn publish_persistent(
        &self,
        subject: &str,
        payload: Vec<u8>,
        msg_id: Option<&str>,
    ) -> Result<(), FabricError>;

    /// Ephemeral subscription on a subject filter.
    async fn subscribe(&self, subject: &str) -> Result<Subscription, FabricError>;

    /// Durable push subscription with explicit acknowledgment.
    async fn subscribe_durable(
        &self,
        spec: &ConsumerSpec,
    ) -> Result<DurableSubscription, FabricError>;

    /// Request/reply with a per-call timeout.
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, FabricError>;

    /// Create or update a stream to match its declaration.
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<TopologyOutcome, FabricError>;

    /// Create or update a durable consumer to match its declaration.
    async fn ensure_consumer(&self, spec: &ConsumerSpec) -> Result<TopologyOutcome, FabricError>;

    /// Open (or create) a KV bucket.
    async fn kv_bucket(&self, spec: &KvSpec) -> Result<Arc<dyn KvBucket>, FabricError>;

    /// Subscribe to connection-lifecycle events.
    fn events(&self) -> broadcast::Receiver<BrokerEvent>;

    /// Drain in-flight publishes and close the session. Idempotent.
    async fn close(&self);
}
