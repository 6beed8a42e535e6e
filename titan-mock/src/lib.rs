//! In-memory broker for CI-safe tests and examples.
//!
//! Implements the full `titan_core::Broker` seam: wildcard subject routing,
//! stream capture with duplicate windows, durable consumers with backoff
//! redelivery and overflow routing, request/reply, and KV buckets with
//! bounded history. All timing runs on tokio's clock, so tests may pause and
//! advance time.

mod kv;

pub use kv::MemoryKvBucket;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use titan_core::broker::{
    AckVerdict, Broker, BrokerEvent, BrokerMessage, Delivery, DurableSubscription, KvBucket,
    Subscription,
};
use titan_core::topology::{ConsumerSpec, KvSpec, StreamSpec, TopologyOutcome};
use titan_core::{FabricError, subject};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// One publish observed by the broker, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Target subject.
    pub subject: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Whether the publish was persistent (stream-captured, acked).
    pub persistent: bool,
    /// Deduplication id supplied by the publisher, if any.
    pub msg_id: Option<String>,
}

impl PublishRecord {
    /// Payload decoded as JSON, if it parses.
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

struct EphemeralSub {
    filter: String,
    tx: mpsc::Sender<BrokerMessage>,
}

struct StreamState {
    spec: StreamSpec,
    // msg_id -> expiry of its duplicate-window slot
    dedup: HashMap<String, tokio::time::Instant>,
}

struct ConsumerState {
    spec: ConsumerSpec,
    tx: Option<mpsc::Sender<Delivery>>,
    // retained while no subscription is attached
    pending: Vec<(String, Vec<u8>)>,
}

#[derive(Default)]
struct State {
    subs: Vec<EphemeralSub>,
    streams: HashMap<String, StreamState>,
    consumers: HashMap<String, ConsumerState>,
    kv: HashMap<String, Arc<MemoryKvBucket>>,
    fail_topology: Vec<String>,
}

struct Inner {
    connected: AtomicBool,
    fail_publishes: AtomicU32,
    events: broadcast::Sender<BrokerEvent>,
    state: Mutex<State>,
    published: Mutex<Vec<PublishRecord>>,
}

/// Deterministic in-memory broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Fresh broker with no topology; starts disconnected.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                connected: AtomicBool::new(false),
                fail_publishes: AtomicU32::new(0),
                events,
                state: Mutex::new(State::default()),
                published: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fresh broker that is already connected.
    #[must_use]
    pub fn connected() -> Self {
        let b = Self::new();
        b.inner.connected.store(true, Ordering::SeqCst);
        b
    }

    /// Every publish observed so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishRecord> {
        self.inner.published.lock().expect("published lock").clone()
    }

    /// Publishes whose subject matches a wildcard filter.
    #[must_use]
    pub fn published_to(&self, filter: &str) -> Vec<PublishRecord> {
        self.published()
            .into_iter()
            .filter(|r| subject::subject_matches(filter, &r.subject))
            .collect()
    }

    /// Forget observed publishes.
    pub fn clear_published(&self) {
        self.inner.published.lock().expect("published lock").clear();
    }

    /// Make the next `n` publish calls fail with a `Publish` error.
    pub fn fail_next_publishes(&self, n: u32) {
        self.inner.fail_publishes.store(n, Ordering::SeqCst);
    }

    /// Make `ensure_stream`/`ensure_consumer` fail for the named target.
    pub fn fail_topology_for(&self, target: &str) {
        self.lock_state().fail_topology.push(target.to_string());
    }

    /// Sever the session without closing: publishes start failing with
    /// `NotConnected` and an `Error` event is emitted.
    pub fn drop_connection(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        let _ = self
            .inner
            .events
            .send(BrokerEvent::Error("connection lost".to_string()));
    }

    /// Serve request/reply traffic on a subject: each message is passed to
    /// `handler`, and a `Some` result is published to the reply inbox. The
    /// subscription is registered before this returns, so a request issued
    /// immediately afterwards is answered.
    pub async fn serve_requests<F>(
        &self,
        subject_filter: &str,
        handler: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(&BrokerMessage) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let broker = self.clone();
        if !broker.is_connected() {
            let _ = broker.connect().await;
        }
        let mut sub = self
            .subscribe(subject_filter)
            .await
            .expect("responder subscription");
        tokio::spawn(async move {
            while let Some(msg) = sub.recv().await {
                if let (Some(reply), Some(body)) = (msg.reply.clone(), handler(&msg)) {
                    let _ = broker.publish(&reply, body).await;
                }
            }
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("state lock")
    }

    fn check_connected(&self) -> Result<(), FabricError> {
        if self.inner.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FabricError::NotConnected)
        }
    }

    fn take_publish_fault(&self, subj: &str) -> Result<(), FabricError> {
        let prev = self.inner.fail_publishes.load(Ordering::SeqCst);
        if prev > 0 {
            self.inner.fail_publishes.store(prev - 1, Ordering::SeqCst);
            return Err(FabricError::publish(subj, "injected publish failure"));
        }
        Ok(())
    }

    /// Route a message to ephemeral subscribers and durable consumers.
    fn route(&self, subj: &str, payload: &[u8], reply: Option<String>, persistent: bool) {
        let (eph, durables): (Vec<_>, Vec<_>) = {
            let mut state = self.lock_state();
            state.subs.retain(|s| !s.tx.is_closed());
            let eph: Vec<mpsc::Sender<BrokerMessage>> = state
                .subs
                .iter()
                .filter(|s| subject::subject_matches(&s.filter, subj))
                .map(|s| s.tx.clone())
                .collect();
            let mut durables = Vec::new();
            if persistent {
                for cs in state.consumers.values_mut() {
                    if subject::subject_matches(cs.spec.filter_subject, subj) {
                        match &cs.tx {
                            Some(tx) if !tx.is_closed() => {
                                durables.push((cs.spec.clone(), tx.clone()));
                            }
                            _ => cs.pending.push((subj.to_string(), payload.to_vec())),
                        }
                    }
                }
            }
            (eph, durables)
        };

        let msg = BrokerMessage {
            subject: subj.to_string(),
            payload: payload.to_vec(),
            reply,
        };
        for tx in eph {
            // Slow ephemeral subscribers drop; they never block the router.
            let _ = tx.try_send(msg.clone());
        }
        for (spec, tx) in durables {
            self.spawn_delivery(spec, tx, subj.to_string(), payload.to_vec());
        }
    }

    /// Drive one message through a durable's delivery/redelivery lifecycle.
    fn spawn_delivery(
        &self,
        spec: ConsumerSpec,
        tx: mpsc::Sender<Delivery>,
        subj: String,
        payload: Vec<u8>,
    ) {
        let broker = self.clone();
        tokio::spawn(async move {
            let max = spec.max_deliver.max(1);
            let mut attempt = 1u32;
            loop {
                let (delivery, verdict) = Delivery::new(subj.clone(), payload.clone(), attempt);
                if tx.send(delivery).await.is_err() {
                    return;
                }
                match tokio::time::timeout(spec.ack_wait, verdict).await {
                    Ok(Ok(AckVerdict::Ack)) => return,
                    // Nak, dropped delivery, and ack-wait expiry all redeliver.
                    Ok(Ok(AckVerdict::Nak)) | Ok(Err(_)) | Err(_) => {
                        if attempt >= max {
                            broker.publish_overflow(&spec, &subj, &payload, attempt);
                            return;
                        }
                        tokio::time::sleep(spec.redelivery_delay(attempt)).await;
                        attempt += 1;
                    }
                }
            }
        });
    }

    /// Advisory written once a durable exhausts `max_deliver`.
    fn publish_overflow(&self, spec: &ConsumerSpec, subj: &str, payload: &[u8], deliveries: u32) {
        let overflow = subject::dlq::overflow(spec.durable);
        let advisory = serde_json::json!({
            "stream": spec.stream,
            "durable": spec.durable,
            "subject": subj,
            "deliveries": deliveries,
            "payload": String::from_utf8_lossy(payload),
        });
        let body = advisory.to_string().into_bytes();
        tracing::warn!(durable = spec.durable, subject = subj, "max_deliver exhausted");
        self.inner
            .published
            .lock()
            .expect("published lock")
            .push(PublishRecord {
                subject: overflow.clone(),
                payload: body.clone(),
                persistent: true,
                msg_id: None,
            });
        // The advisory is itself stream-captured so the DLQ monitor sees it.
        self.route(&overflow, &body, None, true);
    }

    fn record(&self, subj: &str, payload: &[u8], persistent: bool, msg_id: Option<&str>) {
        self.inner
            .published
            .lock()
            .expect("published lock")
            .push(PublishRecord {
                subject: subj.to_string(),
                payload: payload.to_vec(),
                persistent,
                msg_id: msg_id.map(str::to_string),
            });
    }

    /// Duplicate-window check; returns true when the publish is a duplicate
    /// and must be suppressed.
    fn is_duplicate(&self, subj: &str, msg_id: Option<&str>) -> bool {
        let Some(id) = msg_id else { return false };
        let now = tokio::time::Instant::now();
        let mut state = self.lock_state();
        let Some(stream) = state
            .streams
            .values_mut()
            .find(|s| s.spec.covers(subj) && s.spec.duplicate_window.is_some())
        else {
            return false;
        };
        let window = stream.spec.duplicate_window.unwrap_or(Duration::ZERO);
        stream.dedup.retain(|_, expiry| *expiry > now);
        if stream.dedup.contains_key(id) {
            return true;
        }
        stream.dedup.insert(id.to_string(), now + window);
        false
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<(), FabricError> {
        let was = self.inner.connected.swap(true, Ordering::SeqCst);
        if was {
            let _ = self.inner.events.send(BrokerEvent::Reconnected);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, subj: &str, payload: Vec<u8>) -> Result<(), FabricError> {
        self.check_connected()?;
        self.take_publish_fault(subj)?;
        self.record(subj, &payload, false, None);
        self.route(subj, &payload, None, false);
        Ok(())
    }

    async fn publish_persistent(
        &self,
        subj: &str,
        payload: Vec<u8>,
        msg_id: Option<&str>,
    ) -> Result<(), FabricError> {
        self.check_connected()?;
        self.take_publish_fault(subj)?;
        if self.is_duplicate(subj, msg_id) {
            return Ok(());
        }
        self.record(subj, &payload, true, msg_id);
        self.route(subj, &payload, None, true);
        Ok(())
    }

    async fn subscribe(&self, subj: &str) -> Result<Subscription, FabricError> {
        self.check_connected()?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.lock_state().subs.push(EphemeralSub {
            filter: subj.to_string(),
            tx,
        });
        Ok(Subscription::new(subj, rx))
    }

    async fn subscribe_durable(
        &self,
        spec: &ConsumerSpec,
    ) -> Result<DurableSubscription, FabricError> {
        self.check_connected()?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let backlog = {
            let mut state = self.lock_state();
            let cs = state
                .consumers
                .entry(spec.durable.to_string())
                .or_insert_with(|| ConsumerState {
                    spec: spec.clone(),
                    tx: None,
                    pending: Vec::new(),
                });
            cs.spec = spec.clone();
            cs.tx = Some(tx.clone());
            std::mem::take(&mut cs.pending)
        };
        for (subj, payload) in backlog {
            self.spawn_delivery(spec.clone(), tx.clone(), subj, payload);
        }
        Ok(DurableSubscription::new(spec.durable, rx))
    }

    async fn request(
        &self,
        subj: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, FabricError> {
        self.check_connected()?;
        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let mut sub = self.subscribe(&inbox).await?;
        self.take_publish_fault(subj)?;
        self.record(subj, &payload, false, None);
        self.route(subj, &payload, Some(inbox), false);
        match tokio::time::timeout(timeout, sub.recv()).await {
            Ok(Some(msg)) => Ok(msg.payload),
            Ok(None) | Err(_) => Err(FabricError::RequestTimeout {
                subject: subj.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<TopologyOutcome, FabricError> {
        self.check_connected()?;
        let mut state = self.lock_state();
        if state.fail_topology.iter().any(|t| t == spec.name) {
            return Err(FabricError::topology(spec.name, "injected topology failure"));
        }
        match state.streams.get_mut(spec.name) {
            None => {
                state.streams.insert(
                    spec.name.to_string(),
                    StreamState {
                        spec: spec.clone(),
                        dedup: HashMap::new(),
                    },
                );
                Ok(TopologyOutcome::Created)
            }
            Some(existing) if existing.spec == *spec => Ok(TopologyOutcome::Unchanged),
            Some(existing) => {
                existing.spec = spec.clone();
                Ok(TopologyOutcome::Updated)
            }
        }
    }

    async fn ensure_consumer(&self, spec: &ConsumerSpec) -> Result<TopologyOutcome, FabricError> {
        self.check_connected()?;
        let mut state = self.lock_state();
        if state.fail_topology.iter().any(|t| t == spec.durable) {
            return Err(FabricError::topology(
                spec.durable,
                "injected topology failure",
            ));
        }
        match state.consumers.get_mut(spec.durable) {
            None => {
                state.consumers.insert(
                    spec.durable.to_string(),
                    ConsumerState {
                        spec: spec.clone(),
                        tx: None,
                        pending: Vec::new(),
                    },
                );
                Ok(TopologyOutcome::Created)
            }
            Some(existing) if existing.spec == *spec => Ok(TopologyOutcome::Unchanged),
            Some(existing) => {
                existing.spec = spec.clone();
                Ok(TopologyOutcome::Updated)
            }
        }
    }

    async fn kv_bucket(&self, spec: &KvSpec) -> Result<Arc<dyn KvBucket>, FabricError> {
        self.check_connected()?;
        let mut state = self.lock_state();
        let bucket = state
            .kv
            .entry(spec.bucket.clone())
            .or_insert_with(|| Arc::new(MemoryKvBucket::new(spec.history, spec.ttl)))
            .clone();
        Ok(bucket)
    }

    fn events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.inner.events.subscribe()
    }

    async fn close(&self) {
        let was = self.inner.connected.swap(false, Ordering::SeqCst);
        if was {
            let _ = self.inner.events.send(BrokerEvent::Closed);
        }
        let mut state = self.lock_state();
        state.subs.clear();
        for cs in state.consumers.values_mut() {
            cs.tx = None;
        }
    }
}
