//! The process-wide broker client.
//!
//! Wraps an injected [`Broker`] implementation with topology bootstrap,
//! envelope signing, publish routing, subscription pumps, dead-letter
//! publication, and a write-through KV handle cache.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;
use titan_core::broker::{Broker, BrokerEvent, KvBucket, KvEntry};
use titan_core::topology::{self, ConsumerSpec, KvSpec, TopologyReport};
use titan_core::{EnvelopeBuilder, FabricError, PumpHandle, Signer, now_ms, subject};
use titan_types::{DeadLetter, Envelope};
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};

/// Default request/reply timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Connection parameters, normally sourced from the environment with
/// caller-supplied overrides.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Broker URL.
    pub url: String,
    /// Username, when the broker uses user/pass auth.
    pub user: Option<String>,
    /// Password, when the broker uses user/pass auth.
    pub password: Option<String>,
    /// Token, when the broker uses token auth.
    pub token: Option<String>,
    /// HMAC signing secret; signing is active iff present.
    pub signing_secret: Option<String>,
    /// Key-rotation slot stamped onto signed envelopes.
    pub signing_key_id: String,
    /// Deployment environment tag (selects the config overlay).
    pub environment: String,
    /// Component name stamped as the envelope producer and DLQ service.
    pub service: String,
    /// Keep retrying the first connect instead of failing fast.
    pub wait_first_connect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            user: None,
            password: None,
            token: None,
            signing_secret: None,
            signing_key_id: "k1".to_string(),
            environment: "development".to_string(),
            service: "titan".to_string(),
            wait_first_connect: false,
        }
    }
}

impl ConnectOptions {
    /// Read options from `TITAN_*` environment variables, falling back to
    /// defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let defaults = Self::default();
        Self {
            url: var("TITAN_BROKER_URL").unwrap_or(defaults.url),
            user: var("TITAN_BROKER_USER"),
            password: var("TITAN_BROKER_PASS"),
            token: var("TITAN_BROKER_TOKEN"),
            signing_secret: var("TITAN_SIGNING_SECRET"),
            signing_key_id: var("TITAN_SIGNING_KEY_ID").unwrap_or(defaults.signing_key_id),
            environment: var("TITAN_ENV").unwrap_or(defaults.environment),
            service: defaults.service,
            wait_first_connect: false,
        }
    }

    /// Override the component name.
    #[must_use]
    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.service = name.into();
        self
    }

    /// Override the signing secret.
    #[must_use]
    pub fn signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }
}

/// Best-effort decoded payload: JSON first, string fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Payload parsed as JSON.
    Json(Value),
    /// Payload was not JSON; delivered as (lossy) UTF-8 text.
    Text(String),
}

impl Decoded {
    fn from_bytes(payload: &[u8]) -> Self {
        serde_json::from_slice(payload).map_or_else(
            |_| Self::Text(String::from_utf8_lossy(payload).into_owned()),
            Self::Json,
        )
    }

    /// The JSON value, if the payload parsed as JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

/// One decoded message handed to a subscription callback.
#[derive(Debug, Clone)]
pub struct FabricMessage {
    /// Concrete subject the message arrived on.
    pub subject: String,
    /// Reply inbox for request/reply traffic.
    pub reply: Option<String>,
    /// Decoded payload.
    pub body: Decoded,
    /// Delivery attempt; 1 for ephemeral subscriptions.
    pub attempt: u32,
}

/// Subscription callback. A returned error is logged (ephemeral) or turned
/// into a negative acknowledgment (durable); it never tears the pump down.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message.
    async fn handle(&self, msg: FabricMessage) -> Result<(), FabricError>;
}

/// The fabric's broker client.
///
/// One instance per process is the norm (see [`install`]/[`instance`]); the
/// broker itself is injected, so tests run against an in-memory
/// implementation.
pub struct FabricClient {
    broker: Arc<dyn Broker>,
    signer: Option<Signer>,
    options: ConnectOptions,
    kv_cache: Mutex<HashMap<String, Arc<dyn KvBucket>>>,
    reconciliation_errors: AtomicU64,
    closed: AtomicBool,
}

impl FabricClient {
    /// Connect and bootstrap the declared topology.
    ///
    /// With `wait_first_connect`, connect attempts repeat until one succeeds.
    /// Topology reconciliation failures are logged and counted; they never
    /// abort start-up.
    ///
    /// # Errors
    /// Transport errors from the first connect attempt when
    /// `wait_first_connect` is off.
    pub async fn connect(
        broker: Arc<dyn Broker>,
        options: ConnectOptions,
    ) -> Result<Arc<Self>, FabricError> {
        loop {
            match broker.connect().await {
                Ok(()) => break,
                Err(e) if options.wait_first_connect => {
                    warn!(url = %options.url, error = %e, "connect failed; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }

        let signer = options
            .signing_secret
            .as_ref()
            .map(|secret| Signer::new(secret.as_bytes().to_vec(), options.signing_key_id.clone()));
        let client = Arc::new(Self {
            broker,
            signer,
            options,
            kv_cache: Mutex::new(HashMap::new()),
            reconciliation_errors: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let report = client.reconcile_topology().await;
        info!(
            service = %client.options.service,
            streams_created = report.streams_created,
            consumers_created = report.consumers_created,
            errors = report.errors,
            "fabric client connected"
        );
        Ok(client)
    }

    /// Walk the declared topology and ensure it exists on the broker.
    ///
    /// Create/update failures are logged, folded into the report, and added
    /// to the process-lifetime [`reconciliation_errors`](Self::reconciliation_errors)
    /// counter.
    pub async fn reconcile_topology(&self) -> TopologyReport {
        let mut report = TopologyReport::default();
        for spec in topology::streams() {
            match self.broker.ensure_stream(&spec).await {
                Ok(outcome) => report.record_stream(outcome),
                Err(e) => {
                    warn!(stream = spec.name, error = %e, "stream reconciliation failed; continuing");
                    report.errors += 1;
                }
            }
        }
        for spec in topology::consumers() {
            match self.broker.ensure_consumer(&spec).await {
                Ok(outcome) => report.record_consumer(outcome),
                Err(e) => {
                    warn!(durable = spec.durable, error = %e, "consumer reconciliation failed; continuing");
                    report.errors += 1;
                }
            }
        }
        self.reconciliation_errors
            .fetch_add(u64::from(report.errors), Ordering::SeqCst);
        report
    }

    /// Total topology reconciliation failures observed by this client.
    #[must_use]
    pub fn reconciliation_errors(&self) -> u64 {
        self.reconciliation_errors.load(Ordering::SeqCst)
    }

    /// Whether a live broker session exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.broker.is_connected()
    }

    /// Component name used for envelopes and dead letters.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.options.service
    }

    /// The signer, when signing is configured.
    #[must_use]
    pub const fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    /// The injected broker, for components layering on the same session.
    #[must_use]
    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(&self.broker)
    }

    /// Subscribe to connection-lifecycle events (`error`, `closed`, ...).
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.broker.events()
    }

    fn ensure_session(&self) -> Result<(), FabricError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(FabricError::NotConnected)
        }
    }

    async fn publish_bytes(
        &self,
        subj: &str,
        bytes: Vec<u8>,
        msg_id: Option<&str>,
    ) -> Result<(), FabricError> {
        self.ensure_session()?;
        if topology::stream_for_subject(subj).is_some() {
            self.broker.publish_persistent(subj, bytes, msg_id).await
        } else {
            self.broker.publish(subj, bytes).await
        }
    }

    /// Publish a JSON payload. Routed persistently when a declared stream
    /// covers the subject, best-effort otherwise.
    ///
    /// # Errors
    /// `NotConnected` without a session; broker errors otherwise.
    pub async fn publish_value(&self, subj: &str, payload: &Value) -> Result<(), FabricError> {
        self.publish_bytes(subj, serde_json::to_vec(payload)?, None)
            .await
    }

    /// Publish a payload that is already a string, verbatim.
    ///
    /// # Errors
    /// As [`publish_value`](Self::publish_value).
    pub async fn publish_text(&self, subj: &str, payload: &str) -> Result<(), FabricError> {
        self.publish_bytes(subj, payload.as_bytes().to_vec(), None)
            .await
    }

    /// Wrap a payload in an envelope, sign it when signing is configured,
    /// and publish it. The envelope's idempotency key doubles as the
    /// stream-level deduplication id.
    ///
    /// # Errors
    /// `NotConnected`, signing failures, or broker publish errors.
    pub async fn publish_envelope(
        &self,
        subj: &str,
        builder: EnvelopeBuilder,
        payload: Value,
    ) -> Result<Envelope, FabricError> {
        self.ensure_session()?;
        let mut envelope = builder.build(subj, payload);
        if let Some(signer) = &self.signer {
            signer.sign(&mut envelope)?;
        }
        let bytes = serde_json::to_vec(&envelope)?;
        let msg_id = envelope.idempotency_key.clone();
        self.publish_bytes(subj, bytes, msg_id.as_deref()).await?;
        Ok(envelope)
    }

    /// Ephemeral subscription: messages are decoded best-effort and handed
    /// to `handler` on a dedicated pump task, one at a time in arrival order.
    /// Handler errors are logged and skipped.
    ///
    /// # Errors
    /// `NotConnected` or broker subscription failures.
    pub async fn subscribe_with(
        &self,
        subj: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<PumpHandle, FabricError> {
        self.ensure_session()?;
        let mut sub = self.broker.subscribe(subj).await?;
        let label = subj.to_string();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    next = sub.recv() => {
                        let Some(msg) = next else { break };
                        let fabric_msg = FabricMessage {
                            subject: msg.subject.clone(),
                            reply: msg.reply.clone(),
                            body: Decoded::from_bytes(&msg.payload),
                            attempt: 1,
                        };
                        if let Err(e) = handler.handle(fabric_msg).await {
                            warn!(subject = %msg.subject, error = %e, "subscription callback failed");
                        }
                    }
                }
            }
            debug!(subject = %label, "subscription pump finished");
        });
        Ok(PumpHandle::new(task, stop_tx))
    }

    /// Durable push subscription: each delivery is decoded and handed to
    /// `handler`; success acks, failure naks and the broker redelivers per
    /// the durable's backoff policy.
    ///
    /// # Errors
    /// `NotConnected` or broker subscription failures.
    pub async fn subscribe_durable_with(
        &self,
        spec: &ConsumerSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<PumpHandle, FabricError> {
        self.ensure_session()?;
        let mut sub = self.broker.subscribe_durable(spec).await?;
        let durable = spec.durable.to_string();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    next = sub.recv() => {
                        let Some(delivery) = next else { break };
                        let fabric_msg = FabricMessage {
                            subject: delivery.subject.clone(),
                            reply: None,
                            body: Decoded::from_bytes(&delivery.payload),
                            attempt: delivery.attempt,
                        };
                        match handler.handle(fabric_msg).await {
                            Ok(()) => delivery.ack(),
                            Err(e) => {
                                warn!(
                                    durable = %durable,
                                    subject = %delivery.subject,
                                    attempt = delivery.attempt,
                                    error = %e,
                                    "durable callback failed; nak"
                                );
                                delivery.nak();
                            }
                        }
                    }
                }
            }
            debug!(durable = %durable, "durable pump finished");
        });
        Ok(PumpHandle::new(task, stop_tx))
    }

    /// Request/reply with the caller's timeout (default 5 s). The reply is
    /// decoded best-effort.
    ///
    /// # Errors
    /// `NotConnected`, `RequestTimeout`, or broker failures.
    pub async fn request(
        &self,
        subj: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<Decoded, FabricError> {
        self.ensure_session()?;
        let timeout = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let reply = self
            .broker
            .request(subj, serde_json::to_vec(payload)?, timeout)
            .await?;
        Ok(Decoded::from_bytes(&reply))
    }

    /// Build a dead-letter record for a failing message and publish it to
    /// the derived `titan.dlq.*` subject.
    ///
    /// A DLQ publish that itself fails is written to standard error as the
    /// final failsafe; this method never reports an error to the caller.
    pub async fn publish_dead_letter(
        &self,
        original_subject: &str,
        original_payload: Value,
        error_message: &str,
        metadata: BTreeMap<String, String>,
    ) -> DeadLetter {
        let record = DeadLetter {
            original_subject: original_subject.to_string(),
            original_payload,
            error_message: error_message.to_string(),
            error_stack: None,
            service: self.options.service.clone(),
            // Millisecond clock widened to the nanosecond field.
            timestamp: now_ms().saturating_mul(1_000_000),
            metadata,
        };
        let dlq_subject = subject::dlq::for_subject(original_subject);
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = self.publish_bytes(&dlq_subject, bytes, None).await {
                    self.dead_letter_failsafe(&record, &e);
                }
            }
            Err(e) => self.dead_letter_failsafe(&record, &FabricError::from(e)),
        }
        record
    }

    fn dead_letter_failsafe(&self, record: &DeadLetter, error: &FabricError) {
        let body = serde_json::to_string(record).unwrap_or_else(|_| format!("{record:?}"));
        tracing::error!(error = %error, "dead-letter publish failed; writing to stderr");
        eprintln!("TITAN DLQ FAILSAFE: {body}");
    }

    /// Lazily open a KV bucket by name (default history depth) and cache the
    /// handle. The cache is write-through and never evicts.
    ///
    /// # Errors
    /// `NotConnected` or broker KV failures.
    pub async fn kv(&self, bucket: &str) -> Result<Arc<dyn KvBucket>, FabricError> {
        self.ensure_session()?;
        let mut cache = self.kv_cache.lock().await;
        if let Some(handle) = cache.get(bucket) {
            return Ok(Arc::clone(handle));
        }
        let handle = self.broker.kv_bucket(&KvSpec::named(bucket)).await?;
        cache.insert(bucket.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Store a JSON value; returns the new revision.
    ///
    /// # Errors
    /// KV failures from the broker.
    pub async fn kv_put(&self, bucket: &str, key: &str, value: &Value) -> Result<u64, FabricError> {
        self.kv(bucket)
            .await?
            .put(key, serde_json::to_vec(value)?)
            .await
    }

    /// Fetch and decode the latest value for a key.
    ///
    /// # Errors
    /// KV failures from the broker.
    pub async fn kv_get(&self, bucket: &str, key: &str) -> Result<Option<Value>, FabricError> {
        match self.kv(bucket).await?.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All live keys of a bucket.
    ///
    /// # Errors
    /// KV failures from the broker.
    pub async fn kv_keys(&self, bucket: &str) -> Result<Vec<String>, FabricError> {
        self.kv(bucket).await?.keys().await
    }

    /// Delete a key.
    ///
    /// # Errors
    /// KV failures from the broker.
    pub async fn kv_delete(&self, bucket: &str, key: &str) -> Result<(), FabricError> {
        self.kv(bucket).await?.delete(key).await
    }

    /// Watch keys matching a filter for changes.
    ///
    /// # Errors
    /// KV failures from the broker.
    pub async fn kv_watch(
        &self,
        bucket: &str,
        key_filter: &str,
    ) -> Result<tokio::sync::mpsc::Receiver<KvEntry>, FabricError> {
        self.kv(bucket).await?.watch(key_filter).await
    }

    /// Drain in-flight publishes and close the session. A second close is a
    /// no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broker.close().await;
        info!(service = %self.options.service, "fabric client closed");
    }
}

// ---- process-wide instance ----------------------------------------------

fn cell() -> &'static RwLock<Option<Arc<FabricClient>>> {
    static CELL: OnceLock<RwLock<Option<Arc<FabricClient>>>> = OnceLock::new();
    CELL.get_or_init(|| RwLock::new(None))
}

/// Install the process-wide client. Later calls replace the handle.
pub fn install(client: Arc<FabricClient>) {
    *cell().write().expect("fabric instance lock") = Some(client);
}

/// The process-wide client, if one has been installed.
#[must_use]
pub fn instance() -> Option<Arc<FabricClient>> {
    cell().read().expect("fabric instance lock").clone()
}

/// Remove the process-wide client. Tests use this to isolate fixtures.
pub fn reset() {
    *cell().write().expect("fabric instance lock") = None;
}
