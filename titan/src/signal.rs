//! The transactional signal client.
//!
//! Three-phase PREPARE/CONFIRM/ABORT protocol bracketing remote order
//! placement: PREPARE caches the intent locally, CONFIRM transforms it to
//! the execution schema, validates, and publishes, ABORT discards. The
//! pending map is the serialization point: for one `signal_id` the phases
//! cannot be observed out of order.

use crate::client::FabricClient;
use chrono::{SecondsFormat, Utc};
use moka::future::Cache;
use moka::notification::RemovalCause;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use titan_core::{EnvelopeBuilder, now_ms, subject};
use titan_types::{
    AbortAck, ConfirmAck, ConnectionState, DeadLetter, ExecutionIntent, INTENT_SCHEMA_VERSION,
    IntentSignal, PrepareAck, SignalMetrics, SignalStatus,
};
use tracing::{debug, warn};

/// Where a confirmed intent is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalVariant {
    /// Publish onto the signal-submit subject; the decision component turns
    /// the signal into a command later.
    SignalSubmit,
    /// Transform straight into a venue-routed execution command.
    Execution,
}

/// Shape of the CONFIRM response's fill estimate.
///
/// The entry-zone midpoint is an optimistic estimate, not a fill
/// acknowledgment; callers that track real fills should run `Deferred` and
/// correlate the later fill event instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPriceMode {
    /// Return the entry-zone midpoint as `fill_price`.
    Midpoint,
    /// Return no `fill_price`; only the correlation id.
    Deferred,
}

/// Tunables for one signal client instance.
#[derive(Debug, Clone)]
pub struct SignalClientConfig {
    /// Routing variant.
    pub variant: SignalVariant,
    /// Fill-estimate shape.
    pub fill_price_mode: FillPriceMode,
    /// How long a PENDING entry survives without a terminal phase.
    pub pending_ttl: Duration,
    /// Venue token of constructed command subjects.
    pub venue: String,
    /// Account token of constructed command subjects.
    pub account: String,
    /// Producer stamped onto envelopes.
    pub producer: String,
    /// Source tag used when the signal itself carries none.
    pub source: String,
}

impl Default for SignalClientConfig {
    fn default() -> Self {
        Self {
            variant: SignalVariant::Execution,
            fill_price_mode: FillPriceMode::Midpoint,
            pending_ttl: Duration::from_secs(300),
            venue: "auto".to_string(),
            account: "main".to_string(),
            producer: "titan-brain".to_string(),
            source: "titan-brain".to_string(),
        }
    }
}

#[derive(Default)]
struct Counters {
    prepared: AtomicU64,
    confirmed: AtomicU64,
    aborted: AtomicU64,
    expired: Arc<AtomicU64>,
    rejected: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Transactional signal client. One instance per producer; the pending map
/// is not shared across clients.
pub struct SignalClient {
    fabric: Arc<FabricClient>,
    cfg: SignalClientConfig,
    pending: Cache<String, IntentSignal>,
    counters: Counters,
    detached: AtomicBool,
}

impl SignalClient {
    /// Client over an already-connected fabric client.
    #[must_use]
    pub fn new(fabric: Arc<FabricClient>, cfg: SignalClientConfig) -> Self {
        let expired = Arc::new(AtomicU64::new(0));
        let expired_listener = Arc::clone(&expired);
        let pending = Cache::builder()
            .time_to_live(cfg.pending_ttl)
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Expired {
                    expired_listener.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();
        Self {
            fabric,
            cfg,
            pending,
            counters: Counters {
                expired,
                ..Counters::default()
            },
            detached: AtomicBool::new(false),
        }
    }

    /// Client with default configuration (execution variant, midpoint fill).
    #[must_use]
    pub fn with_defaults(fabric: Arc<FabricClient>) -> Self {
        Self::new(fabric, SignalClientConfig::default())
    }

    /// Re-establish the broker session for this client.
    ///
    /// # Errors
    /// Transport errors from the broker.
    pub async fn connect(&self) -> Result<(), titan_core::FabricError> {
        self.fabric.broker().connect().await?;
        self.detached.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Detach this client. The shared fabric session stays up; only this
    /// client stops publishing.
    pub fn disconnect(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    /// Whether this client can publish right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.detached.load(Ordering::SeqCst) && self.fabric.is_connected()
    }

    /// Session state as seen by this client.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        if self.detached.load(Ordering::SeqCst) {
            ConnectionState::Closed
        } else if self.fabric.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Phase counters.
    #[must_use]
    pub fn metrics(&self) -> SignalMetrics {
        SignalMetrics {
            prepared: self.counters.prepared.load(Ordering::SeqCst),
            confirmed: self.counters.confirmed.load(Ordering::SeqCst),
            aborted: self.counters.aborted.load(Ordering::SeqCst),
            expired: self.counters.expired.load(Ordering::SeqCst),
            rejected: self.counters.rejected.load(Ordering::SeqCst),
            dead_lettered: self.counters.dead_lettered.load(Ordering::SeqCst),
        }
    }

    /// Full status snapshot.
    pub async fn status(&self) -> SignalStatus {
        self.pending.run_pending_tasks().await;
        SignalStatus {
            connection: self.connection_state(),
            pending: self.pending.entry_count(),
            metrics: self.metrics(),
        }
    }

    /// PREPARE: validate identity fields and cache the signal as PENDING.
    ///
    /// Purely local apart from a best-effort auto-connect when the session is
    /// down; auto-connect failure is logged and the prepare still succeeds.
    pub async fn send_prepare(&self, signal: IntentSignal) -> PrepareAck {
        if !signal.has_identity() {
            self.counters.rejected.fetch_add(1, Ordering::SeqCst);
            return PrepareAck::rejected("Invalid signal data");
        }
        if !self.is_connected() {
            match self.fabric.broker().connect().await {
                Ok(()) => self.detached.store(false, Ordering::SeqCst),
                Err(e) => {
                    warn!(signal_id = %signal.signal_id, error = %e, "auto-connect failed; prepare proceeds");
                }
            }
        }
        let signal_id = signal.signal_id.clone();
        self.pending.insert(signal_id.clone(), signal).await;
        self.counters.prepared.fetch_add(1, Ordering::SeqCst);
        debug!(signal_id = %signal_id, "signal pending");
        PrepareAck::ok(signal_id)
    }

    /// CONFIRM: transform the pending signal to the execution schema,
    /// validate, and publish. Never returns an error; every failure mode is
    /// a structured response with a `reason`.
    pub async fn send_confirm(&self, signal_id: &str) -> ConfirmAck {
        let Some(signal) = self.pending.get(signal_id).await else {
            self.counters.rejected.fetch_add(1, Ordering::SeqCst);
            return ConfirmAck::failed("Signal not found or expired");
        };

        let intent = self.transform(&signal);
        if let Err(validation) = intent.validate() {
            self.dead_letter_invalid(&signal, &intent, &validation.to_string())
                .await;
            self.pending.invalidate(signal_id).await;
            self.counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
            return ConfirmAck::failed("Invalid intent payload");
        }

        let target = match self.cfg.variant {
            SignalVariant::Execution => {
                subject::cmd::execution_place(&self.cfg.venue, &self.cfg.account, &signal.symbol)
            }
            SignalVariant::SignalSubmit => subject::evt::BRAIN_SIGNAL.to_string(),
        };
        let payload = match serde_json::to_value(&intent) {
            Ok(v) => v,
            Err(e) => return ConfirmAck::failed(format!("intent encoding failed: {e}")),
        };
        // The key is derived from the signal so a retried confirm lands in
        // the stream's duplicate window instead of double-dispatching.
        let builder = EnvelopeBuilder::new("execution.intent", 1, &self.cfg.producer)
            .correlation(signal_id.to_string())
            .idempotency_key(format!("intent-{signal_id}"));

        match self.fabric.publish_envelope(&target, builder, payload.clone()).await {
            Ok(_) => {
                if self.cfg.variant == SignalVariant::SignalSubmit {
                    self.dual_publish_legacy(signal_id, payload).await;
                }
                self.pending.invalidate(signal_id).await;
                self.counters.confirmed.fetch_add(1, Ordering::SeqCst);
                let fill_price = match self.cfg.fill_price_mode {
                    FillPriceMode::Midpoint => Some(signal.entry_zone.midpoint()),
                    FillPriceMode::Deferred => None,
                };
                ConfirmAck::executed(signal_id, fill_price)
            }
            // The pending entry survives a transport failure so the caller
            // can retry after reconnect.
            Err(e) => ConfirmAck::failed(e.to_string()),
        }
    }

    /// ABORT: discard any pending entry for the signal. Unconditional.
    pub async fn send_abort(&self, signal_id: &str) -> AbortAck {
        self.pending.invalidate(signal_id).await;
        self.counters.aborted.fetch_add(1, Ordering::SeqCst);
        debug!(signal_id, "signal aborted");
        AbortAck::default()
    }

    /// Map the intent signal onto the execution schema. Infallible by
    /// design: directional garbage flows through so the validation failure
    /// (and its dead letter) can carry the full payload.
    fn transform(&self, signal: &IntentSignal) -> ExecutionIntent {
        let direction: i8 = match signal.direction.as_str() {
            "LONG" => 1,
            "SHORT" => -1,
            _ => 0,
        };
        let kind = match direction {
            1 => "BUY_SETUP".to_string(),
            -1 => "SELL_SETUP".to_string(),
            _ => signal.direction.clone(),
        };
        let source = signal
            .source
            .clone()
            .unwrap_or_else(|| self.cfg.source.clone());
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), Value::String(source.clone()));
        metadata.insert("confidence".to_string(), json_number(signal.confidence));
        metadata.insert("leverage".to_string(), json_number(signal.leverage));
        metadata.insert(
            "correlation_id".to_string(),
            Value::String(signal.signal_id.clone()),
        );
        metadata.insert(
            "schema_version".to_string(),
            Value::String(INTENT_SCHEMA_VERSION.to_string()),
        );
        ExecutionIntent {
            schema_version: INTENT_SCHEMA_VERSION.to_string(),
            signal_id: signal.signal_id.clone(),
            source,
            symbol: signal.symbol.clone(),
            direction,
            kind,
            entry_zone: signal.entry_zone.ordered(),
            stop_loss: signal.stop_loss,
            take_profits: signal.take_profits.clone(),
            size: 0.0,
            status: "PENDING".to_string(),
            received_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            t_signal: signal.t_signal.unwrap_or_else(now_ms),
            t_exchange: signal.t_exchange,
            metadata,
        }
    }

    /// Route an invalid transformed payload to both the canonical and the
    /// legacy execution dead-letter subjects.
    async fn dead_letter_invalid(
        &self,
        signal: &IntentSignal,
        intent: &ExecutionIntent,
        reason: &str,
    ) {
        let would_be_target =
            subject::cmd::execution_place(&self.cfg.venue, &self.cfg.account, &signal.symbol);
        let record = DeadLetter {
            original_subject: would_be_target,
            original_payload: serde_json::to_value(intent).unwrap_or(Value::Null),
            error_message: reason.to_string(),
            error_stack: None,
            service: self.fabric.service().to_string(),
            timestamp: now_ms().saturating_mul(1_000_000),
            metadata: BTreeMap::from([(
                "correlation_id".to_string(),
                signal.signal_id.clone(),
            )]),
        };
        let body = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                warn!(signal_id = %signal.signal_id, error = %e, "dead-letter encoding failed");
                return;
            }
        };
        for dlq_subject in [subject::dlq::EXECUTION_CORE, subject::legacy::EXECUTION_DLQ] {
            if let Err(e) = self.fabric.publish_value(dlq_subject, &body).await {
                warn!(subject = dlq_subject, error = %e, "dead-letter publish failed");
            }
        }
    }

    /// Migration-window dual publish of signal submissions onto the legacy
    /// subject. Best effort; gone after the catalog's sunset date.
    async fn dual_publish_legacy(&self, signal_id: &str, payload: Value) {
        let builder = EnvelopeBuilder::new("execution.intent", 1, &self.cfg.producer)
            .correlation(signal_id.to_string());
        if let Err(e) = self
            .fabric
            .publish_envelope(subject::legacy::SIGNAL_SUBMIT, builder, payload)
            .await
        {
            warn!(signal_id, error = %e, "legacy signal-submit publish failed");
        }
    }
}

fn json_number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}
