//! Envelope construction.

use crate::subject::{self, SubjectClass};
use chrono::Utc;
use serde_json::Value;
use titan_types::Envelope;
use uuid::Uuid;

/// Current time in epoch nanoseconds. Saturates past the year 2262.
#[must_use]
pub fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Current time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Builder for wire envelopes. `ts` is stamped at build time.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    kind: String,
    version: u32,
    producer: String,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    idempotency_key: Option<String>,
}

impl EnvelopeBuilder {
    /// Start an envelope for one payload schema.
    #[must_use]
    pub fn new(kind: impl Into<String>, version: u32, producer: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            version,
            producer: producer.into(),
            correlation_id: None,
            causation_id: None,
            idempotency_key: None,
        }
    }

    /// Tie the envelope into a logical interaction.
    #[must_use]
    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Record the message that caused this one.
    #[must_use]
    pub fn caused_by(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Set an explicit deduplication key.
    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Build the envelope for publication on `target_subject`.
    ///
    /// Envelopes bound for `cmd.*` subjects always carry an idempotency key;
    /// one is generated when the caller supplied none.
    #[must_use]
    pub fn build(self, target_subject: &str, payload: Value) -> Envelope {
        let idempotency_key = self.idempotency_key.or_else(|| {
            (subject::classify(target_subject) == Some(SubjectClass::Cmd))
                .then(|| Uuid::new_v4().to_string())
        });
        Envelope {
            id: Uuid::new_v4().to_string(),
            kind: self.kind,
            version: self.version,
            producer: self.producer,
            ts: now_ns(),
            data: payload,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            idempotency_key,
            sig: None,
            nonce: None,
            key_id: None,
        }
    }

    /// Build a reply envelope: correlation is carried over from the cause and
    /// `causation_id` is set to the cause's `id`.
    #[must_use]
    pub fn build_reply(self, cause: &Envelope, target_subject: &str, payload: Value) -> Envelope {
        let correlation = cause
            .correlation_id
            .clone()
            .unwrap_or_else(|| cause.id.clone());
        self.correlation(correlation)
            .caused_by(cause.id.clone())
            .build(target_subject, payload)
    }
}
