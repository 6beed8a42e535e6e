use thiserror::Error;

/// Unified error type for the Titan fabric.
///
/// Covers transport failures, schema and signature rejections, topology
/// reconciliation problems, and KV access errors. Protocol-level outcomes
/// (confirm-without-prepare and friends) are structured responses, not
/// errors, and never appear here.
#[derive(Debug, Error)]
pub enum FabricError {
    /// No broker session; the caller may retry after reconnect.
    #[error("not connected to broker")]
    NotConnected,

    /// The broker rejected or failed a publish.
    #[error("publish to {subject} failed: {msg}")]
    Publish {
        /// Target subject of the failed publish.
        subject: String,
        /// Broker-reported failure.
        msg: String,
    },

    /// A request/reply call exceeded its timeout.
    #[error("request to {subject} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Request subject.
        subject: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Subscription setup or delivery failed.
    #[error("subscription on {subject} failed: {msg}")]
    Subscribe {
        /// Subscribed subject or durable filter.
        subject: String,
        /// Broker-reported failure.
        msg: String,
    },

    /// A payload failed schema validation. Non-retryable; route to DLQ.
    #[error("schema violation: {0}")]
    Schema(String),

    /// An envelope failed signature verification or replay checks.
    #[error("signature rejected: {0}")]
    Signature(String),

    /// Stream or consumer create/update failed during reconciliation.
    #[error("topology reconciliation of {target} failed: {msg}")]
    Topology {
        /// Stream or durable name.
        target: String,
        /// Broker-reported failure.
        msg: String,
    },

    /// KV bucket access failed.
    #[error("kv bucket {bucket} failed: {msg}")]
    Kv {
        /// Bucket name.
        bucket: String,
        /// Failure description.
        msg: String,
    },

    /// Payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl FabricError {
    /// Helper: build a `Publish` error.
    pub fn publish(subject: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            subject: subject.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Subscribe` error.
    pub fn subscribe(subject: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Subscribe {
            subject: subject.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Topology` error.
    pub fn topology(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Topology {
            target: target.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Kv` error.
    pub fn kv(bucket: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Kv {
            bucket: bucket.into(),
            msg: msg.into(),
        }
    }

    /// Whether the caller may reasonably retry after reconnecting.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Publish { .. } | Self::RequestTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for FabricError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}
