//! Dead-letter records retained for messages that failed terminal processing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Record published to `titan.dlq.*` when a message fails terminal processing.
///
/// `timestamp` is an epoch-nanosecond estimate derived from millisecond wall
/// clocks upstream; consumers must not assume sub-millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Subject the failing message was originally published to.
    pub original_subject: String,
    /// The failing payload, verbatim.
    pub original_payload: Value,
    /// Human-readable failure description.
    pub error_message: String,
    /// Stack or error chain, when the producer had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    /// Component that routed the message here.
    pub service: String,
    /// Epoch nanoseconds (millisecond precision).
    pub timestamp: i64,
    /// Free-form routing and trace metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}
