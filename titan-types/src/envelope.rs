//! The canonical wire envelope wrapping every fabric payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical wrapper around a domain payload carrying identity, trace, and
/// authenticity metadata.
///
/// Required wire fields are `id`, `type`, `version`, `producer`, `ts`, and
/// `data`; the trace and signing fields are optional and omitted from the
/// serialized form when absent.
///
/// Invariants (enforced by the publishing layer, not by serde):
/// - every envelope on a `cmd.*` subject carries an `idempotency_key`;
/// - `correlation_id` is preserved end-to-end across phase transitions;
/// - the `causation_id` of a reply equals the `id` of its cause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Unique message identifier.
    pub id: String,
    /// Payload schema tag (e.g. `execution.intent`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Integer schema version of the payload.
    pub version: u32,
    /// Originating component name.
    pub producer: String,
    /// Producer timestamp, nanoseconds since the Unix epoch.
    pub ts: i64,
    /// The wrapped payload.
    pub data: Value,
    /// Shared across all messages belonging to one logical interaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// `id` of the message that caused this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    /// Deduplication key; required for commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Hex HMAC-SHA-256 over the canonical string; present iff signing is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    /// 128-bit hex nonce; present iff signing is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Opaque identifier of the signing-key rotation slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

impl Envelope {
    /// Whether the signing triple (`sig`, `nonce`, `key_id`) is present.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.sig.is_some() && self.nonce.is_some() && self.key_id.is_some()
    }

    /// Deserialize the wrapped payload into a concrete type.
    ///
    /// # Errors
    /// Returns the underlying `serde_json` error when the payload does not
    /// match the target schema.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    /// Trace metadata as a flat string map, convenient for dead-letter records.
    #[must_use]
    pub fn trace_metadata(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("message_id".to_string(), self.id.clone());
        if let Some(c) = &self.correlation_id {
            out.insert("correlation_id".to_string(), c.clone());
        }
        if let Some(c) = &self.causation_id {
            out.insert("causation_id".to_string(), c.clone());
        }
        out
    }
}
