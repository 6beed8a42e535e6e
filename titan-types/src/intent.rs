//! The post-transform execution intent consumed by the execution core.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Schema version stamped on every transformed intent.
pub const INTENT_SCHEMA_VERSION: &str = "1.0.0";

/// Directional setup types recognized by the execution core.
const KNOWN_KINDS: [&str; 2] = ["BUY_SETUP", "SELL_SETUP"];

/// Validation failure for a transformed intent payload.
///
/// Collects every issue found rather than stopping at the first, so the
/// dead-letter record carries the full picture.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid intent payload: {}", issues.join("; "))]
pub struct IntentValidationError {
    /// Individual schema violations, human readable.
    pub issues: Vec<String>,
}

/// Schema-versioned payload the execution core accepts on command subjects.
///
/// `direction` and `kind` are kept as open wire values so that an invalid
/// transform result can still be serialized into a dead-letter record; the
/// closed set is enforced by [`ExecutionIntent::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionIntent {
    /// Intent schema version, currently [`INTENT_SCHEMA_VERSION`].
    pub schema_version: String,
    /// Identifier of the originating signal.
    pub signal_id: String,
    /// Originating component tag.
    pub source: String,
    /// Venue symbol, e.g. `BTC/USDT`.
    pub symbol: String,
    /// `+1` for long, `-1` for short.
    pub direction: i8,
    /// `BUY_SETUP` or `SELL_SETUP`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Ordered `[low, high]` entry band.
    pub entry_zone: [f64; 2],
    /// Protective stop level.
    pub stop_loss: f64,
    /// Take-profit ladder.
    pub take_profits: Vec<f64>,
    /// Requested size; `0` lets the execution side size from risk.
    pub size: f64,
    /// Lifecycle status, `PENDING` on ingress.
    pub status: String,
    /// Ingress wall-clock time, ISO-8601.
    pub received_at: String,
    /// Signal origin time, epoch milliseconds.
    pub t_signal: i64,
    /// Exchange timestamp, epoch milliseconds, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_exchange: Option<i64>,
    /// Open-ended source metadata (confidence, leverage, correlation, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ExecutionIntent {
    /// Check the payload against the intent schema.
    ///
    /// # Errors
    /// Returns an [`IntentValidationError`] listing every violation. A payload
    /// that fails here must be routed to the dead-letter queue, never to the
    /// execution core.
    pub fn validate(&self) -> Result<(), IntentValidationError> {
        let mut issues = Vec::new();

        if self.schema_version.trim().is_empty() {
            issues.push("schema_version is empty".to_string());
        }
        if self.signal_id.trim().is_empty() {
            issues.push("signal_id is empty".to_string());
        }
        if self.symbol.trim().is_empty() {
            issues.push("symbol is empty".to_string());
        }
        match self.direction {
            1 | -1 => {}
            d => issues.push(format!("direction must be +1 or -1, got {d}")),
        }
        if !KNOWN_KINDS.contains(&self.kind.as_str()) {
            issues.push(format!("type must be BUY_SETUP or SELL_SETUP, got {:?}", self.kind));
        }
        match (self.direction, self.kind.as_str()) {
            (1, "BUY_SETUP") | (-1, "SELL_SETUP") => {}
            (1 | -1, k) if KNOWN_KINDS.contains(&k) => {
                issues.push(format!("type {k} contradicts direction {}", self.direction));
            }
            _ => {}
        }
        let [lo, hi] = self.entry_zone;
        if !(lo.is_finite() && hi.is_finite()) {
            issues.push("entry_zone bounds must be finite".to_string());
        } else if lo > hi {
            issues.push(format!("entry_zone is not ordered: [{lo}, {hi}]"));
        } else if lo <= 0.0 {
            issues.push("entry_zone bounds must be positive".to_string());
        }
        if !self.stop_loss.is_finite() || self.stop_loss <= 0.0 {
            issues.push("stop_loss must be a positive finite price".to_string());
        }
        if self.take_profits.iter().any(|tp| !tp.is_finite() || *tp <= 0.0) {
            issues.push("take_profits must all be positive finite prices".to_string());
        }
        if !self.size.is_finite() || self.size < 0.0 {
            issues.push("size must be zero or a positive finite quantity".to_string());
        }
        if self.status != "PENDING" {
            issues.push(format!("status must be PENDING on ingress, got {:?}", self.status));
        }
        if self.t_signal <= 0 {
            issues.push("t_signal must be a positive epoch-millisecond timestamp".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(IntentValidationError { issues })
        }
    }
}
