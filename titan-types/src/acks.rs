//! Structured responses returned by the signal client phases.
//!
//! Phase outcomes are values, never errors: the client returns these across
//! the phase boundary regardless of what failed underneath.

use serde::{Deserialize, Serialize};

/// Outcome of the PREPARE phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareAck {
    /// Whether the signal was cached as PENDING.
    pub prepared: bool,
    /// Echo of the pending key on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    /// Failure description when `prepared` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PrepareAck {
    /// Signal accepted into the pending map.
    #[must_use]
    pub fn ok(signal_id: impl Into<String>) -> Self {
        Self {
            prepared: true,
            signal_id: Some(signal_id.into()),
            reason: None,
        }
    }

    /// Signal rejected before any state change.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            prepared: false,
            signal_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Outcome of the CONFIRM phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmAck {
    /// Whether the transformed command was published.
    pub executed: bool,
    /// Optimistic fill estimate (entry-zone midpoint) when the client is
    /// configured to report one; `None` in deferred mode, where the caller
    /// awaits a fill event correlated by `correlation_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
    /// Correlation id of the published command, for fill-event tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Failure description when `executed` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConfirmAck {
    /// Command published; `fill_price` per the client's fill-price mode.
    #[must_use]
    pub fn executed(correlation_id: impl Into<String>, fill_price: Option<f64>) -> Self {
        Self {
            executed: true,
            fill_price,
            correlation_id: Some(correlation_id.into()),
            reason: None,
        }
    }

    /// Confirm failed; nothing reached the execution core.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            executed: false,
            fill_price: None,
            correlation_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Outcome of the ABORT phase. Always succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortAck {
    /// Always true; abort of an unknown signal is a no-op.
    pub aborted: bool,
}

impl Default for AbortAck {
    fn default() -> Self {
        Self { aborted: true }
    }
}

/// Broker-session state as seen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session established yet.
    Disconnected,
    /// Session establishment in flight.
    Connecting,
    /// Live session.
    Connected,
    /// Explicitly closed; terminal.
    Closed,
}

/// Counters exposed by `get_metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMetrics {
    /// Signals accepted into the pending map.
    pub prepared: u64,
    /// Commands published by confirm.
    pub confirmed: u64,
    /// Pending entries discarded by abort.
    pub aborted: u64,
    /// Pending entries that timed out without a terminal phase.
    pub expired: u64,
    /// Prepare or confirm calls rejected before publish.
    pub rejected: u64,
    /// Payloads routed to the dead-letter queue.
    pub dead_lettered: u64,
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStatus {
    /// Current broker-session state.
    pub connection: ConnectionState,
    /// Number of signals currently PENDING.
    pub pending: u64,
    /// Phase counters.
    pub metrics: SignalMetrics,
}
