//! Pre-transform intent signals as emitted by scavengers and hunters.

use serde::{Deserialize, Serialize};

/// Price band a producer considers acceptable for entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryZone {
    /// Lower bound of the entry band.
    pub min: f64,
    /// Upper bound of the entry band.
    pub max: f64,
}

impl EntryZone {
    /// Midpoint of the band, used as the optimistic fill estimate.
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        f64::midpoint(self.min, self.max)
    }

    /// The band as an ordered `[low, high]` pair regardless of input order.
    #[must_use]
    pub fn ordered(&self) -> [f64; 2] {
        if self.min <= self.max {
            [self.min, self.max]
        } else {
            [self.max, self.min]
        }
    }
}

/// A producer's proposal to act, held PENDING by the signal client until a
/// CONFIRM or ABORT arrives.
///
/// `direction` is deliberately an open string (`"LONG"` / `"SHORT"` for valid
/// signals): producers are heterogeneous and the prepare phase only checks
/// identity fields. Directional garbage is caught by schema validation of the
/// transformed payload during confirm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSignal {
    /// Producer-assigned identifier, the key of the pending map.
    pub signal_id: String,
    /// Venue symbol, e.g. `BTC/USDT`.
    pub symbol: String,
    /// `LONG` or `SHORT`.
    pub direction: String,
    /// Acceptable entry band.
    pub entry_zone: EntryZone,
    /// Protective stop level.
    pub stop_loss: f64,
    /// Take-profit ladder, ordered by the producer.
    pub take_profits: Vec<f64>,
    /// Producer confidence in `[0, 1]`.
    pub confidence: f64,
    /// Requested leverage.
    pub leverage: f64,
    /// Source timestamp, epoch milliseconds, if the producer supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_signal: Option<i64>,
    /// Exchange timestamp, epoch milliseconds, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_exchange: Option<i64>,
    /// Originating component tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl IntentSignal {
    /// Whether the identity fields required by the prepare phase are present.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        !self.signal_id.trim().is_empty() && !self.symbol.trim().is_empty()
    }
}
