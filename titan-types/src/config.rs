//! Configuration entities managed by the hierarchical configuration manager.
//!
//! Wire/file keys are camelCase to match the deployed configuration trees.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Global risk bounds plus per-phase partial overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainConfig {
    /// Hard cap on any phase's leverage.
    pub max_total_leverage: f64,
    /// Hard cap on any phase's drawdown budget.
    pub max_global_drawdown: f64,
    /// Partial phase overrides, merged over each phase's own file.
    #[serde(default)]
    pub phases: BTreeMap<String, Value>,
}

/// Per-phase runtime parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseConfig {
    /// Phase leverage, bounded by `BrainConfig::max_total_leverage`.
    pub max_leverage: f64,
    /// Phase drawdown budget, bounded by `BrainConfig::max_global_drawdown`.
    pub max_drawdown: f64,
    /// Detection thresholds keyed by detector name.
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    /// Remaining phase parameters, passed through untyped.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Opaque key-value configuration for leaf services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceConfig(pub BTreeMap<String, Value>);

/// One entry of the append-only version history kept per (type, key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVersion {
    /// Monotonically increasing, never reused.
    pub version: u64,
    /// Full payload snapshot at this version.
    pub data: Value,
    /// Who stored it.
    pub author: String,
    /// Free-form change description.
    pub comment: String,
    /// Searchable labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Store time, epoch milliseconds.
    pub timestamp: i64,
    /// Content hash of `data` (hex SHA-256 over the canonical form).
    pub hash: String,
}
