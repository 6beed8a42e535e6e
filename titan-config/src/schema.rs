//! Schema validation for the configuration entities.
//!
//! Violations that would make the fabric unsafe are fatal; stylistic or
//! suspicious-but-workable values surface as warnings and never fail a load.

use serde_json::Value;
use titan_types::{BrainConfig, PhaseConfig};

/// Outcome of validating one merged configuration value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Fatal schema violations.
    pub issues: Vec<String>,
    /// Non-fatal observations surfaced to the operator.
    pub warnings: Vec<String>,
}

impl Validation {
    /// Whether the value passed (warnings allowed).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

fn check_positive(v: f64, field: &str, out: &mut Validation) {
    if !v.is_finite() || v <= 0.0 {
        out.issues.push(format!("{field} must be positive and finite, got {v}"));
    }
}

/// Validate a merged brain configuration.
#[must_use]
pub fn validate_brain(cfg: &BrainConfig) -> Validation {
    let mut out = Validation::default();
    check_positive(cfg.max_total_leverage, "maxTotalLeverage", &mut out);
    check_positive(cfg.max_global_drawdown, "maxGlobalDrawdown", &mut out);
    if cfg.max_total_leverage > 100.0 {
        out.warnings
            .push(format!("maxTotalLeverage {} is unusually high", cfg.max_total_leverage));
    }
    if cfg.max_global_drawdown > 1.0 {
        out.warnings.push(format!(
            "maxGlobalDrawdown {} exceeds 1.0; expected a fraction of equity",
            cfg.max_global_drawdown
        ));
    }
    for (phase, overrides) in &cfg.phases {
        if !overrides.is_object() {
            out.issues
                .push(format!("phases.{phase} override must be an object"));
        }
    }
    out
}

/// Validate a merged phase configuration.
#[must_use]
pub fn validate_phase(name: &str, cfg: &PhaseConfig) -> Validation {
    let mut out = Validation::default();
    check_positive(cfg.max_leverage, "maxLeverage", &mut out);
    check_positive(cfg.max_drawdown, "maxDrawdown", &mut out);
    for (detector, threshold) in &cfg.thresholds {
        if !threshold.is_finite() {
            out.issues
                .push(format!("thresholds.{detector} must be finite, got {threshold}"));
        } else if !(0.0..=1.0).contains(threshold) {
            out.warnings.push(format!(
                "thresholds.{detector} = {threshold} is outside [0, 1]"
            ));
        }
    }
    if cfg.max_drawdown > 1.0 {
        out.warnings.push(format!(
            "{name}: maxDrawdown {} exceeds 1.0; expected a fraction of equity",
            cfg.max_drawdown
        ));
    }
    out
}

/// Validate a merged service configuration value.
#[must_use]
pub fn validate_service(name: &str, value: &Value) -> Validation {
    let mut out = Validation::default();
    if !value.is_object() {
        out.issues
            .push(format!("service {name} configuration must be an object"));
    }
    out
}

/// Cross-check a phase against the brain's global caps. A breach is fatal
/// for the load that produced it.
#[must_use]
pub fn phase_within_brain(phase: &PhaseConfig, brain: &BrainConfig) -> bool {
    phase.max_leverage <= brain.max_total_leverage
        && phase.max_drawdown <= brain.max_global_drawdown
}
