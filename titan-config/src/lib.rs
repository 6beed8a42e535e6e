//! titan-config
//!
//! Hierarchical configuration for the Titan trading platform.
//!
//! - `manager`: overlay loads (`defaults <- environment <- brain-override <-
//!   operator`), hot reload by polling, event emission.
//! - `history`: append-only version logs with search, diff, and rollback.
//! - `merge` / `schema`: deep-merge, structural diff, and entity validation.
#![warn(missing_docs)]

/// Error type for loads, persistence, and history access.
pub mod error;
/// Append-only version history per configuration target.
pub mod history;
/// The configuration manager.
pub mod manager;
/// Deep-merge and structural diff.
pub mod merge;
/// Entity schema validation.
pub mod schema;

pub use error::ConfigError;
pub use history::{ConfigKind, VersionLog, VersionQuery, content_hash};
pub use manager::{ConfigEvent, ConfigManager, LoadReport, SourceLayer, WATCH_INTERVAL};
pub use merge::{ConfigDiff, deep_merge, diff_values, leaf_paths};
pub use schema::{Validation, phase_within_brain, validate_brain, validate_phase};
