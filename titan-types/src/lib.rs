//! Titan-fabric data transfer objects shared by producers, the decision
//! component, and the execution core.
#![warn(missing_docs)]

mod acks;
mod config;
mod dlq;
mod envelope;
mod intent;
mod policy;
mod signal;

pub use acks::{AbortAck, ConfirmAck, ConnectionState, PrepareAck, SignalMetrics, SignalStatus};
pub use config::{BrainConfig, ConfigVersion, PhaseConfig, ServiceConfig};
pub use dlq::DeadLetter;
pub use envelope::Envelope;
pub use intent::{ExecutionIntent, INTENT_SCHEMA_VERSION, IntentValidationError};
pub use policy::{PolicyCheck, PolicyHashReply, PolicyHashRequest};
pub use signal::{EntryZone, IntentSignal};
