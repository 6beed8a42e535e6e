//! titan
//!
//! Messaging and coordination fabric client for the Titan multi-phase
//! trading platform. Producers emit trade intents, the execution core turns
//! approved intents into venue orders, and everything in between travels
//! over a subject-based broker with durable streams and dead-letter queues.
//!
//! - [`client`]: the broker client (topology bootstrap, envelope publishing,
//!   subscriptions, request/reply, DLQ, KV).
//! - [`signal`]: the PREPARE/CONFIRM/ABORT signal client.
//! - [`policy`]: the policy-hash handshake gating trading.
//!
//! The broker itself is injected behind the `titan_core::Broker` seam;
//! `titan-mock` provides a deterministic in-memory implementation for tests.
#![warn(missing_docs)]

/// The process-wide broker client.
pub mod client;
/// The policy-hash handshake.
pub mod policy;
/// The transactional signal client.
pub mod signal;

pub use client::{
    ConnectOptions, DEFAULT_REQUEST_TIMEOUT, Decoded, FabricClient, FabricMessage, MessageHandler,
    install, instance, reset,
};
pub use policy::{
    HandshakeOptions, policy_hash_of, serve_policy_hash, verify_execution_policy_hash,
};
pub use signal::{FillPriceMode, SignalClient, SignalClientConfig, SignalVariant};

pub use titan_core::{
    Broker, BrokerEvent, EnvelopeBuilder, FabricError, PumpHandle, Signer, subject, topology,
};
pub use titan_types::{
    AbortAck, ConfirmAck, ConnectionState, DeadLetter, EntryZone, Envelope, ExecutionIntent,
    IntentSignal, PolicyCheck, PolicyHashReply, PrepareAck, SignalMetrics, SignalStatus,
};
