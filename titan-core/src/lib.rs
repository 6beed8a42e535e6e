//! titan-core
//!
//! Subject catalog, stream topology, envelope signing, and the broker seam
//! shared across the Titan fabric.
//!
//! - `subject`: the closed subject taxonomy and its constructors.
//! - `topology`: declarative stream/consumer/KV topology.
//! - `canonical` / `signing`: deterministic canonicalization and HMAC.
//! - `broker`: the trait seam adapters and the in-memory test broker implement.
#![warn(missing_docs)]

/// The broker trait seam: publish, subscribe, durables, request/reply, KV.
pub mod broker;
/// Deterministic JSON canonicalization for signing.
pub mod canonical;
/// Envelope construction helpers.
pub mod envelope;
/// Core error type shared across the fabric.
pub mod error;
/// Subscription pump task handles.
pub mod handle;
/// HMAC signing, verification, and replay protection.
pub mod signing;
/// The canonical subject catalog.
pub mod subject;
/// Declarative stream and consumer topology.
pub mod topology;

pub use broker::{
    AckVerdict, Broker, BrokerEvent, BrokerMessage, Delivery, DurableSubscription, KvBucket,
    KvEntry, Subscription,
};
pub use canonical::{canonical_json, canonical_string, content_digest};
pub use envelope::{EnvelopeBuilder, now_ms, now_ns};
pub use error::FabricError;
pub use handle::PumpHandle;
pub use signing::{ReplayGuard, Signer};
pub use topology::{
    ConsumerSpec, DeliverPolicy, Discard, KvSpec, Retention, StorageClass, StreamSpec,
    TopologyOutcome, TopologyReport,
};
