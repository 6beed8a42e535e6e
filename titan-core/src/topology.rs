//! Declarative stream, consumer, and KV-bucket topology.
//!
//! The broker client walks these declarations at connect time and ensures the
//! topology exists, creating absent objects and updating divergent ones. The
//! declarations are data; nothing here talks to a broker.

use crate::subject;
use std::time::Duration;

/// Backing storage of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// RAM-backed; contents are lost on broker restart.
    Memory,
    /// Disk-backed.
    File,
}

/// Retention policy of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep until age/size limits evict.
    Limits,
    /// Remove once any consumer acknowledges.
    WorkQueue,
    /// Remove once every interested consumer acknowledges.
    Interest,
}

/// Behavior when a stream hits its size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Drop the oldest messages to make room.
    Old,
    /// Reject new messages.
    New,
}

/// Where a new durable starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// From the first retained message.
    All,
    /// From the last message at bind time.
    Last,
    /// Only messages published after bind.
    New,
}

/// Declared attributes of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSpec {
    /// Stream name.
    pub name: &'static str,
    /// Subject filters the stream captures. Must cover every subject a
    /// producer will publish into it.
    pub subjects: Vec<&'static str>,
    /// Backing storage.
    pub storage: StorageClass,
    /// Retention policy.
    pub retention: Retention,
    /// Maximum message age.
    pub max_age: Duration,
    /// Size cap in bytes, if any.
    pub max_bytes: Option<u64>,
    /// Limit behavior.
    pub discard: Discard,
    /// Replica count.
    pub replicas: usize,
    /// Deduplication window for idempotent publishes.
    pub duplicate_window: Option<Duration>,
}

impl StreamSpec {
    /// Whether a concrete subject would be captured by this stream.
    #[must_use]
    pub fn covers(&self, subj: &str) -> bool {
        self.subjects
            .iter()
            .any(|f| subject::subject_matches(f, subj))
    }
}

/// Declared attributes of one durable consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerSpec {
    /// Stream the durable binds to.
    pub stream: &'static str,
    /// Durable name; survives restarts.
    pub durable: &'static str,
    /// Subject filter within the stream.
    pub filter_subject: &'static str,
    /// Where a fresh durable starts.
    pub deliver_policy: DeliverPolicy,
    /// Redelivery attempts before the broker gives up on the message.
    pub max_deliver: u32,
    /// How long the broker waits for an ack before redelivering.
    pub ack_wait: Duration,
    /// Explicit per-attempt redelivery delays. When shorter than
    /// `max_deliver - 1`, the final entry repeats.
    pub backoff: Option<Vec<Duration>>,
}

impl ConsumerSpec {
    /// Redelivery delay before attempt `attempt + 1` (attempts count from 1).
    /// Falls back to `ack_wait` when no explicit schedule is declared.
    #[must_use]
    pub fn redelivery_delay(&self, attempt: u32) -> Duration {
        self.backoff.as_ref().map_or(self.ack_wait, |schedule| {
            let idx = (attempt.max(1) as usize - 1).min(schedule.len().saturating_sub(1));
            schedule.get(idx).copied().unwrap_or(self.ack_wait)
        })
    }
}

/// Declared attributes of one KV bucket.
///
/// Unlike streams and consumers, buckets are also opened lazily by name, so
/// the name is owned.
#[derive(Debug, Clone, PartialEq)]
pub struct KvSpec {
    /// Bucket name.
    pub bucket: String,
    /// Revisions kept per key.
    pub history: u8,
    /// Entry time-to-live, if any.
    pub ttl: Option<Duration>,
    /// Backing storage.
    pub storage: StorageClass,
}

impl KvSpec {
    /// Spec for a bucket opened by name with the default history depth.
    #[must_use]
    pub fn named(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            history: KV_DEFAULT_HISTORY,
            ttl: None,
            storage: StorageClass::File,
        }
    }
}

/// Default history depth for buckets opened lazily by name.
pub const KV_DEFAULT_HISTORY: u8 = 5;

const GIB: u64 = 1024 * 1024 * 1024;
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// The canonical stream set.
#[must_use]
pub fn streams() -> Vec<StreamSpec> {
    vec![
        StreamSpec {
            name: "TITAN_CMD",
            subjects: vec![subject::cmd::ALL],
            storage: StorageClass::File,
            retention: Retention::WorkQueue,
            max_age: 7 * DAY,
            max_bytes: None,
            discard: Discard::Old,
            replicas: 1,
            duplicate_window: Some(Duration::from_secs(60)),
        },
        StreamSpec {
            name: "TITAN_EVT",
            subjects: vec![subject::evt::ALL],
            storage: StorageClass::File,
            retention: Retention::Limits,
            max_age: 30 * DAY,
            max_bytes: Some(10 * GIB),
            discard: Discard::Old,
            replicas: 1,
            duplicate_window: None,
        },
        StreamSpec {
            name: "TITAN_DATA",
            subjects: vec![subject::data::ALL],
            storage: StorageClass::Memory,
            retention: Retention::Limits,
            max_age: Duration::from_secs(15 * 60),
            max_bytes: None,
            discard: Discard::Old,
            replicas: 1,
            duplicate_window: None,
        },
        // Decommissioning; drained once legacy producers migrate to TITAN_EVT.
        StreamSpec {
            name: "TITAN_SIGNAL",
            subjects: vec![subject::signal::ALL],
            storage: StorageClass::File,
            retention: Retention::Limits,
            max_age: DAY,
            max_bytes: Some(5 * GIB),
            discard: Discard::Old,
            replicas: 1,
            duplicate_window: None,
        },
        StreamSpec {
            name: "TITAN_DLQ",
            subjects: vec![subject::dlq::ALL],
            storage: StorageClass::File,
            retention: Retention::Limits,
            max_age: 30 * DAY,
            max_bytes: Some(GIB),
            discard: Discard::Old,
            replicas: 1,
            duplicate_window: None,
        },
    ]
}

/// Durable name of the execution-core command consumer.
pub const EXECUTION_CORE_DURABLE: &str = "EXECUTION_CORE";

/// The canonical durable-consumer set.
#[must_use]
pub fn consumers() -> Vec<ConsumerSpec> {
    vec![
        ConsumerSpec {
            stream: "TITAN_CMD",
            durable: EXECUTION_CORE_DURABLE,
            filter_subject: "titan.cmd.execution.>",
            deliver_policy: DeliverPolicy::All,
            max_deliver: 5,
            ack_wait: Duration::from_secs(30),
            backoff: Some(vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(30),
            ]),
        },
        ConsumerSpec {
            stream: "TITAN_EVT",
            durable: "VENUE_STATUS",
            filter_subject: "titan.evt.venue.>",
            deliver_policy: DeliverPolicy::New,
            max_deliver: 3,
            ack_wait: Duration::from_secs(15),
            backoff: None,
        },
        ConsumerSpec {
            stream: "TITAN_EVT",
            durable: "TRADE_ANALYTICS",
            filter_subject: "titan.evt.trade.>",
            deliver_policy: DeliverPolicy::All,
            max_deliver: 3,
            ack_wait: Duration::from_secs(30),
            backoff: None,
        },
        ConsumerSpec {
            stream: "TITAN_DLQ",
            durable: "DLQ_MONITOR",
            filter_subject: subject::dlq::ALL,
            deliver_policy: DeliverPolicy::All,
            max_deliver: 3,
            ack_wait: Duration::from_secs(30),
            backoff: None,
        },
    ]
}

/// The canonical KV-bucket set.
#[must_use]
pub fn kv_buckets() -> Vec<KvSpec> {
    vec![
        KvSpec::named("TITAN_STATE"),
        KvSpec::named("TITAN_POLICY"),
        KvSpec {
            bucket: "TITAN_HEARTBEAT".to_string(),
            history: 1,
            ttl: Some(Duration::from_secs(60)),
            storage: StorageClass::Memory,
        },
    ]
}

/// The declared stream that would capture a subject, if any. Publishers use
/// this to decide between persistent and best-effort delivery.
#[must_use]
pub fn stream_for_subject(subj: &str) -> Option<StreamSpec> {
    streams().into_iter().find(|s| s.covers(subj))
}

/// The declared consumer with a given durable name, if any.
#[must_use]
pub fn consumer(durable: &str) -> Option<ConsumerSpec> {
    consumers().into_iter().find(|c| c.durable == durable)
}

/// Result of reconciling one declared object against the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyOutcome {
    /// Object was absent and has been created.
    Created,
    /// Object existed with divergent attributes and has been updated.
    Updated,
    /// Object already matched the declaration.
    Unchanged,
}

/// Aggregate report of one topology reconciliation pass.
///
/// `errors` is the observable counter required on start-up: a reconciliation
/// failure never aborts the fabric, but it must never be silent either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyReport {
    /// Streams created.
    pub streams_created: u32,
    /// Streams updated in place.
    pub streams_updated: u32,
    /// Consumers created.
    pub consumers_created: u32,
    /// Consumers updated in place.
    pub consumers_updated: u32,
    /// Create/update failures that were logged and skipped.
    pub errors: u32,
}

impl TopologyReport {
    /// Fold one stream outcome into the report.
    pub const fn record_stream(&mut self, outcome: TopologyOutcome) {
        match outcome {
            TopologyOutcome::Created => self.streams_created += 1,
            TopologyOutcome::Updated => self.streams_updated += 1,
            TopologyOutcome::Unchanged => {}
        }
    }

    /// Fold one consumer outcome into the report.
    pub const fn record_consumer(&mut self, outcome: TopologyOutcome) {
        match outcome {
            TopologyOutcome::Created => self.consumers_created += 1,
            TopologyOutcome::Updated => self.consumers_updated += 1,
            TopologyOutcome::Unchanged => {}
        }
    }
}
