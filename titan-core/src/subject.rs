//! The canonical subject catalog.
//!
//! Single source of truth for every subject the fabric publishes or consumes.
//! Raw subject string literals must never appear outside this module: every
//! other component composes subjects through the constants and constructors
//! below.
//!
//! Grammar (breaking changes require a new `vN` suffix):
//!
//! ```text
//! titan . (cmd|evt|data|signal|sys|dlq) . {domain} . {action|event|type} . v{n}
//!        [. {venue} . {account} . {symbol}]
//! ```

/// Fixed first token of every fabric subject.
pub const ROOT: &str = "titan";

/// Second-token class of a standard subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectClass {
    /// Requests that cause side effects when accepted.
    Cmd,
    /// Immutable facts about something that already happened.
    Evt,
    /// High-frequency telemetry, not intended for audit.
    Data,
    /// Legacy signal submissions (decommissioning).
    Signal,
    /// Fabric-internal health and control.
    Sys,
    /// Messages that failed terminal processing.
    Dlq,
}

impl SubjectClass {
    /// All recognized classes, in taxonomy order.
    pub const ALL: [Self; 6] = [
        Self::Cmd,
        Self::Evt,
        Self::Data,
        Self::Signal,
        Self::Sys,
        Self::Dlq,
    ];

    /// The wire token for this class.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Cmd => "cmd",
            Self::Evt => "evt",
            Self::Data => "data",
            Self::Signal => "signal",
            Self::Sys => "sys",
            Self::Dlq => "dlq",
        }
    }

    /// Parse a wire token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token)
    }
}

/// Classify a subject string: standard subjects start with `titan.` followed
/// by one of the six recognized class tokens.
#[must_use]
pub fn classify(subject: &str) -> Option<SubjectClass> {
    let mut parts = subject.split('.');
    if parts.next() != Some(ROOT) {
        return None;
    }
    parts.next().and_then(SubjectClass::from_token)
}

/// Whether a subject belongs to the standard taxonomy.
#[must_use]
pub fn is_standard_subject(subject: &str) -> bool {
    classify(subject).is_some()
}

/// Replace the `/` separator of venue symbols with the subject-safe `_`.
#[must_use]
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.replace('/', "_")
}

/// NATS-style wildcard match: `*` matches exactly one token, a trailing `>`
/// matches one or more remaining tokens.
#[must_use]
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut f = filter.split('.');
    let mut s = subject.split('.');
    loop {
        match (f.next(), s.next()) {
            (Some(">"), Some(_)) => return true,
            (Some(">"), None) => return false,
            (Some("*"), Some(_)) => {}
            (Some(ft), Some(st)) if ft == st => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn routed(prefix: &str, venue: &str, account: &str, symbol: &str) -> String {
    format!("{prefix}.{venue}.{account}.{}", normalize_symbol(symbol))
}

/// Command subjects (`titan.cmd.>`).
pub mod cmd {
    use super::{normalize_symbol, routed};

    /// Bare class prefix.
    pub const PREFIX: &str = "titan.cmd";
    /// Class-wide wildcard.
    pub const ALL: &str = "titan.cmd.>";

    /// Halt all trading immediately.
    pub const SYS_HALT: &str = "titan.cmd.sys.halt.v1";
    /// Resume trading after a halt.
    pub const SYS_RESUME: &str = "titan.cmd.sys.resume.v1";
    /// Ask a component to re-read its configuration tree.
    pub const CONFIG_RELOAD: &str = "titan.cmd.config.reload.v1";

    /// Prefix of order-placement commands; routed per venue/account/symbol.
    pub const EXECUTION_PLACE: &str = "titan.cmd.execution.place.v1";
    /// Prefix of order-cancellation commands.
    pub const EXECUTION_CANCEL: &str = "titan.cmd.execution.cancel.v1";

    /// Order placement routed to one venue/account/symbol.
    #[must_use]
    pub fn execution_place(venue: &str, account: &str, symbol: &str) -> String {
        routed(EXECUTION_PLACE, venue, account, symbol)
    }

    /// Order cancellation routed to one venue/account/symbol.
    #[must_use]
    pub fn execution_cancel(venue: &str, account: &str, symbol: &str) -> String {
        routed(EXECUTION_CANCEL, venue, account, symbol)
    }

    /// All placement commands for one venue.
    #[must_use]
    pub fn execution_place_venue(venue: &str) -> String {
        format!("{EXECUTION_PLACE}.{venue}.>")
    }

    /// All placement commands for one symbol on any venue/account.
    #[must_use]
    pub fn execution_place_symbol(symbol: &str) -> String {
        format!("{EXECUTION_PLACE}.*.*.{}", normalize_symbol(symbol))
    }
}

/// Event subjects (`titan.evt.>`). Events mirror the routing tail of the
/// command that caused them so consumers can filter per venue.
pub mod evt {
    use super::routed;

    /// Bare class prefix.
    pub const PREFIX: &str = "titan.evt";
    /// Class-wide wildcard.
    pub const ALL: &str = "titan.evt.>";

    /// Prefix of order-accepted lifecycle events.
    pub const EXECUTION_PLACED: &str = "titan.evt.execution.placed.v1";
    /// Prefix of fill lifecycle events.
    pub const EXECUTION_FILLED: &str = "titan.evt.execution.filled.v1";
    /// Prefix of rejection lifecycle events.
    pub const EXECUTION_REJECTED: &str = "titan.evt.execution.rejected.v1";
    /// Prefix of closed-trade analytics events.
    pub const TRADE_CLOSED: &str = "titan.evt.trade.closed.v1";
    /// Prefix of venue connectivity events.
    pub const VENUE_STATUS: &str = "titan.evt.venue.status.v1";

    /// Brain optimization metrics (canonical home of the legacy metrics feed).
    pub const BRAIN_METRICS: &str = "titan.evt.brain.metrics.v1";
    /// Brain risk-constraint snapshots.
    pub const BRAIN_CONSTRAINTS: &str = "titan.evt.brain.constraints.v1";
    /// Signal submissions consumed by the decision component.
    pub const BRAIN_SIGNAL: &str = "titan.evt.brain.signal.v1";
    /// Configuration-change notifications.
    pub const CONFIG_CHANGED: &str = "titan.evt.config.changed.v1";

    /// Order accepted on one venue/account/symbol.
    #[must_use]
    pub fn execution_placed(venue: &str, account: &str, symbol: &str) -> String {
        routed(EXECUTION_PLACED, venue, account, symbol)
    }

    /// Order filled on one venue/account/symbol.
    #[must_use]
    pub fn execution_filled(venue: &str, account: &str, symbol: &str) -> String {
        routed(EXECUTION_FILLED, venue, account, symbol)
    }

    /// Order rejected on one venue/account/symbol.
    #[must_use]
    pub fn execution_rejected(venue: &str, account: &str, symbol: &str) -> String {
        routed(EXECUTION_REJECTED, venue, account, symbol)
    }

    /// Trade closed on one venue/account/symbol.
    #[must_use]
    pub fn trade_closed(venue: &str, account: &str, symbol: &str) -> String {
        routed(TRADE_CLOSED, venue, account, symbol)
    }

    /// Connectivity status of one venue.
    #[must_use]
    pub fn venue_status(venue: &str) -> String {
        format!("{VENUE_STATUS}.{venue}")
    }
}

/// Data subjects (`titan.data.>`): high-frequency telemetry.
pub mod data {
    use super::normalize_symbol;

    /// Bare class prefix.
    pub const PREFIX: &str = "titan.data";
    /// Class-wide wildcard.
    pub const ALL: &str = "titan.data.>";

    /// Prefix of top-of-book ticker frames.
    pub const MARKET_TICKER: &str = "titan.data.market.ticker.v1";
    /// Prefix of depth snapshots.
    pub const MARKET_DEPTH: &str = "titan.data.market.depth.v1";
    /// Brain liveness heartbeat.
    pub const BRAIN_HEARTBEAT: &str = "titan.data.brain.heartbeat.v1";

    /// Ticker frames for one venue/symbol.
    #[must_use]
    pub fn market_ticker(venue: &str, symbol: &str) -> String {
        format!("{MARKET_TICKER}.{venue}.{}", normalize_symbol(symbol))
    }

    /// Depth snapshots for one venue/symbol.
    #[must_use]
    pub fn market_depth(venue: &str, symbol: &str) -> String {
        format!("{MARKET_DEPTH}.{venue}.{}", normalize_symbol(symbol))
    }
}

/// Signal subjects (`titan.signal.>`). The class survives only for the
/// decommissioning `TITAN_SIGNAL` stream; new signal traffic uses
/// [`evt::BRAIN_SIGNAL`].
pub mod signal {
    /// Bare class prefix.
    pub const PREFIX: &str = "titan.signal";
    /// Class-wide wildcard.
    pub const ALL: &str = "titan.signal.>";

    /// Legacy signal submission subject.
    pub const SUBMIT: &str = "titan.signal.submit.v1";
}

/// System subjects (`titan.sys.>`).
pub mod sys {
    /// Bare class prefix.
    pub const PREFIX: &str = "titan.sys";
    /// Class-wide wildcard.
    pub const ALL: &str = "titan.sys.>";

    /// Component health reports.
    pub const HEALTH: &str = "titan.sys.health.v1";
    /// Component readiness announcements.
    pub const READY: &str = "titan.sys.ready.v1";
}

/// Dead-letter subjects (`titan.dlq.>`). Derived from the failing subject, so
/// these carry no version suffix of their own.
pub mod dlq {
    /// Bare class prefix.
    pub const PREFIX: &str = "titan.dlq";
    /// Class-wide wildcard, watched by the DLQ monitor.
    pub const ALL: &str = "titan.dlq.>";

    /// Dead letters produced by intent-schema validation in front of the
    /// execution core.
    pub const EXECUTION_CORE: &str = "titan.dlq.execution.core";

    /// Dead-letter subject for a failing subject: `titan.dlq.<suffix>` when
    /// the original is under `titan.`, `titan.dlq.unknown.<subject>` otherwise.
    #[must_use]
    pub fn for_subject(original: &str) -> String {
        original.strip_prefix("titan.").map_or_else(
            || format!("{PREFIX}.unknown.{original}"),
            |suffix| format!("{PREFIX}.{suffix}"),
        )
    }

    /// Overflow subject the broker writes to once a durable exhausts
    /// `max_deliver`.
    #[must_use]
    pub fn overflow(durable: &str) -> String {
        format!("{PREFIX}.overflow.{}", durable.to_ascii_lowercase())
    }
}

/// Request/reply subjects. These predate the six-class taxonomy and are
/// deliberately non-standard; [`is_standard_subject`] returns false for them.
pub mod req {
    /// Policy-hash handshake between the decision and execution components.
    pub const POLICY_HASH: &str = "titan.req.exec.policy_hash.v1";
}

/// Deprecated subjects retained during the migration window.
pub mod legacy {
    use super::{evt, normalize_symbol, signal};

    /// Date after which the legacy publications stop.
    pub const SUNSET_DATE: &str = "2026-09-30";

    /// Pre-taxonomy signal submission subject.
    pub const SIGNAL_SUBMIT: &str = signal::SUBMIT;
    /// Pre-taxonomy execution dead-letter subject.
    pub const EXECUTION_DLQ: &str = "titan.execution.dlq";
    /// Pre-taxonomy brain metrics prefix.
    pub const BRAIN_METRICS: &str = "titan.brain.metrics";
    /// Pre-taxonomy brain constraints prefix.
    pub const BRAIN_CONSTRAINTS: &str = "titan.brain.constraints";

    /// Map from each deprecated subject (or prefix) to its replacement.
    /// Injective: no two legacy entries share a replacement.
    #[must_use]
    pub fn migration_map() -> &'static [(&'static str, &'static str)] {
        &[
            (SIGNAL_SUBMIT, evt::BRAIN_SIGNAL),
            (EXECUTION_DLQ, super::dlq::EXECUTION_CORE),
            (BRAIN_METRICS, evt::BRAIN_METRICS),
            (BRAIN_CONSTRAINTS, evt::BRAIN_CONSTRAINTS),
        ]
    }

    /// Legacy metrics feed for one venue/symbol.
    #[must_use]
    pub fn brain_metrics(venue: &str, symbol: &str) -> String {
        format!("{BRAIN_METRICS}.{venue}.{}", normalize_symbol(symbol))
    }

    /// Legacy constraints feed for one venue/symbol.
    #[must_use]
    pub fn brain_constraints(venue: &str, symbol: &str) -> String {
        format!("{BRAIN_CONSTRAINTS}.{venue}.{}", normalize_symbol(symbol))
    }
}

/// Message families still published to both the canonical and the legacy
/// subject during the migration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DualPublishTag {
    /// Brain optimization metrics.
    Metrics,
    /// Brain risk-constraint snapshots.
    Constraints,
}

/// The ordered `[canonical, legacy]` pair for a dual-published family,
/// routed per venue/symbol. Publishers emit to both until
/// [`legacy::SUNSET_DATE`] passes.
#[must_use]
pub fn dual_publish_subjects(tag: DualPublishTag, venue: &str, symbol: &str) -> [String; 2] {
    let norm = normalize_symbol(symbol);
    match tag {
        DualPublishTag::Metrics => [
            format!("{}.{venue}.{norm}", evt::BRAIN_METRICS),
            legacy::brain_metrics(venue, symbol),
        ],
        DualPublishTag::Constraints => [
            format!("{}.{venue}.{norm}", evt::BRAIN_CONSTRAINTS),
            legacy::brain_constraints(venue, symbol),
        ],
    }
}

/// Every subject in the standard taxonomy: all literal constants plus one
/// representative output per constructor. Drives the catalog totality checks.
#[must_use]
pub fn standard_subjects() -> Vec<String> {
    let mut out: Vec<String> = [
        cmd::SYS_HALT,
        cmd::SYS_RESUME,
        cmd::CONFIG_RELOAD,
        cmd::EXECUTION_PLACE,
        cmd::EXECUTION_CANCEL,
        evt::EXECUTION_PLACED,
        evt::EXECUTION_FILLED,
        evt::EXECUTION_REJECTED,
        evt::TRADE_CLOSED,
        evt::VENUE_STATUS,
        evt::BRAIN_METRICS,
        evt::BRAIN_CONSTRAINTS,
        evt::BRAIN_SIGNAL,
        evt::CONFIG_CHANGED,
        data::MARKET_TICKER,
        data::MARKET_DEPTH,
        data::BRAIN_HEARTBEAT,
        signal::SUBMIT,
        sys::HEALTH,
        sys::READY,
        dlq::EXECUTION_CORE,
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    out.push(cmd::execution_place("bybit", "main", "BTC/USDT"));
    out.push(cmd::execution_cancel("bybit", "main", "BTC/USDT"));
    out.push(evt::execution_placed("bybit", "main", "BTC/USDT"));
    out.push(evt::execution_filled("bybit", "main", "BTC/USDT"));
    out.push(evt::execution_rejected("bybit", "main", "BTC/USDT"));
    out.push(evt::trade_closed("bybit", "main", "BTC/USDT"));
    out.push(evt::venue_status("bybit"));
    out.push(data::market_ticker("bybit", "BTC/USDT"));
    out.push(data::market_depth("bybit", "BTC/USDT"));
    out.push(dlq::for_subject(cmd::SYS_HALT));
    out.push(dlq::overflow("EXECUTION_CORE"));
    out
}
