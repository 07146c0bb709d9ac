use chrono::{DateTime, Utc};
use vigil_schemas::{Metadata, PositionOrigin, PositionRecord};

/// A tracked position wraps the broker-reported `PositionRecord` with the
/// bookkeeping fields that only make sense once a position is under this
/// tracker's management. Kept as a separate type rather than folding these
/// fields into `PositionRecord` itself, so the wire-level schema stays a
/// lean broker-reported snapshot and tracker-only bookkeeping never leaks
/// across a persistence or broker boundary.
#[derive(Debug, Clone)]
pub struct TrackedPosition {
    pub record: PositionRecord,
    pub origin: PositionOrigin,
    pub first_seen_time: DateTime<Utc>,
    pub metadata: Metadata,
}

impl TrackedPosition {
    pub fn native(record: PositionRecord, now: DateTime<Utc>) -> Self {
        Self {
            record,
            origin: PositionOrigin::Native,
            first_seen_time: now,
            metadata: Metadata::new(),
        }
    }

    pub fn adopted(record: PositionRecord, now: DateTime<Utc>) -> Self {
        Self {
            record,
            origin: PositionOrigin::Adopted,
            first_seen_time: now,
            metadata: Metadata::new(),
        }
    }

    pub fn ticket(&self) -> u64 {
        self.record.ticket
    }
}

/// A closed position handed off to the persistence sink as a best-effort
/// trade record, produced by both `monitor` and `close`.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub ticket: u64,
    pub symbol: String,
    pub volume_micros: i64,
    pub open_price_micros: i64,
    pub exit_price_micros: i64,
    pub realized_pnl_micros: i64,
    pub commission_micros: i64,
    pub swap_micros: i64,
    pub opened_at_utc: DateTime<Utc>,
    pub closed_at_utc: DateTime<Utc>,
    pub reason: String,
    pub closed_externally: bool,
}

/// Configurable adoption policy governing which broker-reported positions
/// this process is allowed to take under management when it did not open
/// them itself.
#[derive(Debug, Clone)]
pub struct AdoptionPolicy {
    /// Empty means "all symbols adoptable".
    pub symbol_whitelist: Vec<String>,
    pub symbol_blacklist: Vec<String>,
    pub max_age: chrono::Duration,
    /// Report orphans without taking ownership of them.
    pub log_only: bool,
}

impl Default for AdoptionPolicy {
    fn default() -> Self {
        Self {
            symbol_whitelist: Vec::new(),
            symbol_blacklist: Vec::new(),
            max_age: chrono::Duration::hours(24),
            log_only: false,
        }
    }
}

/// Outcome of applying `AdoptionPolicy` to one orphaned broker position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdoptionDecision {
    Adopt,
    Refuse { reason: String },
    LogOnly,
}

/// Per-ticket reconciliation verdict: this tracker manages individual
/// broker tickets rather than a netted symbol book, so each ticket is
/// diffed independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Refresh { ticket: u64 },
    Adopt { ticket: u64 },
    AdoptRefused { ticket: u64, reason: String },
    CloseExternally { ticket: u64 },
}
