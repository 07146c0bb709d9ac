//! Wire and persistence data model shared by every other `vigil-*` crate.
//!
//! All money, price and volume fields are fixed-point integers expressed in
//! micros (one unit = 1e-6). Using `i64` instead of `f64` for these fields
//! keeps arithmetic exact across the whole pipeline: a bar's close, a risk
//! limit and a ledger balance can be summed and compared without drift.
//! Indicator math (moving averages, RSI, ATR) stays float-based since it is
//! continuous by nature and lives in `vigil-indicators`, not here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scale factor for all `_micros` fields: 1 unit == 1_000_000 micros.
pub const MICROS_SCALE: i64 = 1_000_000;

/// Free-form metadata bag: opaque, string-keyed,
/// string-valued, and confined to the wire/persistence boundary — internal
/// fields that matter to control flow are always named struct fields, never
/// pulled back out of this bag.
pub type Metadata = BTreeMap<String, String>;

/// Envelope wrapping every event that crosses a wire or persistence
/// boundary, so that every event carries enough metadata to be traced,
/// replayed and attributed to a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub engine_id: String,
    pub ts_utc: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub topic: String,
    pub event_type: String,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(
        run_id: Uuid,
        engine_id: impl Into<String>,
        correlation_id: Uuid,
        causation_id: Option<Uuid>,
        topic: impl Into<String>,
        event_type: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            run_id,
            engine_id: engine_id.into(),
            ts_utc: Utc::now(),
            correlation_id,
            causation_id,
            topic: topic.into(),
            event_type: event_type.into(),
            payload,
        }
    }
}

/// A single closed price bar for one symbol/timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub ts_open_utc: DateTime<Utc>,
    pub ts_close_utc: DateTime<Utc>,
    pub timeframe_secs: u32,
    pub open_micros: i64,
    pub high_micros: i64,
    pub low_micros: i64,
    pub close_micros: i64,
    pub volume_micros: i64,
}

/// Directional bias of a generated trading signal or of an open position.
/// Deliberately distinct from the broker-facing `OrderSide` below: a signal
/// expresses a market view, an order expresses an instruction to a broker,
/// and the two vocabularies should not be conflated even where they happen
/// to line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

/// A trading decision emitted by a strategy for one symbol on one bar close.
/// `id` is the idempotency anchor for everything downstream: the execution
/// engine derives a deterministic `client_tag` from it, so a strategy that
/// re-emits the same signal (e.g. after a restart replays the same bar)
/// can never cause a duplicate order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub emitted_at_utc: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub reference_price_micros: i64,
    pub stop_loss_micros: Option<i64>,
    pub take_profit_micros: Option<i64>,
    pub confidence: f64,
    pub strategy_id: String,
    pub metadata: Metadata,
}

impl Signal {
    /// Deterministic idempotency key an execution engine derives a
    /// `client_tag` from. UUIDv5 over the signal id so the same signal
    /// (even replayed across a process restart) always maps to the same
    /// tag.
    pub fn client_tag(&self) -> String {
        let ns = Uuid::NAMESPACE_OID;
        let tag = Uuid::new_v5(&ns, self.id.as_bytes());
        format!("sig:{tag}")
    }
}

/// Buy/sell instruction sent to a broker. Distinct from `Side` (see above).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl From<Side> for OrderSide {
    fn from(s: Side) -> Self {
        match s {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }
}

/// Order shape requested of the broker: Market/Limit/Stop/
/// StopLimit; only `Market` and `Limit` carry a meaningful limit price in
/// this system (stop-entry order types are modelled for completeness but
/// unused by the reference strategy/exit rules, which always submit at
/// market or close at market).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// A sized, broker-agnostic order request produced by the risk gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_tag: String,
    pub symbol: String,
    pub side: OrderSide,
    pub volume_micros: i64,
    pub order_type: OrderType,
    /// The signal's reference price at emit-time. Carried on every order
    /// type, market included, so a dry-run/mock fill has something
    /// meaningful to fill at instead of an absent limit price.
    pub reference_price_micros: i64,
    pub limit_price_micros: Option<i64>,
    pub stop_loss_micros: Option<i64>,
    pub take_profit_micros: Option<i64>,
    /// Maximum acceptable slippage, in price points, for a market fill.
    pub deviation_points: u32,
    /// Written into every order this system places so the position tracker
    /// can distinguish its own orders from manual or third-party trades on
    /// the same account.
    pub magic_tag: u64,
}

impl OrderRequest {
    pub fn market(
        client_tag: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        volume_micros: i64,
        reference_price_micros: i64,
        magic_tag: u64,
    ) -> Self {
        Self {
            client_tag: client_tag.into(),
            symbol: symbol.into(),
            side,
            volume_micros,
            order_type: OrderType::Market,
            reference_price_micros,
            limit_price_micros: None,
            stop_loss_micros: None,
            take_profit_micros: None,
            deviation_points: 10,
            magic_tag,
        }
    }
}

/// Terminal outcome of submitting an `OrderRequest` to a broker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderOutcome {
    Placed {
        ticket: u64,
    },
    Filled {
        ticket: u64,
        fill_price_micros: i64,
        filled_volume_micros: i64,
        filled_at_utc: DateTime<Utc>,
        commission_micros: i64,
        swap_micros: i64,
    },
    PartiallyFilled {
        ticket: u64,
        fill_price_micros: i64,
        filled_volume_micros: i64,
        remaining_volume_micros: i64,
    },
    Rejected {
        reason: String,
    },
    Cancelled {
        ticket: u64,
    },
    Error {
        detail: String,
    },
}

impl OrderOutcome {
    pub fn ticket(&self) -> Option<u64> {
        match self {
            OrderOutcome::Placed { ticket }
            | OrderOutcome::Filled { ticket, .. }
            | OrderOutcome::PartiallyFilled { ticket, .. }
            | OrderOutcome::Cancelled { ticket } => Some(*ticket),
            OrderOutcome::Rejected { .. } | OrderOutcome::Error { .. } => None,
        }
    }
}

/// Where a tracked position came from: opened by this process, or found
/// already open on the broker and taken under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionOrigin {
    Native,
    Adopted,
}

/// A locally tracked open position keyed by broker ticket, matching the
/// ticket-per-position shape a retail broker exposes rather than a netted
/// symbol book. This is the broker-reported half of the record; the position tracker in `vigil-portfolio` wraps it with the
/// tracker-owned bookkeeping fields (`first_seen_time`, `origin`,
/// `metadata`) that only make sense once a position is under management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume_micros: i64,
    pub open_price_micros: i64,
    pub open_time_utc: DateTime<Utc>,
    pub current_price_micros: i64,
    pub stop_loss_micros: Option<i64>,
    pub take_profit_micros: Option<i64>,
    pub unrealized_pnl_micros: i64,
    pub realized_pnl_micros: i64,
    pub commission_micros: i64,
    pub swap_micros: i64,
}

impl PositionRecord {
    /// Unrealized PnL in micros at the given mark price.
    pub fn compute_unrealized_pnl_micros(&self, mark_price_micros: i64) -> i64 {
        let diff = match self.side {
            Side::Long => mark_price_micros as i128 - self.open_price_micros as i128,
            Side::Short => self.open_price_micros as i128 - mark_price_micros as i128,
        };
        let pnl = diff * self.volume_micros as i128 / MICROS_SCALE as i128;
        i128_to_i64_clamp(pnl)
    }

    /// Refresh `current_price_micros` and `unrealized_pnl_micros` together,
    /// enforcing the invariant that the two are always consistent with each
    /// other.
    pub fn refresh_mark(&mut self, mark_price_micros: i64) {
        self.current_price_micros = mark_price_micros;
        self.unrealized_pnl_micros = self.compute_unrealized_pnl_micros(mark_price_micros);
    }
}

pub fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

/// Broker-reported account state as of `server_time`, used by the risk gate
/// and the reconciliation pass. `server_time` is the broker's own clock and
/// is what the circuit breaker's daily-rollover check keys off, not the
/// local wall clock, so that a local clock skew can never mask or
/// artificially trigger a reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub server_time: DateTime<Utc>,
    pub equity_micros: i64,
    pub balance_micros: i64,
    pub margin_used_micros: i64,
    pub margin_free_micros: i64,
    pub realized_today_micros: i64,
    pub trading_enabled: bool,
    pub open_positions: Vec<PositionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            emitted_at_utc: Utc::now(),
            symbol: "EURUSD".into(),
            side: Side::Long,
            reference_price_micros: 1_100_000,
            stop_loss_micros: None,
            take_profit_micros: None,
            confidence: 0.8,
            strategy_id: "ma_cross".into(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn opposite_side_round_trips() {
        assert_eq!(Side::Long.opposite().opposite(), Side::Long);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn side_to_order_side_maps_long_to_buy() {
        assert_eq!(OrderSide::from(Side::Long), OrderSide::Buy);
        assert_eq!(OrderSide::from(Side::Short), OrderSide::Sell);
    }

    #[test]
    fn client_tag_is_deterministic_over_signal_id() {
        let s = sig();
        assert_eq!(s.client_tag(), s.client_tag());
        let mut other = sig();
        other.id = s.id;
        assert_eq!(s.client_tag(), other.client_tag());
    }

    #[test]
    fn client_tag_differs_across_signal_ids() {
        let a = sig();
        let b = sig();
        assert_ne!(a.client_tag(), b.client_tag());
    }

    #[test]
    fn unrealized_pnl_long_position_gains_on_rally() {
        let pos = PositionRecord {
            ticket: 1,
            symbol: "EURUSD".into(),
            side: Side::Long,
            volume_micros: 10 * MICROS_SCALE,
            open_price_micros: 1_100_000,
            open_time_utc: Utc::now(),
            current_price_micros: 1_100_000,
            stop_loss_micros: None,
            take_profit_micros: None,
            unrealized_pnl_micros: 0,
            realized_pnl_micros: 0,
            commission_micros: 0,
            swap_micros: 0,
        };
        let mark = pos.open_price_micros + MICROS_SCALE / 1000;
        assert!(pos.compute_unrealized_pnl_micros(mark) > 0);
    }

    #[test]
    fn unrealized_pnl_short_position_gains_on_selloff() {
        let mut pos = PositionRecord {
            ticket: 2,
            symbol: "EURUSD".into(),
            side: Side::Short,
            volume_micros: 10 * MICROS_SCALE,
            open_price_micros: 1_100_000,
            open_time_utc: Utc::now(),
            current_price_micros: 1_100_000,
            stop_loss_micros: None,
            take_profit_micros: None,
            unrealized_pnl_micros: 0,
            realized_pnl_micros: 0,
            commission_micros: 0,
            swap_micros: 0,
        };
        let mark = pos.open_price_micros - MICROS_SCALE / 1000;
        pos.refresh_mark(mark);
        assert!(pos.unrealized_pnl_micros > 0);
        assert_eq!(pos.current_price_micros, mark);
    }
}
