//! Deterministic in-memory broker session used by tests and dry runs.
//!
//! No randomness, no wall-clock reads beyond `Utc::now()` for event
//! timestamps. Resubmitting a known `client_tag` is a no-op that returns
//! the cached outcome rather than a second fill. `seed_bars`/`push_bar` let
//! tests script an exact bar sequence, and `seed_position`/`remove_position`
//! let tests simulate a manual or externally-closed position for the
//! reconcile/adoption and closed-externally paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use vigil_schemas::{
    AccountSnapshot, Bar, OrderOutcome, OrderRequest, OrderSide, PositionRecord, Side,
};

use crate::{BrokerFault, BrokerSession};

struct State {
    next_ticket: AtomicU64,
    outcomes_by_tag: Mutex<BTreeMap<String, OrderOutcome>>,
    positions: Mutex<BTreeMap<u64, PositionRecord>>,
    bars: Mutex<BTreeMap<String, Vec<Bar>>>,
    cash_micros: Mutex<i64>,
    realized_today_micros: Mutex<i64>,
    server_time: Mutex<chrono::DateTime<Utc>>,
    healthy: AtomicBool,
}

/// Deterministic paper broker. Fills immediately at the requested limit
/// price (or at an arbitrary mark of zero slippage when unset), tracks
/// positions by ticket, and is idempotent by `client_tag`.
pub struct MockBrokerSession {
    state: State,
}

impl Default for MockBrokerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerSession {
    pub fn new() -> Self {
        Self {
            state: State {
                next_ticket: AtomicU64::new(1),
                outcomes_by_tag: Mutex::new(BTreeMap::new()),
                positions: Mutex::new(BTreeMap::new()),
                bars: Mutex::new(BTreeMap::new()),
                cash_micros: Mutex::new(100_000 * vigil_schemas::MICROS_SCALE),
                realized_today_micros: Mutex::new(0),
                server_time: Mutex::new(Utc::now()),
                healthy: AtomicBool::new(true),
            },
        }
    }

    pub fn with_starting_cash(cash_micros: i64) -> Self {
        let s = Self::new();
        *s.state.cash_micros.lock().unwrap() = cash_micros;
        s
    }

    /// Test/setup hook: seed an open position directly, bypassing submit.
    pub fn seed_position(&self, pos: PositionRecord) {
        self.state.positions.lock().unwrap().insert(pos.ticket, pos);
    }

    /// Test/setup hook: remove a position without going through
    /// `close_position`, simulating a manual close on the broker side that
    /// the tracker only discovers on its next `Monitor`/`Reconcile` pass.
    pub fn remove_position_externally(&self, ticket: u64) {
        self.state.positions.lock().unwrap().remove(&ticket);
    }

    pub fn next_ticket_preview(&self) -> u64 {
        self.state.next_ticket.load(Ordering::SeqCst)
    }

    /// Append a bar to the feed returned by `fetch_bars` for `symbol`.
    pub fn push_bar(&self, symbol: &str, bar: Bar) {
        self.state
            .bars
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .push(bar);
    }

    pub fn set_server_time(&self, t: chrono::DateTime<Utc>) {
        *self.state.server_time.lock().unwrap() = t;
    }

    pub fn set_realized_today_micros(&self, v: i64) {
        *self.state.realized_today_micros.lock().unwrap() = v;
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.state.healthy.store(!unhealthy, Ordering::SeqCst);
    }

    /// Move every tracked position's mark by `delta_micros` against the
    /// stored entry price, so tests can script adverse/favourable price
    /// movement without reconstructing bars.
    pub fn set_mark_price(&self, ticket: u64, price_micros: i64) {
        if let Some(pos) = self.state.positions.lock().unwrap().get_mut(&ticket) {
            pos.refresh_mark(price_micros);
        }
    }
}

#[async_trait]
impl BrokerSession for MockBrokerSession {
    async fn health_probe(&self) -> Result<(), BrokerFault> {
        if self.state.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerFault::Transient("mock broker marked unhealthy".into()))
        }
    }

    async fn reconnect(&self) -> Result<(), BrokerFault> {
        self.state.healthy.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        _timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Bar>, BrokerFault> {
        let bars = self.state.bars.lock().unwrap();
        let Some(series) = bars.get(symbol) else {
            return Ok(Vec::new());
        };
        let start = series.len().saturating_sub(count);
        Ok(series[start..].to_vec())
    }

    async fn account_snapshot(&self, _magic_tag: u64) -> Result<AccountSnapshot, BrokerFault> {
        let positions: Vec<PositionRecord> =
            self.state.positions.lock().unwrap().values().cloned().collect();
        let cash = *self.state.cash_micros.lock().unwrap();
        let realized_today = *self.state.realized_today_micros.lock().unwrap();
        let server_time = *self.state.server_time.lock().unwrap();
        Ok(AccountSnapshot {
            server_time,
            equity_micros: cash,
            balance_micros: cash,
            margin_used_micros: 0,
            margin_free_micros: cash,
            realized_today_micros: realized_today,
            trading_enabled: true,
            open_positions: positions,
        })
    }

    async fn open_positions(&self, _magic_tag: u64) -> Result<Vec<PositionRecord>, BrokerFault> {
        Ok(self.state.positions.lock().unwrap().values().cloned().collect())
    }

    async fn submit_order(&self, req: OrderRequest) -> Result<OrderOutcome, BrokerFault> {
        let mut outcomes = self.state.outcomes_by_tag.lock().unwrap();
        if let Some(existing) = outcomes.get(&req.client_tag) {
            return Ok(existing.clone());
        }

        if req.volume_micros <= 0 {
            let outcome = OrderOutcome::Rejected {
                reason: "volume_micros must be positive".to_string(),
            };
            outcomes.insert(req.client_tag.clone(), outcome.clone());
            return Ok(outcome);
        }

        let ticket = self.state.next_ticket.fetch_add(1, Ordering::SeqCst);
        let fill_price = req.limit_price_micros.unwrap_or(req.reference_price_micros);

        let side = match req.side {
            OrderSide::Buy => Side::Long,
            OrderSide::Sell => Side::Short,
        };

        let position = PositionRecord {
            ticket,
            symbol: req.symbol.clone(),
            side,
            volume_micros: req.volume_micros,
            open_price_micros: fill_price,
            open_time_utc: Utc::now(),
            current_price_micros: fill_price,
            stop_loss_micros: req.stop_loss_micros,
            take_profit_micros: req.take_profit_micros,
            unrealized_pnl_micros: 0,
            realized_pnl_micros: 0,
            commission_micros: 0,
            swap_micros: 0,
        };
        self.state.positions.lock().unwrap().insert(ticket, position);

        let outcome = OrderOutcome::Filled {
            ticket,
            fill_price_micros: fill_price,
            filled_volume_micros: req.volume_micros,
            filled_at_utc: Utc::now(),
            commission_micros: 0,
            swap_micros: 0,
        };
        outcomes.insert(req.client_tag.clone(), outcome.clone());
        Ok(outcome)
    }

    async fn close_position(
        &self,
        ticket: u64,
        volume_micros: i64,
    ) -> Result<OrderOutcome, BrokerFault> {
        let mut positions = self.state.positions.lock().unwrap();
        let Some(pos) = positions.get(&ticket) else {
            return Ok(OrderOutcome::Rejected {
                reason: format!("no open position for ticket {ticket}"),
            });
        };

        let close_vol = volume_micros.min(pos.volume_micros);
        let exit_price = pos.current_price_micros;
        let realized = pos.compute_unrealized_pnl_micros(exit_price) * close_vol
            / pos.volume_micros.max(1);

        if close_vol >= pos.volume_micros {
            positions.remove(&ticket);
        } else if let Some(pos) = positions.get_mut(&ticket) {
            pos.volume_micros -= close_vol;
        }
        drop(positions);

        *self.state.realized_today_micros.lock().unwrap() += realized;

        Ok(OrderOutcome::Filled {
            ticket,
            fill_price_micros: exit_price,
            filled_volume_micros: close_vol,
            filled_at_utc: Utc::now(),
            commission_micros: 0,
            swap_micros: 0,
        })
    }

    async fn poll_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault> {
        let positions = self.state.positions.lock().unwrap();
        match positions.get(&ticket) {
            Some(pos) => Ok(OrderOutcome::Filled {
                ticket,
                fill_price_micros: pos.open_price_micros,
                filled_volume_micros: pos.volume_micros,
                filled_at_utc: pos.open_time_utc,
                commission_micros: 0,
                swap_micros: 0,
            }),
            None => Ok(OrderOutcome::Cancelled { ticket }),
        }
    }

    async fn cancel_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault> {
        Ok(OrderOutcome::Cancelled { ticket })
    }
}
