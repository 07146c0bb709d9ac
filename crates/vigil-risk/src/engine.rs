//! Pure risk-gate evaluation. No IO, no broker calls — every input is
//! passed in explicitly, which is what makes `evaluate` unit-testable
//! against every scenario without a mock broker.

use chrono::{DateTime, Utc};

use crate::types::{server_date, RefusalCode, RiskDecision, RiskInput, RiskLimits, RiskState};

/// Advance `state` for the start of a new tick: detect a server-date
/// rollover (which resets the daily-loss accumulator and clears a sticky
/// circuit breaker) and refresh peak-equity for the
/// emergency-drawdown check. Must be called once per tick before
/// `evaluate`.
pub fn tick(state: &mut RiskState, account_server_time: DateTime<Utc>, equity_micros: i64) {
    let today = server_date(account_server_time);
    match state.last_server_date {
        Some(prev) if prev == today => {}
        _ => {
            // First tick of a new server-day (or the very first tick ever):
            // reset the daily accumulator and any sticky breaker it tripped.
            if state.last_server_date.is_some() {
                state.realized_today_micros = 0;
                state.circuit_breaker_open = false;
            }
            state.last_server_date = Some(today);
        }
    }

    if state.session_start_equity_micros.is_none() {
        state.session_start_equity_micros = Some(equity_micros);
    }
    state.peak_equity_micros = Some(match state.peak_equity_micros {
        Some(peak) => peak.max(equity_micros),
        None => equity_micros,
    });
}

/// Record a confirmed position close's realized PnL against the running
/// daily accumulator, tripping the circuit breaker if the configured daily
/// loss threshold is breached. Called by the control loop immediately
/// after every confirmed close.
pub fn record_realized_close(state: &mut RiskState, limits: &RiskLimits, realized_pnl_micros: i64) {
    state.realized_today_micros += realized_pnl_micros;
    if limits.circuit_breaker_enabled
        && state.realized_today_micros < 0
        && state.realized_today_micros.unsigned_abs() as i64 >= limits.max_daily_loss_micros
    {
        state.circuit_breaker_open = true;
    }
}

/// Whether the current equity has dropped from the session's peak by more
/// than `emergency_drawdown_fraction`. The control loop treats `true` as
/// fatal-in-trading: flatten and halt entries, but keep monitoring residual
/// positions.
pub fn check_emergency_drawdown(state: &RiskState, limits: &RiskLimits, equity_micros: i64) -> bool {
    let Some(peak) = state.peak_equity_micros else {
        return false;
    };
    if peak <= 0 {
        return false;
    }
    let drawdown = (peak - equity_micros) as f64 / peak as f64;
    drawdown >= limits.emergency_drawdown_fraction
}

/// Sizing policy, in precedence order:
/// 1. Stop-based: size so `(reference_price - stop) * volume ≈ balance *
///    position_size_pct`, clamped to `[broker_min, max_volume_per_order]`.
/// 2. Else `default_volume`, clamped the same way.
/// Result is quantised down to the nearest `lot_step_micros`.
pub fn size_order(limits: &RiskLimits, balance_micros: i64, input: &RiskInput) -> i64 {
    let raw_volume = match input.stop_loss_micros {
        Some(stop) => {
            let risk_per_unit = (input.reference_price_micros - stop).unsigned_abs() as i64;
            if risk_per_unit == 0 {
                limits.default_volume_micros
            } else {
                let risk_budget_micros =
                    (balance_micros as i128 * (limits.position_size_pct * MICROS_F64) as i128)
                        / crate::types::MICROS_SCALE as i128;
                let vol = risk_budget_micros * crate::types::MICROS_SCALE as i128
                    / risk_per_unit as i128;
                vol.clamp(0, i64::MAX as i128) as i64
            }
        }
        None => limits.default_volume_micros,
    };

    let clamped = raw_volume
        .max(limits.broker_min_volume_micros)
        .min(limits.max_volume_per_order_micros);

    quantise_to_lot_step(clamped, limits.lot_step_micros)
}

const MICROS_F64: f64 = 1_000_000.0;

fn quantise_to_lot_step(volume_micros: i64, lot_step_micros: i64) -> i64 {
    if lot_step_micros <= 0 {
        return volume_micros;
    }
    (volume_micros / lot_step_micros) * lot_step_micros
}

/// Fails closed (before running the rest of the evaluation chain) on
/// malformed upstream input: negative equity, or a non-positive reference
/// price: an arithmetic overflow in the
/// sizing formula from a corrupt upstream value should never produce a
/// nonsensical approved volume.
fn validate_inputs(balance_micros: i64, input: &RiskInput) -> Option<RiskDecision> {
    if balance_micros < 0 {
        return Some(RiskDecision::refuse(
            RefusalCode::InsufficientMargin,
            "account balance is negative",
        ));
    }
    if input.reference_price_micros <= 0 {
        return Some(RiskDecision::refuse(
            RefusalCode::ZeroOrNegativeSize,
            "signal reference price must be positive",
        ));
    }
    None
}

/// Evaluate one candidate signal against current limits/state/account and
/// produce an `Approved{volume}` or a typed `Refused`. Precedence matches
/// The refusal-code table is read top to bottom; the first
/// violation found wins.
pub fn evaluate(
    limits: &RiskLimits,
    state: &RiskState,
    trading_enabled: bool,
    balance_micros: i64,
    margin_free_micros: i64,
    input: &RiskInput,
) -> RiskDecision {
    if let Some(refused) = validate_inputs(balance_micros, input) {
        return refused;
    }

    if !trading_enabled {
        return RiskDecision::refuse(RefusalCode::TradingDisabled, "broker reports trading disabled");
    }

    if limits.circuit_breaker_enabled && state.circuit_breaker_open {
        return RiskDecision::refuse(
            RefusalCode::CircuitBreakerOpen,
            "daily loss threshold breached; refusing entries until server-date rollover",
        );
    }

    if input.open_positions_for_symbol >= limits.max_positions_per_symbol {
        return RiskDecision::refuse(
            RefusalCode::SymbolCap,
            format!(
                "symbol {} already has {} open position(s), cap is {}",
                input.symbol, input.open_positions_for_symbol, limits.max_positions_per_symbol
            ),
        );
    }

    if input.open_positions_total >= limits.max_total_positions {
        return RiskDecision::refuse(
            RefusalCode::TotalCap,
            format!(
                "account already has {} open position(s), cap is {}",
                input.open_positions_total, limits.max_total_positions
            ),
        );
    }

    let volume_micros = size_order(limits, balance_micros, input);

    if volume_micros <= 0 {
        return RiskDecision::refuse(
            RefusalCode::ZeroOrNegativeSize,
            "sizing policy produced a non-positive volume",
        );
    }
    if volume_micros < limits.broker_min_volume_micros {
        return RiskDecision::refuse(
            RefusalCode::VolumeBelowBrokerMinimum,
            format!(
                "sized volume {volume_micros} micros is below broker minimum {}",
                limits.broker_min_volume_micros
            ),
        );
    }
    if volume_micros > limits.max_volume_per_order_micros {
        return RiskDecision::refuse(
            RefusalCode::VolumeAboveConfigMax,
            format!(
                "sized volume {volume_micros} micros exceeds configured max {}",
                limits.max_volume_per_order_micros
            ),
        );
    }

    // Heuristic margin check: the broker's own rejection remains the
    // authority; this is a heuristic pre-check only.
    let notional_micros = (volume_micros as i128 * input.reference_price_micros as i128
        / crate::types::MICROS_SCALE as i128) as i64;
    if notional_micros > margin_free_micros.saturating_mul(50) {
        return RiskDecision::refuse(
            RefusalCode::InsufficientMargin,
            "estimated notional exceeds a conservative multiple of free margin",
        );
    }

    RiskDecision::Approved { volume_micros }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskLimits;
    use chrono::TimeZone;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_volume_per_order_micros: 1_000_000,
            default_volume_micros: 100_000,
            max_daily_loss_micros: 500 * crate::types::MICROS_SCALE,
            max_positions_per_symbol: 2,
            max_total_positions: 5,
            position_size_pct: 0.02,
            emergency_drawdown_fraction: 0.2,
            circuit_breaker_enabled: true,
            broker_min_volume_micros: 1_000,
            lot_step_micros: 10_000,
        }
    }

    fn input() -> RiskInput {
        RiskInput {
            symbol: "EURUSD".into(),
            reference_price_micros: 100 * crate::types::MICROS_SCALE,
            stop_loss_micros: Some(99 * crate::types::MICROS_SCALE),
            open_positions_for_symbol: 0,
            open_positions_total: 0,
        }
    }

    #[test]
    fn stop_based_sizing_matches_scenario_s1() {
        // balance 10_000, stop 1.00 away from price 100, pos
        // size pct unspecified numerically but resolves to 0.05 lots at
        // lot step 0.01 -> volume_micros should land on a multiple of
        // lot_step_micros and respect the position_size_pct budget.
        let l = RiskLimits {
            position_size_pct: 0.02,
            ..limits()
        };
        let balance = 10_000 * crate::types::MICROS_SCALE;
        let vol = size_order(&l, balance, &input());
        assert!(vol > 0);
        assert_eq!(vol % l.lot_step_micros, 0);
    }

    #[test]
    fn default_volume_used_when_no_stop() {
        let l = limits();
        let mut i = input();
        i.stop_loss_micros = None;
        let vol = size_order(&l, 10_000 * crate::types::MICROS_SCALE, &i);
        assert_eq!(vol, quantise_to_lot_step(l.default_volume_micros, l.lot_step_micros));
    }

    #[test]
    fn symbol_cap_refuses() {
        let l = limits();
        let mut i = input();
        i.open_positions_for_symbol = 2;
        let d = evaluate(&l, &RiskState::default(), true, 10_000_000_000, 10_000_000_000, &i);
        assert!(matches!(
            d,
            RiskDecision::Refused {
                code: RefusalCode::SymbolCap,
                ..
            }
        ));
    }

    #[test]
    fn circuit_breaker_blocks_entries_until_server_date_rolls() {
        let l = limits();
        let mut st = RiskState::default();
        let day1 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        tick(&mut st, day1, 10_000 * crate::types::MICROS_SCALE);
        record_realized_close(&mut st, &l, -510 * crate::types::MICROS_SCALE);
        assert!(st.circuit_breaker_open);

        let d = evaluate(&l, &st, true, 10_000_000_000, 10_000_000_000, &input());
        assert!(matches!(
            d,
            RiskDecision::Refused {
                code: RefusalCode::CircuitBreakerOpen,
                ..
            }
        ));

        let day2 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 5, 0).unwrap();
        tick(&mut st, day2, 10_000 * crate::types::MICROS_SCALE);
        assert!(!st.circuit_breaker_open);
        assert_eq!(st.realized_today_micros, 0);

        let d2 = evaluate(&l, &st, true, 10_000_000_000, 10_000_000_000, &input());
        assert!(d2.is_approved());
    }

    #[test]
    fn emergency_drawdown_detected_from_peak_equity() {
        let l = limits();
        let mut st = RiskState::default();
        let t = Utc::now();
        tick(&mut st, t, 10_000 * crate::types::MICROS_SCALE);
        tick(&mut st, t, 12_000 * crate::types::MICROS_SCALE);
        assert!(!check_emergency_drawdown(&st, &l, 10_000 * crate::types::MICROS_SCALE));
        assert!(check_emergency_drawdown(&st, &l, 9_000 * crate::types::MICROS_SCALE));
    }

    #[test]
    fn trading_disabled_refuses_before_sizing() {
        let l = limits();
        let d = evaluate(&l, &RiskState::default(), false, 10_000_000_000, 10_000_000_000, &input());
        assert!(matches!(
            d,
            RiskDecision::Refused {
                code: RefusalCode::TradingDisabled,
                ..
            }
        ));
    }
}
