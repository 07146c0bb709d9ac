//! Four closes during one server-day totalling
//! -510 against max_daily_loss=500 trip the circuit breaker; a subsequent
//! signal is refused with CircuitBreakerOpen; crossing into the next
//! server-day resets the accumulator and the breaker.

use chrono::{TimeZone, Utc};
use vigil_risk::{
    check_emergency_drawdown, evaluate, record_realized_close, tick, RefusalCode, RiskDecision,
    RiskInput, RiskLimits, RiskState, MICROS_SCALE,
};

fn limits() -> RiskLimits {
    RiskLimits {
        max_volume_per_order_micros: 1_000_000,
        default_volume_micros: 100_000,
        max_daily_loss_micros: 500 * MICROS_SCALE,
        max_positions_per_symbol: 2,
        max_total_positions: 5,
        position_size_pct: 0.02,
        emergency_drawdown_fraction: 0.2,
        circuit_breaker_enabled: true,
        broker_min_volume_micros: 1_000,
        lot_step_micros: 10_000,
    }
}

fn signal_input() -> RiskInput {
    RiskInput {
        symbol: "EURUSD".into(),
        reference_price_micros: 100 * MICROS_SCALE,
        stop_loss_micros: Some(99 * MICROS_SCALE),
        open_positions_for_symbol: 0,
        open_positions_total: 0,
    }
}

#[test]
fn four_losing_closes_trip_breaker_then_rollover_clears_it() {
    let l = limits();
    let mut st = RiskState::default();
    let day1 = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
    tick(&mut st, day1, 10_000 * MICROS_SCALE);

    for loss in [-100i64, -150, -120, -140] {
        record_realized_close(&mut st, &l, loss * MICROS_SCALE);
    }
    assert_eq!(st.realized_today_micros, -510 * MICROS_SCALE);
    assert!(st.circuit_breaker_open);

    let refused = evaluate(&l, &st, true, 10_000 * MICROS_SCALE, 10_000 * MICROS_SCALE, &signal_input());
    assert!(matches!(
        refused,
        RiskDecision::Refused {
            code: RefusalCode::CircuitBreakerOpen,
            ..
        }
    ));

    let day2 = Utc.with_ymd_and_hms(2026, 3, 11, 0, 1, 0).unwrap();
    tick(&mut st, day2, 10_000 * MICROS_SCALE);
    assert!(!st.circuit_breaker_open);
    assert_eq!(st.realized_today_micros, 0);

    let approved = evaluate(&l, &st, true, 10_000 * MICROS_SCALE, 10_000 * MICROS_SCALE, &signal_input());
    assert!(approved.is_approved());
}

#[test]
fn emergency_drawdown_flags_independent_of_circuit_breaker() {
    let l = limits();
    let mut st = RiskState::default();
    let t = Utc::now();
    tick(&mut st, t, 10_000 * MICROS_SCALE);
    // Equity rallies to a new peak, then gives back more than the
    // configured emergency fraction.
    tick(&mut st, t, 13_000 * MICROS_SCALE);
    assert!(check_emergency_drawdown(&st, &l, 10_000 * MICROS_SCALE));
    assert!(!st.circuit_breaker_open, "emergency drawdown is a separate signal from the daily circuit breaker");
}
