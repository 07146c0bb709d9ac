//! Scenario S5: four realised losses within one server-day cross
//! `max_daily_loss_micros`, tripping the circuit breaker on the fourth
//! close and refusing the next entry; a server-date rollover then clears
//! it and a subsequent entry is approved again.
//!
//! Entry price is fixed at 10,000.00 and every position is sized at
//! exactly 1.0 lot (`volume_micros == MICROS_SCALE`), so a price move in
//! dollars maps one-to-one onto the realised pnl in micros-dollars
//! (division by `MICROS_SCALE` cancels against the unit volume),
//! making the three -$150 and one -$60 losses land on exact totals:
//! -150, -300, -450, -510 — breaching the $500 limit only on the fourth.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use support::{push_bar, ScriptedStrategy};
use vigil_broker::MockBrokerSession;
use vigil_execution::{ExecutionTuning, LiveExecutionEngine};
use vigil_indicators::Pipeline;
use vigil_persistence::InMemoryPersistenceSink;
use vigil_portfolio::AdoptionPolicy;
use vigil_risk::RiskLimits;
use vigil_runtime::{ControlLoop, ControlLoopConfig, ShutdownHandle};
use vigil_schemas::{OrderOutcome, Side, MICROS_SCALE};
use vigil_strategy::{ShadowMode, StrategyHost, StrategyOutput};

const ENTRY_PRICE: i64 = 10_000 * MICROS_SCALE;
const LOSS_150_EXIT: i64 = ENTRY_PRICE - 150 * MICROS_SCALE;
const LOSS_60_EXIT: i64 = ENTRY_PRICE - 60 * MICROS_SCALE;

fn risk_limits() -> RiskLimits {
    RiskLimits {
        max_volume_per_order_micros: 10_000_000,
        default_volume_micros: MICROS_SCALE, // 1.0 lot
        max_daily_loss_micros: 500 * MICROS_SCALE,
        max_positions_per_symbol: 5,
        max_total_positions: 10,
        position_size_pct: 0.02,
        emergency_drawdown_fraction: 0.5,
        circuit_breaker_enabled: true,
        broker_min_volume_micros: 1_000,
        lot_step_micros: 10_000,
    }
}

#[tokio::test]
async fn fourth_loss_trips_the_breaker_then_a_day_rollover_clears_it() {
    let broker = Arc::new(MockBrokerSession::new());

    let mut host = StrategyHost::new(ShadowMode::Off);
    host.register(Box::new(ScriptedStrategy::new(
        60,
        vec![
            StrategyOutput::Enter(Side::Long),
            StrategyOutput::Exit,
            StrategyOutput::Enter(Side::Long),
            StrategyOutput::Exit,
            StrategyOutput::Enter(Side::Long),
            StrategyOutput::Exit,
            StrategyOutput::Enter(Side::Long),
            StrategyOutput::Exit,
            StrategyOutput::Enter(Side::Long), // refused: breaker open
            StrategyOutput::Enter(Side::Long), // approved after rollover
        ],
    )))
    .unwrap();

    let persistence = Arc::new(InMemoryPersistenceSink::new());

    let mut cfg = ControlLoopConfig::new("S", 60, 7);
    cfg.lookback_bars = 50;
    cfg.poll_interval = Duration::from_millis(10);

    let mut cl = ControlLoop::new(
        Uuid::new_v4(),
        cfg,
        Arc::clone(&broker),
        LiveExecutionEngine::new(Arc::clone(&broker), ExecutionTuning::default()),
        Arc::clone(&persistence),
        "scripted".to_string(),
        host,
        Pipeline::new(Vec::new()),
        risk_limits(),
        AdoptionPolicy::default(),
        Vec::new(),
        ShutdownHandle::new(),
    );

    let exits = [LOSS_150_EXIT, LOSS_150_EXIT, LOSS_150_EXIT, LOSS_60_EXIT];
    let mut idx = 0i64;

    for &exit_price in &exits {
        push_bar(&broker, "S", idx, ENTRY_PRICE);
        idx += 1;
        let enter_report = cl.run_once().await;
        let ticket = match enter_report.order_outcome {
            Some(OrderOutcome::Filled { ticket, .. }) => ticket,
            other => panic!("expected a fill, got {other:?}"),
        };

        broker.set_mark_price(ticket, exit_price);
        push_bar(&broker, "S", idx, ENTRY_PRICE);
        idx += 1;
        let exit_report = cl.run_once().await;
        assert_eq!(exit_report.closed_trades.len(), 1);
    }

    assert!(cl.circuit_breaker_open(), "cumulative -$510 must breach the $500 daily limit");

    push_bar(&broker, "S", idx, ENTRY_PRICE);
    idx += 1;
    let refused_report = cl.run_once().await;
    assert!(
        !refused_report.risk_decision.as_ref().unwrap().is_approved(),
        "a ninth entry attempt must be refused while the breaker is open"
    );
    assert!(refused_report.order_outcome.is_none());
    assert_eq!(cl.tracked_position_count(), 0);

    // Server-date rollover: same tick, the account snapshot's server_time
    // has moved to the next day before the strategy's Enter is evaluated.
    broker.set_server_time(Utc.with_ymd_and_hms(2026, 7, 30, 0, 5, 0).unwrap());
    push_bar(&broker, "S", idx, ENTRY_PRICE);
    let rolled_report = cl.run_once().await;

    assert!(!cl.circuit_breaker_open(), "rollover must clear the sticky breaker");
    assert!(rolled_report.risk_decision.as_ref().unwrap().is_approved());
    assert!(matches!(rolled_report.order_outcome, Some(OrderOutcome::Filled { .. })));
    assert_eq!(cl.tracked_position_count(), 1);
}
