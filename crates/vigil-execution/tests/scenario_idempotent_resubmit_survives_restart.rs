//! A strategy/risk-gate pair replaying the same signal (as
//! happens if a process restarts mid-tick and reprocesses the last closed
//! bar) must never place a second order. `Signal::client_tag` derives its
//! key from the signal id alone, so the same signal always produces the
//! same `client_tag` regardless of which process instance computes it —
//! this test resubmits the identical request twice and checks the book
//! ends up with exactly one position.

use uuid::Uuid;
use vigil_broker::MockBrokerSession;
use vigil_execution::{ExecutionEngine, ExecutionTuning, LiveExecutionEngine};
use vigil_schemas::{OrderRequest, OrderSide, Side, Signal};

fn signal() -> Signal {
    Signal {
        id: Uuid::new_v4(),
        emitted_at_utc: chrono::Utc::now(),
        symbol: "EURUSD".into(),
        side: Side::Long,
        reference_price_micros: 1_100_000,
        stop_loss_micros: Some(1_090_000),
        take_profit_micros: None,
        confidence: 0.9,
        strategy_id: "ma_cross".into(),
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn replayed_signal_yields_exactly_one_position() {
    let sig = signal();
    let req = OrderRequest::market(
        sig.client_tag(),
        sig.symbol.clone(),
        OrderSide::from(sig.side),
        20_000,
        sig.reference_price_micros,
        777,
    );

    let engine = LiveExecutionEngine::new(MockBrokerSession::new(), ExecutionTuning::default());

    let first = engine.submit(req.clone()).await;
    let ticket = first.ticket().expect("first submit should fill");

    // Same request, same derived client_tag, as if the control loop
    // reprocessed the same closed bar after a restart.
    let resubmit = engine.submit(req).await;
    assert_eq!(
        resubmit.ticket(),
        Some(ticket),
        "resubmitting the same client_tag must return the original ticket, not open a new position"
    );

    let snap = engine.broker().account_snapshot(777).await.unwrap();
    assert_eq!(snap.open_positions.len(), 1, "exactly one position must exist after the replay");
}
