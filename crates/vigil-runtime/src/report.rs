//! Per-tick report, returned by `ControlLoop::run_once`.

use chrono::{DateTime, Utc};
use vigil_exits::ExitDecision;
use vigil_portfolio::{ClosedTrade, ReconcileAction};
use vigil_risk::RiskDecision;
use vigil_schemas::{OrderOutcome, Signal};

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub ticked_at_utc: Option<DateTime<Utc>>,
    pub broker_healthy: bool,
    pub reconnect_attempted: bool,
    pub reconnected: bool,
    pub reconcile_actions: Vec<ReconcileAction>,
    pub new_bar: bool,
    pub signal: Option<Signal>,
    pub risk_decision: Option<RiskDecision>,
    pub order_outcome: Option<OrderOutcome>,
    pub exit_decisions: Vec<ExitDecision>,
    pub closed_trades: Vec<ClosedTrade>,
    pub emergency_halt_triggered: bool,
    pub entries_halted: bool,
}

impl TickReport {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }
}
