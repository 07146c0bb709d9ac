//! Control Loop / Orchestrator: the top-level scheduler that drives one
//! **tick** of work through the bar feed, indicator pipeline, strategy,
//! risk gate, execution engine, position tracker and exit arbiter, in a
//! fixed phase order, recovering at phase boundaries rather than
//! unwinding through the tick.
//!
//! Status is exposed as a shared, `Arc<RwLock<_>>` snapshot a supervising
//! process can poll without synchronizing with the loop's own task.

mod config;
mod report;
mod status;

pub use config::ControlLoopConfig;
pub use report::TickReport;
pub use status::{LoopStatus, SharedStatus, ShutdownHandle};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use vigil_broker::BrokerSession;
use vigil_execution::ExecutionEngine;
use vigil_exits::{ExitArbiter, ExitContext, ExitRule};
use vigil_indicators::{is_new_bar, BarWindow, Pipeline};
use vigil_persistence::{MetricsSample, PersistenceSink};
use vigil_portfolio::{AdoptionPolicy, PositionTracker, ReconcileAction};
use vigil_risk::{RiskInput, RiskLimits, RiskState};
use vigil_schemas::{
    Metadata, OrderOutcome, OrderRequest, OrderSide, PositionRecord, Side, Signal,
};
use vigil_strategy::{StrategyContext, StrategyHost, StrategyOutput};

/// Everything the control loop owns for the lifetime of a run.
///
/// `B` and `E` are kept as two separate type parameters rather than one,
/// deliberately: the loop reads bars/account/positions straight off `B`
/// (the Bar Feed and the Tracker's `monitor`/`reconcile` are read-only per
/// while all order mutation goes through `E`. In dry-run mode
/// `E` is `DryRunExecutionEngine`, which never touches a broker at all, so
/// the two concerns could never share one type parameter cleanly.
pub struct ControlLoop<B, E, P>
where
    B: BrokerSession,
    E: ExecutionEngine,
    P: PersistenceSink,
{
    run_id: Uuid,
    cfg: ControlLoopConfig,
    strategy_id: String,

    broker: B,
    execution: E,
    persistence: Arc<P>,

    window: BarWindow,
    indicators: Pipeline,
    last_indicators: BTreeMap<String, f64>,

    strategy: StrategyHost,
    risk_limits: RiskLimits,
    risk_state: RiskState,

    tracker: PositionTracker,
    arbiter: ExitArbiter,

    status: SharedStatus,
    shutdown: ShutdownHandle,
    tick_count: u64,
}

impl<B, E, P> ControlLoop<B, E, P>
where
    B: BrokerSession,
    E: ExecutionEngine,
    P: PersistenceSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: Uuid,
        cfg: ControlLoopConfig,
        broker: B,
        execution: E,
        persistence: Arc<P>,
        strategy_id: String,
        strategy: StrategyHost,
        indicators: Pipeline,
        risk_limits: RiskLimits,
        adoption_policy: AdoptionPolicy,
        exit_rules: Vec<Box<dyn ExitRule>>,
        shutdown: ShutdownHandle,
    ) -> Self {
        let capacity = cfg.lookback_bars.max(1);
        Self {
            status: Arc::new(RwLock::new(LoopStatus::new(run_id))),
            run_id,
            strategy_id,
            window: BarWindow::new(capacity),
            last_indicators: BTreeMap::new(),
            strategy,
            indicators,
            risk_limits,
            risk_state: RiskState::default(),
            tracker: PositionTracker::new(cfg.magic_tag, adoption_policy),
            arbiter: ExitArbiter::new(exit_rules),
            broker,
            execution,
            persistence,
            shutdown,
            tick_count: 0,
            cfg,
        }
    }

    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn tracked_position_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn circuit_breaker_open(&self) -> bool {
        self.risk_state.circuit_breaker_open
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Reconcile against the broker's open-position list once, before the
    /// first tick.
    pub async fn reconcile_on_startup(&mut self) -> Vec<ReconcileAction> {
        let now = Utc::now();
        match self.tracker.reconcile(&self.broker, now).await {
            Ok(actions) => {
                for action in &actions {
                    if let ReconcileAction::CloseExternally { ticket } = action {
                        self.arbiter.remove_ticket(*ticket);
                    }
                }
                actions
            }
            Err(fault) => {
                error!(%fault, "startup reconciliation failed");
                Vec::new()
            }
        }
    }

    /// Run the `poll_interval` sleep loop until the shutdown flag is set,
    /// then execute the shutdown sequence.
    pub async fn run_forever(&mut self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.cfg.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.shutdown.is_signalled() {
                break;
            }
            interval.tick().await;
            if self.shutdown.is_signalled() {
                break;
            }

            let started = std::time::Instant::now();
            let report = self.run_once().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            info!(
                tick = report.tick,
                duration_ms = elapsed_ms,
                new_bar = report.new_bar,
                open_positions = self.tracker.len(),
                "tick complete"
            );

            if report.emergency_halt_triggered {
                warn!("emergency drawdown breached; entries halted, loop continues to monitor residual positions");
            }
        }

        self.shutdown_sequence().await
    }

    /// Execute exactly one tick. Every phase is
    /// represented; a fault in one phase is logged and recovered at the
    /// phase boundary rather than aborting the tick, except where a
    /// precondition is broken (an unhealthy, unreconnectable broker skips
    /// every remaining phase this tick).
    pub async fn run_once(&mut self) -> TickReport {
        let now = Utc::now();
        self.tick_count += 1;
        let mut report = TickReport::new(self.tick_count);
        report.ticked_at_utc = Some(now);

        if self.shutdown.is_signalled() {
            return report;
        }

        // Phase 1: health probe; reconnect + full reconciliation on failure.
        let began_with_reconnect = match self.phase1_health(&mut report, now).await {
            Ok(began_with_reconnect) => began_with_reconnect,
            Err(()) => {
                self.sync_status(&report).await;
                return report;
            }
        };

        // Account snapshot drives risk bookkeeping (day-rollover, emergency
        // drawdown) every tick, new bar or not.
        let account = match self.broker.account_snapshot(self.cfg.magic_tag).await {
            Ok(a) => a,
            Err(fault) => {
                error!(%fault, "account_snapshot failed; skipping remainder of this tick");
                self.sync_status(&report).await;
                return report;
            }
        };
        vigil_risk::tick(&mut self.risk_state, account.server_time, account.equity_micros);

        if vigil_risk::check_emergency_drawdown(&self.risk_state, &self.risk_limits, account.equity_micros) {
            self.trigger_emergency_halt(now, &mut report).await;
        }
        report.entries_halted = self.risk_state.emergency_halt_requested;

        // Phase 2: bar feed.
        let new_bar = self.phase2_bar_feed(&mut report).await;

        // Phase 3: indicator pipeline — only over a genuinely new bar, but
        // the last computed values stay cached for phases 6/7 when there
        // isn't one this tick.
        if new_bar {
            self.last_indicators = self.indicators.run(&self.window);
        }

        // Phases 4-5: strategy + risk gate + execution, skipped when there
        // is no new bar, when the tick began with a reconnect (reconcile
        // must settle first), or while an emergency halt is in force.
        if new_bar && !began_with_reconnect && !self.risk_state.emergency_halt_requested {
            self.phase4_5_entries(&account, now, &mut report).await;
        }

        // Phase 6: refresh every tracked position from the broker.
        self.phase6_monitor(now, &mut report).await;

        // Phase 7: exit arbiter.
        self.phase7_exits(now, &mut report).await;

        // Phase 8: periodic housekeeping.
        self.phase8_housekeeping(&account, now).await;

        self.sync_status(&report).await;
        report
    }

    /// Returns `Ok(began_with_reconnect)` on success, `Err(())` when the
    /// broker is unhealthy and reconnect also failed — the only
    /// precondition-broken case that skips the rest of the tick entirely.
    async fn phase1_health(&mut self, report: &mut TickReport, now: DateTime<Utc>) -> Result<bool, ()> {
        match self.broker.health_probe().await {
            Ok(()) => {
                report.broker_healthy = true;
                Ok(false)
            }
            Err(fault) => {
                warn!(%fault, "health probe failed; attempting reconnect");
                report.broker_healthy = false;
                report.reconnect_attempted = true;
                match self.broker.reconnect().await {
                    Ok(()) => {
                        report.reconnected = true;
                        info!("reconnected; running full reconciliation before entries resume");
                        match self.tracker.reconcile(&self.broker, now).await {
                            Ok(actions) => {
                                for action in &actions {
                                    if let ReconcileAction::CloseExternally { ticket } = action {
                                        self.arbiter.remove_ticket(*ticket);
                                    }
                                }
                                report.reconcile_actions = actions;
                            }
                            Err(fault) => error!(%fault, "post-reconnect reconciliation failed"),
                        }
                        Ok(true)
                    }
                    Err(fault) => {
                        error!(%fault, "reconnect failed; skipping remainder of this tick");
                        Err(())
                    }
                }
            }
        }
    }

    async fn phase2_bar_feed(&mut self, report: &mut TickReport) -> bool {
        let bars = match self
            .broker
            .fetch_bars(&self.cfg.symbol, self.cfg.timeframe_secs, self.cfg.lookback_bars)
            .await
        {
            Ok(bars) => bars,
            Err(fault) => {
                error!(%fault, "fetch_bars failed; no entry logic this tick");
                Vec::new()
            }
        };

        let mut new_bar = false;
        for bar in bars {
            if is_new_bar(&self.window, &bar) {
                self.window.push(bar);
                new_bar = true;
            }
        }
        report.new_bar = new_bar;
        new_bar
    }

    async fn phase4_5_entries(
        &mut self,
        account: &vigil_schemas::AccountSnapshot,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let ctx = StrategyContext {
            symbol: &self.cfg.symbol,
            timeframe_secs: self.cfg.timeframe_secs,
            window: &self.window,
            indicators: &self.last_indicators,
        };

        let result = match self.strategy.on_bar(&ctx) {
            Ok(result) => result,
            Err(err) => {
                error!(%err, "strategy host rejected on_bar call");
                return;
            }
        };

        if !result.intents.should_execute() {
            return;
        }

        match result.intents.output {
            StrategyOutput::Enter(side) => self.handle_entry(side, account, now, report).await,
            StrategyOutput::Exit => self.handle_strategy_exit(now, report).await,
            StrategyOutput::NoAction => {}
        }
    }

    async fn handle_entry(
        &mut self,
        side: Side,
        account: &vigil_schemas::AccountSnapshot,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let reference_price_micros = self.window.last().map(|b| b.close_micros).unwrap_or(0);

        let signal = Signal {
            id: Uuid::new_v4(),
            emitted_at_utc: now,
            symbol: self.cfg.symbol.clone(),
            side,
            reference_price_micros,
            stop_loss_micros: None,
            take_profit_micros: None,
            confidence: 1.0,
            strategy_id: self.strategy_id.clone(),
            metadata: Metadata::new(),
        };

        if let Err(err) = self.persistence.record_signal(self.run_id, &signal).await {
            warn!(%err, "failed to persist signal");
        }
        report.signal = Some(signal.clone());

        let open_positions_for_symbol = self
            .tracker
            .iter()
            .filter(|p| p.record.symbol == signal.symbol)
            .count() as u32;
        let open_positions_total = self.tracker.len() as u32;

        let input = RiskInput {
            symbol: signal.symbol.clone(),
            reference_price_micros: signal.reference_price_micros,
            stop_loss_micros: signal.stop_loss_micros,
            open_positions_for_symbol,
            open_positions_total,
        };

        let decision = vigil_risk::evaluate(
            &self.risk_limits,
            &self.risk_state,
            account.trading_enabled,
            account.balance_micros,
            account.margin_free_micros,
            &input,
        );
        report.risk_decision = Some(decision.clone());

        let vigil_risk::RiskDecision::Approved { volume_micros } = decision else {
            return;
        };

        let client_tag = signal.client_tag();
        let req = OrderRequest::market(
            client_tag.clone(),
            signal.symbol.clone(),
            OrderSide::from(signal.side),
            volume_micros,
            signal.reference_price_micros,
            self.cfg.magic_tag,
        );

        let outcome = self.execution.submit(req).await;
        if let Err(err) = self
            .persistence
            .record_order(self.run_id, Some(signal.id), &client_tag, &outcome)
            .await
        {
            warn!(%err, "failed to persist order outcome");
        }
        report.order_outcome = Some(outcome.clone());

        let filled = match &outcome {
            OrderOutcome::Filled {
                ticket,
                fill_price_micros,
                filled_volume_micros,
                filled_at_utc,
                ..
            } => Some((*ticket, *fill_price_micros, *filled_volume_micros, *filled_at_utc)),
            OrderOutcome::PartiallyFilled {
                ticket,
                fill_price_micros,
                filled_volume_micros,
                ..
            } => Some((*ticket, *fill_price_micros, *filled_volume_micros, now)),
            _ => None,
        };

        if let Some((ticket, open_price_micros, volume_micros, open_time_utc)) = filled {
            let record = PositionRecord {
                ticket,
                symbol: signal.symbol.clone(),
                side,
                volume_micros,
                open_price_micros,
                open_time_utc,
                current_price_micros: open_price_micros,
                stop_loss_micros: signal.stop_loss_micros,
                take_profit_micros: signal.take_profit_micros,
                unrealized_pnl_micros: 0,
                realized_pnl_micros: 0,
                commission_micros: 0,
                swap_micros: 0,
            };
            self.tracker.register(record, now);
        }
    }

    /// A strategy's `Exit` output has no `Signal`/risk-gate counterpart
    /// — it closes this loop's own open native
    /// positions for the configured symbol directly.
    async fn handle_strategy_exit(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let tickets: Vec<u64> = self
            .tracker
            .iter()
            .filter(|p| p.record.symbol == self.cfg.symbol)
            .map(|p| p.ticket())
            .collect();

        for ticket in tickets {
            if let Some(trade) = self
                .tracker
                .close(ticket, None, "strategy_exit", &self.execution, now)
                .await
            {
                self.free_scratch_if_closed(ticket);
                vigil_risk::record_realized_close(&mut self.risk_state, &self.risk_limits, trade.realized_pnl_micros);
                if let Err(err) = self.persistence.record_trade_close(self.run_id, &trade).await {
                    warn!(%err, "failed to persist trade close");
                }
                report.closed_trades.push(trade);
            }
        }
    }

    async fn phase6_monitor(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        match self.tracker.monitor(&self.broker, now).await {
            Ok(closed) => {
                for trade in &closed {
                    self.arbiter.remove_ticket(trade.ticket);
                    vigil_risk::record_realized_close(&mut self.risk_state, &self.risk_limits, trade.realized_pnl_micros);
                    if let Err(err) = self.persistence.record_trade_close(self.run_id, trade).await {
                        warn!(%err, "failed to persist externally-closed trade");
                    }
                }
                report.closed_trades.extend(closed);
            }
            Err(fault) => error!(%fault, "position monitor refresh failed"),
        }
    }

    async fn phase7_exits(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let positions: Vec<PositionRecord> = self.tracker.iter().map(|p| p.record.clone()).collect();
        let volatility_proxy_micros = self
            .last_indicators
            .get("atr")
            .map(|v| (*v * vigil_schemas::MICROS_SCALE as f64) as i64);
        let ctx = ExitContext {
            now_utc: now,
            volatility_proxy_micros,
        };

        let decisions = self.arbiter.evaluate_all(positions.iter(), &ctx);
        for decision in decisions {
            let ticket = decision.ticket;
            if let Some(trade) = self
                .tracker
                .close(
                    ticket,
                    Some(decision.desired_close_volume_micros),
                    &decision.reason,
                    &self.execution,
                    now,
                )
                .await
            {
                self.free_scratch_if_closed(ticket);
                vigil_risk::record_realized_close(&mut self.risk_state, &self.risk_limits, trade.realized_pnl_micros);
                if let Err(err) = self.persistence.record_trade_close(self.run_id, &trade).await {
                    warn!(%err, "failed to persist exit trade close");
                }
                report.closed_trades.push(trade);
            }
            report.exit_decisions.push(decision);
        }
    }

    /// Exit-rule scratch is freed iff the ticket is no longer tracked
    /// — a partial close leaves the ticket tracked, so its
    /// rule scratch (e.g. TrailingStop's best-price-seen) must survive.
    fn free_scratch_if_closed(&mut self, ticket: u64) {
        if self.tracker.get(ticket).is_none() {
            self.arbiter.remove_ticket(ticket);
        }
    }

    async fn trigger_emergency_halt(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        if self.risk_state.emergency_halt_requested {
            return;
        }
        self.risk_state.emergency_halt_requested = true;
        report.emergency_halt_triggered = true;
        warn!("emergency drawdown breached; flattening all positions and halting new entries");

        let closed = self.tracker.close_all("emergency_drawdown", &self.execution, now).await;
        for trade in &closed {
            self.arbiter.remove_ticket(trade.ticket);
            vigil_risk::record_realized_close(&mut self.risk_state, &self.risk_limits, trade.realized_pnl_micros);
            if let Err(err) = self.persistence.record_trade_close(self.run_id, trade).await {
                warn!(%err, "failed to persist emergency-flatten trade close");
            }
        }
        report.closed_trades.extend(closed);
    }

    async fn phase8_housekeeping(&self, account: &vigil_schemas::AccountSnapshot, now: DateTime<Utc>) {
        if self.cfg.metrics_every_n_ticks == 0 || self.tick_count % self.cfg.metrics_every_n_ticks != 0 {
            return;
        }
        let sample = MetricsSample {
            captured_at_utc: now,
            tick_count: self.tick_count,
            open_position_count: self.tracker.len() as u32,
            equity_micros: account.equity_micros,
            balance_micros: account.balance_micros,
            realized_today_micros: self.risk_state.realized_today_micros,
            loop_duration_ms: 0,
        };
        if let Err(err) = self.persistence.record_metrics_sample(self.run_id, &sample).await {
            warn!(%err, "failed to persist metrics sample");
        }
    }

    async fn sync_status(&self, report: &TickReport) {
        let mut s = self.status.write().await;
        s.tick_count = self.tick_count;
        s.open_position_count = self.tracker.len();
        s.circuit_breaker_open = self.risk_state.circuit_breaker_open;
        s.emergency_halt_requested = self.risk_state.emergency_halt_requested;
        s.broker_connected = report.broker_healthy || report.reconnected;
        s.last_tick_at_utc = report.ticked_at_utc;
    }

    /// Shutdown sequence: finish the current phase (already
    /// true by the time this runs — `run_forever` only calls this after
    /// `run_once` returns), then optionally flatten, flush persistence,
    /// and disconnect. Bounded by `shutdown_grace`; anything still open
    /// after that is logged as "left open" rather than retried
    /// indefinitely.
    async fn shutdown_sequence(&mut self) -> anyhow::Result<()> {
        info!("shutdown signalled; running shutdown sequence");
        let now = Utc::now();

        if self.cfg.flatten_on_shutdown {
            match tokio::time::timeout(
                self.cfg.shutdown_grace,
                self.tracker.close_all("shutdown_flatten", &self.execution, now),
            )
            .await
            {
                Ok(trades) => {
                    for trade in &trades {
                        self.arbiter.remove_ticket(trade.ticket);
                        if let Err(err) = self.persistence.record_trade_close(self.run_id, trade).await {
                            warn!(%err, "failed to persist shutdown-flatten trade close");
                        }
                    }
                }
                Err(_) => warn!("flatten-on-shutdown did not complete within the shutdown grace period"),
            }
        }

        for ticket in self.tracker.tickets() {
            warn!(ticket, "position left open at shutdown");
        }

        if let Err(err) = self.persistence.flush().await {
            error!(%err, "persistence flush failed during shutdown");
        }

        info!("broker session torn down; disconnect complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use vigil_broker::MockBrokerSession;
    use vigil_exits::{ProfitLevel, ProfitTarget, ProfitTargetConfig};
    use vigil_execution::{ExecutionTuning, LiveExecutionEngine};
    use vigil_indicators::Pipeline;
    use vigil_persistence::InMemoryPersistenceSink;
    use vigil_strategy::{MovingAverageCrossStrategy, ShadowMode};

    fn risk_limits() -> RiskLimits {
        RiskLimits {
            max_volume_per_order_micros: 10_000_000,
            default_volume_micros: 50_000,
            max_daily_loss_micros: 500 * vigil_schemas::MICROS_SCALE,
            max_positions_per_symbol: 5,
            max_total_positions: 10,
            position_size_pct: 0.02,
            emergency_drawdown_fraction: 0.5,
            circuit_breaker_enabled: true,
            broker_min_volume_micros: 1_000,
            lot_step_micros: 10_000,
        }
    }

    fn cfg() -> ControlLoopConfig {
        let mut c = ControlLoopConfig::new("EURUSD", 60, 778899);
        c.lookback_bars = 50;
        c.poll_interval = Duration::from_millis(10);
        c
    }

    /// The execution engine gets its own, separate `MockBrokerSession` in
    /// these tests (mirroring how `DryRunExecutionEngine` never touches a
    /// broker at all) — entry/exit fills go through it, while `broker`
    /// drives the bar feed, account snapshot, and reconcile/monitor.
    fn loop_with(
        broker: MockBrokerSession,
    ) -> ControlLoop<MockBrokerSession, LiveExecutionEngine<MockBrokerSession>, InMemoryPersistenceSink> {
        let mut host = StrategyHost::new(ShadowMode::Off);
        host.register(Box::new(MovingAverageCrossStrategy::new(60, 2, 4))).unwrap();

        ControlLoop::new(
            Uuid::new_v4(),
            cfg(),
            broker,
            LiveExecutionEngine::new(MockBrokerSession::new(), ExecutionTuning::default()),
            Arc::new(InMemoryPersistenceSink::new()),
            "ma_cross".to_string(),
            host,
            Pipeline::new(Vec::new()),
            risk_limits(),
            AdoptionPolicy::default(),
            vec![Box::new(ProfitTarget::new(ProfitTargetConfig {
                levels: vec![ProfitLevel {
                    profit_pct: 0.02,
                    close_fraction: 1.0,
                }],
                enabled: true,
            }))],
            ShutdownHandle::new(),
        )
    }

    #[tokio::test]
    async fn tick_with_no_bars_is_a_no_op_and_does_not_panic() {
        let broker = MockBrokerSession::new();
        let mut cl = loop_with(broker);
        let report = cl.run_once().await;
        assert!(!report.new_bar);
        assert!(report.signal.is_none());
    }

    #[tokio::test]
    async fn unhealthy_broker_skips_the_rest_of_the_tick() {
        let broker = MockBrokerSession::new();
        broker.set_unhealthy(true);
        let mut cl = loop_with(broker);
        let report = cl.run_once().await;
        assert!(!report.broker_healthy);
        assert!(report.reconnect_attempted);
        // reconnect() on MockBrokerSession always succeeds and clears the
        // unhealthy flag, so this tick should still reconcile and proceed.
        assert!(report.reconnected);
    }

    #[tokio::test]
    async fn reconcile_on_startup_adopts_an_orphaned_position() {
        let broker = MockBrokerSession::new();
        broker.seed_position(vigil_schemas::PositionRecord {
            ticket: 9,
            symbol: "EURUSD".into(),
            side: Side::Long,
            volume_micros: 10_000,
            open_price_micros: 1_100_000,
            open_time_utc: Utc::now() - chrono::Duration::hours(1),
            current_price_micros: 1_100_000,
            stop_loss_micros: None,
            take_profit_micros: None,
            unrealized_pnl_micros: 0,
            realized_pnl_micros: 0,
            commission_micros: 0,
            swap_micros: 0,
        });
        let mut cl = loop_with(broker);
        let actions = cl.reconcile_on_startup().await;
        assert_eq!(actions, vec![ReconcileAction::Adopt { ticket: 9 }]);
        assert_eq!(cl.tracked_position_count(), 1);
    }

    fn push_bar(broker: &MockBrokerSession, idx: i64, close_micros: i64) {
        broker.push_bar(
            "EURUSD",
            vigil_schemas::Bar {
                ts_open_utc: Utc::now() - chrono::Duration::minutes(200 - idx),
                ts_close_utc: Utc::now() - chrono::Duration::minutes(199 - idx),
                timeframe_secs: 60,
                open_micros: close_micros,
                high_micros: close_micros,
                low_micros: close_micros,
                close_micros,
                volume_micros: 0,
            },
        );
    }

    #[tokio::test]
    async fn bullish_crossover_opens_a_tracked_position_end_to_end() {
        let broker = MockBrokerSession::new();
        // A flat run followed by a sustained rally: the fast SMA(2) crosses
        // above the slow SMA(4) partway through, which should drive an
        // Enter(Long) all the way through risk sizing, the (separate) live
        // execution engine, and into the position tracker.
        let mut price = 1_000_000;
        for i in 0..6 {
            push_bar(&broker, i, price);
        }
        for i in 6..12 {
            price += 5_000;
            push_bar(&broker, i, price);
        }

        let mut cl = loop_with(broker);
        let mut saw_signal = false;
        for _ in 0..12 {
            let report = cl.run_once().await;
            if report.signal.is_some() {
                saw_signal = true;
                assert!(report.risk_decision.as_ref().unwrap().is_approved());
                assert!(matches!(report.order_outcome, Some(OrderOutcome::Filled { .. })));
            }
        }

        assert!(saw_signal, "rising fast/slow SMA cross should have emitted an Enter signal");
        assert_eq!(cl.tracked_position_count(), 1);
    }

    #[tokio::test]
    async fn unfillable_order_never_registers_a_phantom_position() {
        // A RiskLimits with zero max_total_positions refuses every entry,
        // so no order should ever reach the execution engine.
        let broker = MockBrokerSession::new();
        let mut price = 1_000_000;
        for i in 0..6 {
            push_bar(&broker, i, price);
        }
        for i in 6..12 {
            price += 5_000;
            push_bar(&broker, i, price);
        }

        let mut host = StrategyHost::new(ShadowMode::Off);
        host.register(Box::new(MovingAverageCrossStrategy::new(60, 2, 4))).unwrap();
        let mut limits = risk_limits();
        limits.max_total_positions = 0;

        let mut cl = ControlLoop::new(
            Uuid::new_v4(),
            cfg(),
            broker,
            LiveExecutionEngine::new(MockBrokerSession::new(), ExecutionTuning::default()),
            Arc::new(InMemoryPersistenceSink::new()),
            "ma_cross".to_string(),
            host,
            Pipeline::new(Vec::new()),
            limits,
            AdoptionPolicy::default(),
            Vec::new(),
            ShutdownHandle::new(),
        );

        for _ in 0..12 {
            let report = cl.run_once().await;
            if let Some(decision) = &report.risk_decision {
                assert!(!decision.is_approved());
                assert!(report.order_outcome.is_none());
            }
        }
        assert_eq!(cl.tracked_position_count(), 0);
    }
}
