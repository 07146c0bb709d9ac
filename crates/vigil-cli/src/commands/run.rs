//! `vigil run` — load configuration, connect (or not, in dry-run), and
//! drive the control loop until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use vigil_broker::live::LiveBrokerSession;
use vigil_broker::{BrokerSession, MockBrokerSession, SessionWrapper};
use vigil_execution::{DryRunExecutionEngine, ExecutionEngine, ExecutionTuning, LiveExecutionEngine};
use vigil_persistence::{connect_with_env_var, migrate, InMemoryPersistenceSink, PersistenceSink, PgPersistenceSink, ENV_DATABASE_URL};
use vigil_runtime::{ControlLoop, ControlLoopConfig, ShutdownHandle};
use vigil_strategy::{ShadowMode, StrategyHost};

use crate::bootstrap::{self, Interrupted};

pub async fn execute(config_paths: &[String], dry_run: bool, mindset: Option<&str>) -> Result<()> {
    let loaded = bootstrap::load_engine(config_paths, mindset)?;
    let cfg = loaded.cfg;
    info!(config_hash = %loaded.config_hash, mode = %cfg.engine.mode, "configuration loaded");

    let effective_dry_run = dry_run || cfg.dry_run;

    let mut loop_cfg = ControlLoopConfig::new(cfg.trading.symbol.clone(), cfg.trading.timeframe_secs, cfg.trading.magic_tag);
    loop_cfg.lookback_bars = cfg.trading.lookback_bars;
    loop_cfg.poll_interval = Duration::from_secs(cfg.trading.poll_interval_seconds);

    let strategy = bootstrap::strategy_for(&cfg)?;
    let mut strategy_host = StrategyHost::new(ShadowMode::Off);
    strategy_host
        .register(strategy)
        .map_err(|e| anyhow!(bootstrap::ConfigError(e.to_string())))?;

    let indicators = bootstrap::indicator_pipeline(&cfg)?;
    let risk_limits = bootstrap::risk_limits(&cfg);
    let adoption_policy = bootstrap::adoption_policy(&cfg);
    let exit_rules = bootstrap::exit_rules(&cfg)?;

    let run_id = run_id_from_config_hash(&loaded.config_hash);
    let shutdown = ShutdownHandle::new();
    spawn_signal_listener(shutdown.clone());

    if effective_dry_run {
        let broker = MockBrokerSession::new();
        let execution = DryRunExecutionEngine::new();
        run_with(
            run_id,
            loop_cfg,
            broker,
            execution,
            &cfg,
            "ma_cross",
            strategy_host,
            indicators,
            risk_limits,
            adoption_policy,
            exit_rules,
            shutdown,
        )
        .await
    } else {
        let broker_cfg = cfg
            .broker
            .as_ref()
            .ok_or_else(|| anyhow!(bootstrap::ConfigError("engine.mode requires a [broker] section".into())))?;
        let login = loaded
            .secrets
            .broker_login
            .clone()
            .ok_or_else(|| anyhow!(bootstrap::ConfigError("broker login secret was not resolved".into())))?;
        let password = loaded
            .secrets
            .broker_password
            .clone()
            .ok_or_else(|| anyhow!(bootstrap::ConfigError("broker password secret was not resolved".into())))?;

        let inner = LiveBrokerSession::new(broker_cfg.server.clone(), login, password);
        let wrapped = SessionWrapper::new(
            inner,
            Duration::from_millis(cfg.execution.min_call_interval_ms),
            cfg.execution.max_submit_retries,
        );
        let shared_broker = Arc::new(wrapped);

        let tuning = ExecutionTuning {
            fill_timeout: Duration::from_secs(cfg.execution.fill_timeout_secs),
            ..ExecutionTuning::default()
        };
        let execution = LiveExecutionEngine::new(shared_broker.clone(), tuning);

        run_with(
            run_id,
            loop_cfg,
            shared_broker,
            execution,
            &cfg,
            "ma_cross",
            strategy_host,
            indicators,
            risk_limits,
            adoption_policy,
            exit_rules,
            shutdown,
        )
        .await
    }
}

/// Shared tail of the `run` command once a concrete broker/execution pair
/// exists: pick a persistence backend, build the control loop, reconcile,
/// and drive it until shutdown.
#[allow(clippy::too_many_arguments)]
async fn run_with<B, E>(
    run_id: Uuid,
    loop_cfg: ControlLoopConfig,
    broker: B,
    execution: E,
    cfg: &vigil_config::engine_config::EngineConfig,
    strategy_id: &str,
    strategy_host: StrategyHost,
    indicators: vigil_indicators::Pipeline,
    risk_limits: vigil_risk::RiskLimits,
    adoption_policy: vigil_portfolio::AdoptionPolicy,
    exit_rules: Vec<Box<dyn vigil_exits::ExitRule>>,
    shutdown: ShutdownHandle,
) -> Result<()>
where
    B: BrokerSession,
    E: ExecutionEngine,
{
    if cfg.persistence.enabled {
        let var_name = cfg
            .persistence
            .database_url_env
            .as_deref()
            .unwrap_or(ENV_DATABASE_URL);
        let pool = connect_with_env_var(var_name)
            .await
            .context("connecting to persistence database")?;
        migrate(&pool).await.context("running persistence migrations")?;
        let sink = Arc::new(PgPersistenceSink::spawn(pool, 1024));
        drive(run_id, loop_cfg, broker, execution, sink, strategy_id, strategy_host, indicators, risk_limits, adoption_policy, exit_rules, shutdown).await
    } else {
        let sink = Arc::new(InMemoryPersistenceSink::new());
        drive(run_id, loop_cfg, broker, execution, sink, strategy_id, strategy_host, indicators, risk_limits, adoption_policy, exit_rules, shutdown).await
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive<B, E, P>(
    run_id: Uuid,
    loop_cfg: ControlLoopConfig,
    broker: B,
    execution: E,
    persistence: Arc<P>,
    strategy_id: &str,
    strategy_host: StrategyHost,
    indicators: vigil_indicators::Pipeline,
    risk_limits: vigil_risk::RiskLimits,
    adoption_policy: vigil_portfolio::AdoptionPolicy,
    exit_rules: Vec<Box<dyn vigil_exits::ExitRule>>,
    shutdown: ShutdownHandle,
) -> Result<()>
where
    B: BrokerSession,
    E: ExecutionEngine,
    P: PersistenceSink,
{
    let mut control_loop = ControlLoop::new(
        run_id,
        loop_cfg,
        broker,
        execution,
        persistence,
        strategy_id.to_string(),
        strategy_host,
        indicators,
        risk_limits,
        adoption_policy,
        exit_rules,
        shutdown.clone(),
    );

    let startup_actions = control_loop.reconcile_on_startup().await;
    info!(actions = startup_actions.len(), "startup reconciliation complete");

    control_loop.run_forever().await?;

    if shutdown.is_signalled() {
        warn!("loop exited after shutdown signal");
        bail!(Interrupted);
    }

    Ok(())
}

/// The run id is derived deterministically from the config hash rather
/// than randomly generated, so two processes started from byte-identical
/// config in the same second don't collide on a coincidental UUID and so
/// a restarted run can be correlated back to its configuration in stored
/// records.
fn run_id_from_config_hash(config_hash: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, config_hash.as_bytes())
}

fn spawn_signal_listener(shutdown: ShutdownHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received interrupt signal; shutting down");
            shutdown.signal();
        }
    });
}
