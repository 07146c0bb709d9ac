use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use vigil_portfolio::ClosedTrade;
use vigil_schemas::{OrderOutcome, Signal};

/// Env var naming the Postgres connection string
/// handling: config never embeds the literal DSN, only the env var name
/// would be recorded in config; this constant is that name.
pub const ENV_DATABASE_URL: &str = "VIGIL_DATABASE_URL";

/// Connect to Postgres, reading the DSN from `var_name` rather than the
/// fixed [`ENV_DATABASE_URL`] name — lets a deployment point `persistence`
/// at a differently-named env var without this crate knowing about it.
pub async fn connect_with_env_var(var_name: &str) -> Result<PgPool> {
    let url = std::env::var(var_name).with_context(|| format!("missing env var {var_name}"))?;
    PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")
}

/// Connect to Postgres using [`ENV_DATABASE_URL`].
pub async fn connect_from_env() -> Result<PgPool> {
    connect_with_env_var(ENV_DATABASE_URL).await
}

/// Run embedded SQLx migrations (the four append-only tables).
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("persistence migrate failed")
}

/// One periodic housekeeping sample.
#[derive(Debug, Clone)]
pub struct MetricsSample {
    pub captured_at_utc: DateTime<Utc>,
    pub tick_count: u64,
    pub open_position_count: u32,
    pub equity_micros: i64,
    pub balance_micros: i64,
    pub realized_today_micros: i64,
    pub loop_duration_ms: u64,
}

/// Append-only persistence boundary the control loop writes through.
/// Implementations must never block on a slow write for longer than it
/// takes to enqueue it; `flush`
/// is the one call allowed to wait until every enqueued write has landed.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_signal(&self, run_id: Uuid, signal: &Signal) -> Result<()>;

    async fn record_order(
        &self,
        run_id: Uuid,
        signal_id: Option<Uuid>,
        client_tag: &str,
        outcome: &OrderOutcome,
    ) -> Result<()>;

    async fn record_trade_close(&self, run_id: Uuid, trade: &ClosedTrade) -> Result<()>;

    async fn record_metrics_sample(&self, run_id: Uuid, sample: &MetricsSample) -> Result<()>;

    /// Block until every write enqueued before this call has been applied.
    /// A buffered sink with periodic flush is acceptable, provided
    /// shutdown flushes synchronously.
    async fn flush(&self) -> Result<()>;
}

#[derive(Debug)]
enum Event {
    Signal {
        run_id: Uuid,
        signal: Signal,
    },
    Order {
        run_id: Uuid,
        signal_id: Option<Uuid>,
        client_tag: String,
        outcome: OrderOutcome,
    },
    TradeClose {
        run_id: Uuid,
        trade: ClosedTrade,
    },
    Metrics {
        run_id: Uuid,
        sample: MetricsSample,
    },
    Flush(oneshot::Sender<()>),
}

/// Postgres-backed sink. Every public method enqueues onto a bounded
/// channel drained by a single background writer task, so callers never
/// wait on a query except via an explicit `flush`.
pub struct PgPersistenceSink {
    tx: mpsc::Sender<Event>,
}

impl PgPersistenceSink {
    /// Spawn the writer task against `pool` with a channel of `capacity`
    /// pending events.
    pub fn spawn(pool: PgPool, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(writer_loop(pool, rx));
        Self { tx }
    }
}

async fn writer_loop(pool: PgPool, mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match event {
            Event::Signal { run_id, signal } => {
                if let Err(err) = write_signal(&pool, run_id, &signal).await {
                    tracing::error!(%err, "persistence: failed to write signal");
                }
            }
            Event::Order { run_id, signal_id, client_tag, outcome } => {
                if let Err(err) = write_order(&pool, run_id, signal_id, &client_tag, &outcome).await {
                    tracing::error!(%err, "persistence: failed to write order");
                }
            }
            Event::TradeClose { run_id, trade } => {
                if let Err(err) = write_trade_close(&pool, run_id, &trade).await {
                    tracing::error!(%err, "persistence: failed to write trade close");
                }
            }
            Event::Metrics { run_id, sample } => {
                if let Err(err) = write_metrics_sample(&pool, run_id, &sample).await {
                    tracing::error!(%err, "persistence: failed to write metrics sample");
                }
            }
            Event::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn write_signal(pool: &PgPool, run_id: Uuid, signal: &Signal) -> Result<()> {
    let metadata = serde_json::to_value(&signal.metadata)?;
    sqlx::query(
        r#"
        insert into signals (
            signal_id, run_id, emitted_at_utc, symbol, side,
            reference_price_micros, stop_loss_micros, take_profit_micros,
            confidence, strategy_id, metadata
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        on conflict (signal_id) do nothing
        "#,
    )
    .bind(signal.id)
    .bind(run_id)
    .bind(signal.emitted_at_utc)
    .bind(&signal.symbol)
    .bind(side_label(signal.side))
    .bind(signal.reference_price_micros)
    .bind(signal.stop_loss_micros)
    .bind(signal.take_profit_micros)
    .bind(signal.confidence)
    .bind(&signal.strategy_id)
    .bind(metadata)
    .execute(pool)
    .await
    .context("insert into signals failed")?;
    Ok(())
}

async fn write_order(
    pool: &PgPool,
    run_id: Uuid,
    signal_id: Option<Uuid>,
    client_tag: &str,
    outcome: &OrderOutcome,
) -> Result<()> {
    let (kind, ticket, fill_price, filled_volume, remaining_volume, commission, swap, rejected_reason) =
        decompose_outcome(outcome);

    sqlx::query(
        r#"
        insert into orders (
            order_id, run_id, client_tag, signal_id, ticket, outcome_kind,
            fill_price_micros, filled_volume_micros, remaining_volume_micros,
            commission_micros, swap_micros, rejected_reason
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(run_id)
    .bind(client_tag)
    .bind(signal_id)
    .bind(ticket.map(|t| t as i64))
    .bind(kind)
    .bind(fill_price)
    .bind(filled_volume)
    .bind(remaining_volume)
    .bind(commission)
    .bind(swap)
    .bind(rejected_reason)
    .execute(pool)
    .await
    .context("insert into orders failed")?;
    Ok(())
}

#[allow(clippy::type_complexity)]
fn decompose_outcome(
    outcome: &OrderOutcome,
) -> (
    &'static str,
    Option<u64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<String>,
) {
    match outcome {
        OrderOutcome::Placed { ticket } => ("placed", Some(*ticket), None, None, None, None, None, None),
        OrderOutcome::Filled {
            ticket,
            fill_price_micros,
            filled_volume_micros,
            commission_micros,
            swap_micros,
            ..
        } => (
            "filled",
            Some(*ticket),
            Some(*fill_price_micros),
            Some(*filled_volume_micros),
            None,
            Some(*commission_micros),
            Some(*swap_micros),
            None,
        ),
        OrderOutcome::PartiallyFilled {
            ticket,
            fill_price_micros,
            filled_volume_micros,
            remaining_volume_micros,
        } => (
            "partially_filled",
            Some(*ticket),
            Some(*fill_price_micros),
            Some(*filled_volume_micros),
            Some(*remaining_volume_micros),
            None,
            None,
            None,
        ),
        OrderOutcome::Rejected { reason } => {
            ("rejected", None, None, None, None, None, None, Some(reason.clone()))
        }
        OrderOutcome::Cancelled { ticket } => {
            ("cancelled", Some(*ticket), None, None, None, None, None, None)
        }
        OrderOutcome::Error { detail } => {
            ("error", None, None, None, None, None, None, Some(detail.clone()))
        }
    }
}

async fn write_trade_close(pool: &PgPool, run_id: Uuid, trade: &ClosedTrade) -> Result<()> {
    sqlx::query(
        r#"
        insert into trades (
            trade_id, run_id, ticket, symbol, volume_micros, open_price_micros,
            exit_price_micros, realized_pnl_micros, commission_micros, swap_micros,
            opened_at_utc, closed_at_utc, reason, closed_externally
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(run_id)
    .bind(trade.ticket as i64)
    .bind(&trade.symbol)
    .bind(trade.volume_micros)
    .bind(trade.open_price_micros)
    .bind(trade.exit_price_micros)
    .bind(trade.realized_pnl_micros)
    .bind(trade.commission_micros)
    .bind(trade.swap_micros)
    .bind(trade.opened_at_utc)
    .bind(trade.closed_at_utc)
    .bind(&trade.reason)
    .bind(trade.closed_externally)
    .execute(pool)
    .await
    .context("insert into trades failed")?;
    Ok(())
}

async fn write_metrics_sample(pool: &PgPool, run_id: Uuid, sample: &MetricsSample) -> Result<()> {
    sqlx::query(
        r#"
        insert into metrics_samples (
            sample_id, run_id, captured_at_utc, tick_count, open_position_count,
            equity_micros, balance_micros, realized_today_micros, loop_duration_ms
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(run_id)
    .bind(sample.captured_at_utc)
    .bind(sample.tick_count as i64)
    .bind(sample.open_position_count as i32)
    .bind(sample.equity_micros)
    .bind(sample.balance_micros)
    .bind(sample.realized_today_micros)
    .bind(sample.loop_duration_ms as i64)
    .execute(pool)
    .await
    .context("insert into metrics_samples failed")?;
    Ok(())
}

fn side_label(side: vigil_schemas::Side) -> &'static str {
    match side {
        vigil_schemas::Side::Long => "long",
        vigil_schemas::Side::Short => "short",
    }
}

#[async_trait]
impl PersistenceSink for PgPersistenceSink {
    async fn record_signal(&self, run_id: Uuid, signal: &Signal) -> Result<()> {
        self.tx
            .send(Event::Signal { run_id, signal: signal.clone() })
            .await
            .context("persistence channel closed")
    }

    async fn record_order(
        &self,
        run_id: Uuid,
        signal_id: Option<Uuid>,
        client_tag: &str,
        outcome: &OrderOutcome,
    ) -> Result<()> {
        self.tx
            .send(Event::Order {
                run_id,
                signal_id,
                client_tag: client_tag.to_string(),
                outcome: outcome.clone(),
            })
            .await
            .context("persistence channel closed")
    }

    async fn record_trade_close(&self, run_id: Uuid, trade: &ClosedTrade) -> Result<()> {
        self.tx
            .send(Event::TradeClose { run_id, trade: trade.clone() })
            .await
            .context("persistence channel closed")
    }

    async fn record_metrics_sample(&self, run_id: Uuid, sample: &MetricsSample) -> Result<()> {
        self.tx
            .send(Event::Metrics { run_id, sample: sample.clone() })
            .await
            .context("persistence channel closed")
    }

    async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Event::Flush(ack_tx))
            .await
            .context("persistence channel closed")?;
        ack_rx.await.context("persistence writer task dropped the flush ack")
    }
}

/// In-memory sink used by tests and by `vigil-runtime`'s scenario suite.
/// Every record call is synchronous and immediately visible; `flush` is
/// a no-op.
#[derive(Default)]
pub struct InMemoryPersistenceSink {
    inner: std::sync::Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    signals: Vec<(Uuid, Signal)>,
    orders: Vec<(Uuid, Option<Uuid>, String, OrderOutcome)>,
    trades: Vec<(Uuid, ClosedTrade)>,
    metrics: Vec<(Uuid, MetricsSample)>,
}

impl InMemoryPersistenceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_count(&self) -> usize {
        self.inner.lock().unwrap().signals.len()
    }

    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }

    pub fn trades(&self) -> Vec<ClosedTrade> {
        self.inner.lock().unwrap().trades.iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn metrics_samples(&self) -> Vec<MetricsSample> {
        self.inner.lock().unwrap().metrics.iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl PersistenceSink for InMemoryPersistenceSink {
    async fn record_signal(&self, run_id: Uuid, signal: &Signal) -> Result<()> {
        self.inner.lock().unwrap().signals.push((run_id, signal.clone()));
        Ok(())
    }

    async fn record_order(
        &self,
        run_id: Uuid,
        signal_id: Option<Uuid>,
        client_tag: &str,
        outcome: &OrderOutcome,
    ) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .push((run_id, signal_id, client_tag.to_string(), outcome.clone()));
        Ok(())
    }

    async fn record_trade_close(&self, run_id: Uuid, trade: &ClosedTrade) -> Result<()> {
        self.inner.lock().unwrap().trades.push((run_id, trade.clone()));
        Ok(())
    }

    async fn record_metrics_sample(&self, run_id: Uuid, sample: &MetricsSample) -> Result<()> {
        self.inner.lock().unwrap().metrics.push((run_id, sample.clone()));
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_schemas::{Metadata, Side};

    fn signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            emitted_at_utc: Utc::now(),
            symbol: "EURUSD".into(),
            side: Side::Long,
            reference_price_micros: 1_100_000,
            stop_loss_micros: Some(1_090_000),
            take_profit_micros: None,
            confidence: 0.8,
            strategy_id: "ma_cross".into(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_sink_records_signals_and_flush_is_a_no_op() {
        let sink = InMemoryPersistenceSink::new();
        let run_id = Uuid::new_v4();
        sink.record_signal(run_id, &signal()).await.unwrap();
        assert_eq!(sink.signal_count(), 1);
        sink.flush().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_sink_records_trade_closes() {
        let sink = InMemoryPersistenceSink::new();
        let trade = ClosedTrade {
            ticket: 1,
            symbol: "EURUSD".into(),
            volume_micros: 10_000,
            open_price_micros: 1_000_000,
            exit_price_micros: 1_020_000,
            realized_pnl_micros: 200,
            commission_micros: 0,
            swap_micros: 0,
            opened_at_utc: Utc::now(),
            closed_at_utc: Utc::now(),
            reason: "profit_target".into(),
            closed_externally: false,
        };
        sink.record_trade_close(Uuid::new_v4(), &trade).await.unwrap();
        assert_eq!(sink.trades().len(), 1);
        assert_eq!(sink.trades()[0].reason, "profit_target");
    }

    #[tokio::test]
    async fn decompose_outcome_carries_ticket_and_reject_reason() {
        let (kind, ticket, ..) = decompose_outcome(&OrderOutcome::Placed { ticket: 42 });
        assert_eq!(kind, "placed");
        assert_eq!(ticket, Some(42));

        let (kind, _, _, _, _, _, _, reason) =
            decompose_outcome(&OrderOutcome::Rejected { reason: "volume too small".into() });
        assert_eq!(kind, "rejected");
        assert_eq!(reason.as_deref(), Some("volume too small"));
    }
}
