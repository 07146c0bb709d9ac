//! `vigil trade` — list, open, or close positions carrying this run's
//! magic-tag by hand, outside the control loop. Orders placed here use the
//! same magic-tag as the loop so the Tracker adopts them on the next
//! reconciliation instead of treating them as an unrelated orphan.

use anyhow::{anyhow, bail, Result};
use clap::Args;
use uuid::Uuid;

use vigil_broker::live::LiveBrokerSession;
use vigil_broker::{BrokerSession, SessionWrapper};
use vigil_schemas::{OrderRequest, OrderSide, OrderType};

use crate::bootstrap::{self, ConfigError};

#[derive(Args, Debug)]
pub struct TradeAction {
    /// List open positions carrying this run's magic-tag.
    #[arg(long)]
    pub list: bool,

    /// Close one open ticket.
    #[arg(long)]
    pub close: Option<u64>,

    /// Close every open position carrying this run's magic-tag.
    #[arg(long = "close-all")]
    pub close_all: bool,

    /// Symbol to trade, required together with `--side`/`--volume`.
    #[arg(long, requires = "side", requires = "volume")]
    pub symbol: Option<String>,

    #[arg(long, value_enum)]
    pub side: Option<TradeSide>,

    /// Volume in lots (converted to micros internally).
    #[arg(long)]
    pub volume: Option<f64>,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
pub enum TradeSide {
    Buy,
    Sell,
}

pub async fn execute(config_paths: &[String], action: TradeAction) -> Result<()> {
    let selected = [
        action.list,
        action.close.is_some(),
        action.close_all,
        action.symbol.is_some(),
    ]
    .iter()
    .filter(|b| **b)
    .count();
    if selected != 1 {
        bail!("exactly one of --list, --close, --close-all, or --symbol/--side/--volume must be given");
    }

    let loaded = bootstrap::load_engine(config_paths, None)?;
    let cfg = loaded.cfg;

    let broker_cfg = cfg
        .broker
        .as_ref()
        .ok_or_else(|| anyhow!(ConfigError("the trade utility requires a [broker] section".into())))?;
    let login = loaded
        .secrets
        .broker_login
        .clone()
        .ok_or_else(|| anyhow!(ConfigError("broker login secret was not resolved".into())))?;
    let password = loaded
        .secrets
        .broker_password
        .clone()
        .ok_or_else(|| anyhow!(ConfigError("broker password secret was not resolved".into())))?;

    let inner = LiveBrokerSession::new(broker_cfg.server.clone(), login, password);
    let broker = SessionWrapper::new(
        inner,
        std::time::Duration::from_millis(cfg.execution.min_call_interval_ms),
        cfg.execution.max_submit_retries,
    );

    if action.list {
        let positions = broker
            .open_positions(cfg.trading.magic_tag)
            .await
            .map_err(|fault| anyhow!("listing open positions: {fault}"))?;
        if positions.is_empty() {
            println!("no open positions under magic-tag {}", cfg.trading.magic_tag);
        }
        for p in &positions {
            println!(
                "ticket={} symbol={} side={:?} volume_micros={} open_price_micros={} unrealized_pnl_micros={}",
                p.ticket, p.symbol, p.side, p.volume_micros, p.open_price_micros, p.unrealized_pnl_micros
            );
        }
        return Ok(());
    }

    if action.close_all {
        let positions = broker
            .open_positions(cfg.trading.magic_tag)
            .await
            .map_err(|fault| anyhow!("listing open positions: {fault}"))?;
        for p in &positions {
            let outcome = broker
                .close_position(p.ticket, p.volume_micros)
                .await
                .map_err(|fault| anyhow!("closing ticket {}: {fault}", p.ticket))?;
            println!("closed ticket {}: {outcome:?}", p.ticket);
        }
        return Ok(());
    }

    if let Some(ticket) = action.close {
        let positions = broker
            .open_positions(cfg.trading.magic_tag)
            .await
            .map_err(|fault| anyhow!("listing open positions: {fault}"))?;
        let target = positions
            .iter()
            .find(|p| p.ticket == ticket)
            .ok_or_else(|| anyhow!("ticket {ticket} is not an open position under this magic-tag"))?;
        let outcome = broker
            .close_position(target.ticket, target.volume_micros)
            .await
            .map_err(|fault| anyhow!("closing ticket {ticket}: {fault}"))?;
        println!("closed ticket {ticket}: {outcome:?}");
        return Ok(());
    }

    let symbol = action.symbol.ok_or_else(|| anyhow!("--symbol is required to open a position"))?;
    let side = action.side.ok_or_else(|| anyhow!("--side is required to open a position"))?;
    let volume_lots = action.volume.ok_or_else(|| anyhow!("--volume is required to open a position"))?;
    if volume_lots <= 0.0 {
        bail!("--volume must be positive");
    }
    let volume_micros = (volume_lots * vigil_schemas::MICROS_SCALE as f64).round() as i64;

    let last_bar = broker
        .fetch_bars(&symbol, cfg.trading.timeframe_secs, 1)
        .await
        .map_err(|fault| anyhow!("fetching reference price for {symbol}: {fault}"))?;
    let reference_price_micros = last_bar
        .last()
        .ok_or_else(|| anyhow!("no bars available for {symbol}; cannot price a manual order"))?
        .close_micros;

    let req = OrderRequest {
        client_tag: format!("manual:{}", Uuid::new_v4()),
        symbol,
        side: match side {
            TradeSide::Buy => OrderSide::Buy,
            TradeSide::Sell => OrderSide::Sell,
        },
        volume_micros,
        order_type: OrderType::Market,
        reference_price_micros,
        limit_price_micros: None,
        stop_loss_micros: None,
        take_profit_micros: None,
        deviation_points: cfg.trading.deviation_points,
        magic_tag: cfg.trading.magic_tag,
    };

    let outcome = broker
        .submit_order(req)
        .await
        .map_err(|fault| anyhow!("submitting manual order: {fault}"))?;
    println!("{outcome:?}");
    Ok(())
}
