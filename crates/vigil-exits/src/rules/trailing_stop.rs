use std::collections::HashMap;

use vigil_schemas::{Metadata, PositionRecord, Side};

use crate::rule::ExitRule;
use crate::types::{ExitContext, ExitDecision};

#[derive(Debug, Clone)]
pub struct TrailingStopConfig {
    /// The rule is inert until unrealized profit reaches this fraction of
    /// the open price.
    pub activation_profit_pct: f64,
    /// Multiplier applied to the ATR-style volatility proxy to derive the
    /// trailing distance.
    pub atr_multiple: f64,
    /// Floor on the trailing distance (price micros) used when no
    /// volatility proxy is available, or the ATR-derived distance would
    /// be tighter than this.
    pub min_distance_micros: i64,
    pub enabled: bool,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            activation_profit_pct: 0.005,
            atr_multiple: 2.0,
            min_distance_micros: 500,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scratch {
    best_price_micros: i64,
}

/// Priority 25, lowest: only engages once a position is
/// already in profit, and only after every higher-priority rule passes.
pub struct TrailingStop {
    config: TrailingStopConfig,
    scratch: HashMap<u64, Scratch>,
}

impl TrailingStop {
    pub fn new(config: TrailingStopConfig) -> Self {
        Self { config, scratch: HashMap::new() }
    }

    fn profit_pct(pos: &PositionRecord, price: i64) -> f64 {
        let open = pos.open_price_micros as f64;
        if open == 0.0 {
            return 0.0;
        }
        let delta = (price - pos.open_price_micros) as f64 / open;
        match pos.side {
            Side::Long => delta,
            Side::Short => -delta,
        }
    }

    fn trailing_distance(&self, ctx: &ExitContext) -> i64 {
        match ctx.volatility_proxy_micros {
            Some(atr) => {
                let derived = (atr as f64 * self.config.atr_multiple).round() as i64;
                derived.max(self.config.min_distance_micros)
            }
            None => self.config.min_distance_micros,
        }
    }
}

impl ExitRule for TrailingStop {
    fn name(&self) -> &str {
        "trailing_stop"
    }

    fn priority(&self) -> u8 {
        25
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn evaluate(&mut self, pos: &PositionRecord, ctx: &ExitContext) -> Option<ExitDecision> {
        if Self::profit_pct(pos, pos.current_price_micros) < self.config.activation_profit_pct {
            // Not active yet; drop any stale scratch so a future
            // activation starts the trail fresh from the current price.
            self.scratch.remove(&pos.ticket);
            return None;
        }

        let distance = self.trailing_distance(ctx);
        let entry = self.scratch.entry(pos.ticket).or_insert(Scratch {
            best_price_micros: pos.current_price_micros,
        });

        let improved = match pos.side {
            Side::Long => pos.current_price_micros > entry.best_price_micros,
            Side::Short => pos.current_price_micros < entry.best_price_micros,
        };
        if improved {
            entry.best_price_micros = pos.current_price_micros;
            return None;
        }

        let retraced = match pos.side {
            Side::Long => entry.best_price_micros - pos.current_price_micros >= distance,
            Side::Short => pos.current_price_micros - entry.best_price_micros >= distance,
        };
        if !retraced {
            return None;
        }

        self.scratch.remove(&pos.ticket);
        Some(ExitDecision {
            ticket: pos.ticket,
            rule_name: self.name().to_string(),
            reason: format!("trailing stop retraced {}μ from best price", distance),
            desired_close_volume_micros: pos.volume_micros,
            trigger_time_utc: ctx.now_utc,
            confidence: 1.0,
            metadata: Metadata::new(),
        })
    }

    fn on_position_closed(&mut self, ticket: u64) {
        self.scratch.remove(&ticket);
    }
}
