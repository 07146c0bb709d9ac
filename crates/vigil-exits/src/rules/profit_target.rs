use std::collections::HashMap;

use vigil_schemas::{Metadata, PositionRecord, Side};

use crate::rule::ExitRule;
use crate::types::{ExitContext, ExitDecision};

/// One scaling-out level: at `profit_pct` gain, close `close_fraction` of
/// the position's *original* volume.
#[derive(Debug, Clone, Copy)]
pub struct ProfitLevel {
    pub profit_pct: f64,
    pub close_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct ProfitTargetConfig {
    /// Levels, ascending by `profit_pct`. Order matters: earlier levels
    /// fire before later ones even if price jumps past several at once
    /// (only one level fires per tick).
    pub levels: Vec<ProfitLevel>,
    pub enabled: bool,
}

impl Default for ProfitTargetConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                ProfitLevel { profit_pct: 0.01, close_fraction: 0.5 },
                ProfitLevel { profit_pct: 0.02, close_fraction: 1.0 },
            ],
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Scratch {
    original_volume_micros: Option<i64>,
    levels_fired: usize,
}

/// Priority 40. Scales out of a winning position at one or
/// more configured profit levels, in order.
pub struct ProfitTarget {
    config: ProfitTargetConfig,
    scratch: HashMap<u64, Scratch>,
}

impl ProfitTarget {
    pub fn new(config: ProfitTargetConfig) -> Self {
        Self { config, scratch: HashMap::new() }
    }

    fn profit_pct_now(pos: &PositionRecord) -> f64 {
        let open = pos.open_price_micros as f64;
        if open == 0.0 {
            return 0.0;
        }
        let delta = (pos.current_price_micros - pos.open_price_micros) as f64 / open;
        match pos.side {
            Side::Long => delta,
            Side::Short => -delta,
        }
    }
}

impl ExitRule for ProfitTarget {
    fn name(&self) -> &str {
        "profit_target"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn evaluate(&mut self, pos: &PositionRecord, ctx: &ExitContext) -> Option<ExitDecision> {
        if self.config.levels.is_empty() {
            return None;
        }
        let entry = self.scratch.entry(pos.ticket).or_default();
        // Remember the volume the position had the first time this rule
        // ever saw it, so `close_fraction` stays anchored to the original
        // size across multiple partial closes rather than re-basing on
        // whatever volume remains after the previous fire.
        let original = *entry.original_volume_micros.get_or_insert(pos.volume_micros);

        if entry.levels_fired >= self.config.levels.len() {
            return None;
        }
        let level = self.config.levels[entry.levels_fired];
        if Self::profit_pct_now(pos) < level.profit_pct {
            return None;
        }

        let close_volume = ((original as f64) * level.close_fraction).round() as i64;
        let close_volume = close_volume.min(pos.volume_micros);
        entry.levels_fired += 1;

        Some(ExitDecision {
            ticket: pos.ticket,
            rule_name: self.name().to_string(),
            reason: format!(
                "profit target level {} reached ({:.2}%)",
                entry.levels_fired,
                level.profit_pct * 100.0
            ),
            desired_close_volume_micros: close_volume,
            trigger_time_utc: ctx.now_utc,
            confidence: 1.0,
            metadata: Metadata::new(),
        })
    }

    fn on_position_closed(&mut self, ticket: u64) {
        self.scratch.remove(&ticket);
    }
}
