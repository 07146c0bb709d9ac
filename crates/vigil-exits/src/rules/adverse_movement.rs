use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use vigil_schemas::{Metadata, PositionRecord, Side};

use crate::rule::ExitRule;
use crate::types::{ExitContext, ExitDecision};

#[derive(Debug, Clone)]
pub struct AdverseMovementConfig {
    /// Adverse move, as a fraction of open price, that counts as a hit
    /// (e.g. `0.01` = 1%).
    pub adverse_pct: f64,
    /// Recent-lookback bound: only adverse observations within this many
    /// seconds of "now" count toward `consecutive_ticks`.
    pub window: chrono::Duration,
    /// Number of adverse-direction observations that must fall within
    /// `window` before the rule fires, once the current move also crosses
    /// `adverse_pct`.
    pub consecutive_ticks: u32,
    /// When `Some`, a tick whose `volatility_proxy_micros` exceeds this
    /// ceiling suppresses the rule entirely — treat a wide-spread / high
    /// volatility tick as noise, not a signal.
    pub volatility_ceiling_micros: Option<i64>,
    /// Minimum time between two fires on the same ticket.
    pub cooldown: chrono::Duration,
    pub enabled: bool,
}

impl Default for AdverseMovementConfig {
    fn default() -> Self {
        Self {
            adverse_pct: 0.01,
            window: chrono::Duration::seconds(60),
            consecutive_ticks: 3,
            volatility_ceiling_micros: None,
            cooldown: chrono::Duration::minutes(5),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Scratch {
    /// Timestamps of recent observations where price sat in the adverse
    /// direction, oldest first, pruned to `window` on every evaluation.
    recent_adverse: VecDeque<DateTime<Utc>>,
    last_fired: Option<DateTime<Utc>>,
}

/// Highest-priority exit rule. Detects a
/// sustained adverse price move against an open position and flattens it
/// before `ProfitTarget`/`TrailingStop` get a chance to run.
pub struct AdverseMovement {
    config: AdverseMovementConfig,
    scratch: HashMap<u64, Scratch>,
}

impl AdverseMovement {
    pub fn new(config: AdverseMovementConfig) -> Self {
        Self { config, scratch: HashMap::new() }
    }

    fn adverse_pct_now(pos: &PositionRecord) -> f64 {
        let open = pos.open_price_micros as f64;
        if open == 0.0 {
            return 0.0;
        }
        let delta = (pos.current_price_micros - pos.open_price_micros) as f64 / open;
        match pos.side {
            Side::Long => -delta,
            Side::Short => delta,
        }
    }
}

impl ExitRule for AdverseMovement {
    fn name(&self) -> &str {
        "adverse_movement"
    }

    fn priority(&self) -> u8 {
        90
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn evaluate(&mut self, pos: &PositionRecord, ctx: &ExitContext) -> Option<ExitDecision> {
        if let (Some(proxy), Some(ceiling)) =
            (ctx.volatility_proxy_micros, self.config.volatility_ceiling_micros)
        {
            if proxy > ceiling {
                return None;
            }
        }

        let entry = self.scratch.entry(pos.ticket).or_default();

        if let Some(last) = entry.last_fired {
            if ctx.now_utc - last < self.config.cooldown {
                return None;
            }
        }

        let adverse_pct_now = Self::adverse_pct_now(pos);
        if adverse_pct_now <= 0.0 {
            // Price recovered into non-adverse territory: the streak of
            // consecutive adverse observations is broken.
            entry.recent_adverse.clear();
            return None;
        }

        entry.recent_adverse.push_back(ctx.now_utc);
        while let Some(&oldest) = entry.recent_adverse.front() {
            if ctx.now_utc - oldest > self.config.window {
                entry.recent_adverse.pop_front();
            } else {
                break;
            }
        }

        let enough_ticks = entry.recent_adverse.len() >= self.config.consecutive_ticks as usize;
        let crossed_threshold = adverse_pct_now >= self.config.adverse_pct;

        if !(enough_ticks && crossed_threshold) {
            return None;
        }

        entry.last_fired = Some(ctx.now_utc);
        entry.recent_adverse.clear();

        Some(ExitDecision {
            ticket: pos.ticket,
            rule_name: self.name().to_string(),
            reason: format!(
                "adverse move {:.3}% confirmed by {} observations within {}s",
                adverse_pct_now * 100.0,
                self.config.consecutive_ticks,
                self.config.window.num_seconds(),
            ),
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
