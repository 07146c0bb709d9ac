use std::collections::HashSet;

use chrono::NaiveTime;
use vigil_schemas::{Metadata, PositionRecord};

use crate::calendar::{past_day_trading_eod, within_weekend_protection, WeeklyCloseWindow};
use crate::rule::ExitRule;
use crate::types::{ExitContext, ExitDecision};

#[derive(Debug, Clone)]
pub struct TimeBasedConfig {
    /// Maximum time a position may stay open, regardless of P&L.
    pub max_hold: Option<chrono::Duration>,
    /// Flatten ahead of the weekly market close.
    pub weekend_protection: Option<WeeklyCloseWindow>,
    /// Flatten at a fixed time of day (day-trading books that never carry
    /// overnight risk).
    pub day_trading_eod: Option<NaiveTime>,
    pub enabled: bool,
}

impl Default for TimeBasedConfig {
    fn default() -> Self {
        Self {
            max_hold: Some(chrono::Duration::hours(72)),
            weekend_protection: None,
            day_trading_eod: None,
            enabled: true,
        }
    }
}

/// Priority 50: closes positions on elapsed-time or
/// session-calendar grounds rather than price action.
pub struct TimeBased {
    config: TimeBasedConfig,
    fired_today: HashSet<u64>,
}

impl TimeBased {
    pub fn new(config: TimeBasedConfig) -> Self {
        Self { config, fired_today: HashSet::new() }
    }

    fn decide(&self, pos: &PositionRecord, ctx: &ExitContext) -> Option<String> {
        if let Some(max_hold) = self.config.max_hold {
            if ctx.now_utc - pos.open_time_utc >= max_hold {
                return Some(format!("max hold of {}h exceeded", max_hold.num_hours()));
            }
        }
        if let Some(window) = &self.config.weekend_protection {
            if within_weekend_protection(window, ctx.now_utc) {
                return Some("weekend protection window".to_string());
            }
        }
        if let Some(eod) = self.config.day_trading_eod {
            if past_day_trading_eod(eod, ctx.now_utc) {
                return Some("day-trading end-of-day cutoff".to_string());
            }
        }
        None
    }
}

impl ExitRule for TimeBased {
    fn name(&self) -> &str {
        "time_based"
    }

    fn priority(&self) -> u8 {
        50
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn evaluate(&mut self, pos: &PositionRecord, ctx: &ExitContext) -> Option<ExitDecision> {
        // The calendar-based triggers (weekend/EOD) would re-fire every
        // tick inside the same window once the position is already
        // flagged; max-hold naturally self-clears once the position
        // closes. Dedup per ticket so the arbiter only sees one decision
        // for a calendar window, not one per tick inside it.
        if self.fired_today.contains(&pos.ticket) {
            return None;
        }
        let reason = self.decide(pos, ctx)?;
        self.fired_today.insert(pos.ticket);
        Some(ExitDecision {
            ticket: pos.ticket,
            rule_name: self.name().to_string(),
            reason,
            desired_close_volume_micros: pos.volume_micros,
            trigger_time_utc: ctx.now_utc,
            confidence: 1.0,
            metadata: Metadata::new(),
        })
    }

    fn on_position_closed(&mut self, ticket: u64) {
        self.fired_today.remove(&ticket);
    }
}
