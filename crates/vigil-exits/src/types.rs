use chrono::{DateTime, Utc};
use vigil_schemas::Metadata;

/// Everything an `ExitRule` is given on one evaluation. Distinct from
/// `vigil_indicators::StrategyContext`: strategies see a bar window, exit
/// rules see the broker's current server clock plus a single volatility
/// proxy shared by every rule this tick (this system trades one
/// symbol+timeframe, so one proxy value suffices.
#[derive(Debug, Clone, Copy)]
pub struct ExitContext {
    pub now_utc: DateTime<Utc>,
    /// ATR-style volatility proxy in price micros, if the indicator
    /// pipeline produced one this tick. `None` disables volatility-gated
    /// behaviour (AdverseMovement's filter never suppresses; TrailingStop
    /// falls back to its configured minimum distance floor).
    pub volatility_proxy_micros: Option<i64>,
}

/// Emitted by an `ExitRule` when a tracked position should be (fully or
/// partially) closed.
#[derive(Debug, Clone)]
pub struct ExitDecision {
    pub ticket: u64,
    pub rule_name: String,
    pub reason: String,
    /// Always `<= ` the position's volume at decision time; the Exit
    /// Arbiter does not clamp this, a conforming rule must.
    pub desired_close_volume_micros: i64,
    pub trigger_time_utc: DateTime<Utc>,
    pub confidence: f64,
    pub metadata: Metadata,
}
