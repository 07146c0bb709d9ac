use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use vigil_schemas::MICROS_SCALE as SCHEMA_MICROS_SCALE;

/// Re-exported so callers that only depend on `vigil-risk` don't also need
/// `vigil-schemas` just for the scale constant.
pub const MICROS_SCALE: i64 = SCHEMA_MICROS_SCALE;

/// Static risk configuration for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_volume_per_order_micros: i64,
    pub default_volume_micros: i64,
    pub max_daily_loss_micros: i64,
    pub max_positions_per_symbol: u32,
    pub max_total_positions: u32,
    pub position_size_pct: f64,
    pub emergency_drawdown_fraction: f64,
    pub circuit_breaker_enabled: bool,
    pub broker_min_volume_micros: i64,
    pub lot_step_micros: i64,
}

/// Mutable risk state the control loop owns for the process lifetime.
/// `tick` must be called once per control-loop tick, before `evaluate`, so
/// day-rollover and peak-equity bookkeeping stay current.
#[derive(Debug, Clone, Default)]
pub struct RiskState {
    pub circuit_breaker_open: bool,
    pub last_server_date: Option<NaiveDate>,
    pub realized_today_micros: i64,
    pub session_start_equity_micros: Option<i64>,
    pub peak_equity_micros: Option<i64>,
    pub emergency_halt_requested: bool,
}

/// Everything the gate needs about the candidate trade and current book,
/// besides the static `RiskLimits` and mutable `RiskState`.
#[derive(Debug, Clone)]
pub struct RiskInput {
    pub symbol: String,
    pub reference_price_micros: i64,
    pub stop_loss_micros: Option<i64>,
    pub open_positions_for_symbol: u32,
    pub open_positions_total: u32,
}

/// Stable, distinct refusal codes. Every `Refused` decision
/// carries exactly one of these plus a human-legible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefusalCode {
    TradingDisabled,
    SymbolCap,
    TotalCap,
    DailyLossBreached,
    ZeroOrNegativeSize,
    VolumeBelowBrokerMinimum,
    VolumeAboveConfigMax,
    InsufficientMargin,
    CircuitBreakerOpen,
}

impl RefusalCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RefusalCode::TradingDisabled => "trading_disabled",
            RefusalCode::SymbolCap => "symbol_cap",
            RefusalCode::TotalCap => "total_cap",
            RefusalCode::DailyLossBreached => "daily_loss_breached",
            RefusalCode::ZeroOrNegativeSize => "zero_or_negative_size",
            RefusalCode::VolumeBelowBrokerMinimum => "volume_below_broker_minimum",
            RefusalCode::VolumeAboveConfigMax => "volume_above_config_max",
            RefusalCode::InsufficientMargin => "insufficient_margin",
            RefusalCode::CircuitBreakerOpen => "circuit_breaker_open",
        }
    }
}

/// Output of the risk gate for one candidate signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Approved { volume_micros: i64 },
    Refused { code: RefusalCode, message: String },
}

impl RiskDecision {
    pub fn refuse(code: RefusalCode, message: impl Into<String>) -> Self {
        RiskDecision::Refused {
            code,
            message: message.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved { .. })
    }
}

/// Timestamp the gate uses for day-rollover detection; always the broker's
/// `server_time`, never a local clock read.
pub fn server_date(server_time: DateTime<Utc>) -> NaiveDate {
    server_time.date_naive()
}
