//! Typed, validated view over the loaded config JSON.
//!
//! [`crate::load_layered_yaml`] produces an untyped, canonicalized
//! [`crate::LoadedConfig`]; this module deserializes that JSON into a
//! strict, `deny_unknown_fields` struct tree so a typo in a config file
//! fails fast at startup instead of silently being ignored. Field groups
//! mirror the recognised option groups exactly: `broker.*`, `trading.*`, `risk.*`,
//! `strategy.*`, `indicators[]`, `exit_strategies[]`, `orphan_trades.*`,
//! `mindset`, `persistence.*`, `dry_run`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub engine_id: String,
    pub mode: String,
    #[serde(default)]
    pub mindset: Option<String>,
}

/// Broker connection parameters: `broker.{login, password,
/// server, timeout_ms, terminal_path}`. `login`/`password` are never the
/// literal secret: they name the environment variable [`crate::secrets`]
/// resolves at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    pub login_env: String,
    pub password_env: String,
    pub server: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub terminal_path: Option<String>,
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// `trading.{symbol, timeframe, poll_interval_seconds,
/// lookback_bars, magic_tag, deviation_points}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradingSection {
    pub symbol: String,
    pub timeframe_secs: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_lookback_bars")]
    pub lookback_bars: usize,
    pub magic_tag: u64,
    #[serde(default = "default_deviation_points")]
    pub deviation_points: u32,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_lookback_bars() -> usize {
    200
}

fn default_deviation_points() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskSection {
    pub max_volume_per_order_micros: i64,
    pub default_volume_micros: i64,
    pub max_daily_loss_micros: i64,
    pub max_positions_per_symbol: u32,
    pub max_total_positions: u32,
    pub position_size_pct: f64,
    pub emergency_drawdown_pct: f64,
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
    #[serde(default = "default_broker_min_volume_micros")]
    pub broker_min_volume_micros: i64,
    #[serde(default = "default_lot_step_micros")]
    pub lot_step_micros: i64,
}

fn default_true() -> bool {
    true
}

fn default_broker_min_volume_micros() -> i64 {
    1_000 // 0.001 lots
}

fn default_lot_step_micros() -> i64 {
    10_000 // 0.01 lots
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategySection {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// One entry of `indicators[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorSpec {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// One entry of `exit_strategies[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExitStrategySpec {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    #[serde(default = "default_fill_timeout_secs")]
    pub fill_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_submit_retries: u32,
    #[serde(default = "default_min_call_interval_ms")]
    pub min_call_interval_ms: u64,
}

fn default_fill_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_call_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceSection {
    #[serde(default)]
    pub database_url_env: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// `orphan_trades.{enabled, adopt_symbols[], ignore_symbols[],
/// max_age_hours, log_only}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrphanTradesSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub adopt_symbols: Vec<String>,
    #[serde(default)]
    pub ignore_symbols: Vec<String>,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: f64,
    #[serde(default)]
    pub log_only: bool,
}

fn default_max_age_hours() -> f64 {
    72.0
}

/// Top-level, validated engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub engine: EngineSection,
    #[serde(default)]
    pub broker: Option<BrokerSection>,
    pub trading: TradingSection,
    pub risk: RiskSection,
    pub strategy: StrategySection,
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
    #[serde(default)]
    pub exit_strategies: Vec<ExitStrategySpec>,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub orphan_trades: OrphanTradesSection,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            fill_timeout_secs: default_fill_timeout_secs(),
            max_submit_retries: default_max_retries(),
            min_call_interval_ms: default_min_call_interval_ms(),
        }
    }
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            database_url_env: None,
            enabled: true,
        }
    }
}

impl Default for OrphanTradesSection {
    fn default() -> Self {
        Self {
            enabled: false,
            adopt_symbols: Vec::new(),
            ignore_symbols: Vec::new(),
            max_age_hours: default_max_age_hours(),
            log_only: false,
        }
    }
}

impl EngineConfig {
    pub fn from_canonical_json(config_json: &serde_json::Value) -> Result<Self> {
        let cfg: EngineConfig = serde_json::from_value(config_json.clone())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.risk.max_volume_per_order_micros <= 0 {
            bail!("risk.max_volume_per_order_micros must be positive");
        }
        if self.risk.default_volume_micros <= 0 {
            bail!("risk.default_volume_micros must be positive");
        }
        if self.risk.default_volume_micros > self.risk.max_volume_per_order_micros {
            bail!("risk.default_volume_micros must not exceed risk.max_volume_per_order_micros");
        }
        if !(0.0..=1.0).contains(&self.risk.position_size_pct) {
            bail!("risk.position_size_pct must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.risk.emergency_drawdown_pct) {
            bail!("risk.emergency_drawdown_pct must be in [0, 1]");
        }
        if self.risk.lot_step_micros <= 0 {
            bail!("risk.lot_step_micros must be positive");
        }
        if self.trading.timeframe_secs == 0 {
            bail!("trading.timeframe_secs must be nonzero");
        }
        if self.trading.lookback_bars == 0 {
            bail!("trading.lookback_bars must be nonzero");
        }
        let mode = self.engine.mode.to_ascii_lowercase();
        if mode != "live" && mode != "paper" && mode != "dry_run" {
            bail!("engine.mode must be one of: live | paper | dry_run, got '{mode}'");
        }
        if (mode == "live" || mode == "paper") && self.broker.is_none() && !self.dry_run {
            bail!("engine.mode={mode} requires a [broker] section unless dry_run=true");
        }
        for ex in &self.exit_strategies {
            if ex.type_.trim().is_empty() {
                bail!("exit_strategies[] entries must have a non-empty type");
            }
        }
        Ok(())
    }
}

/// Mindset presets are named bundles of config overrides. Resolving one is
/// just another deep-merge layer applied before the user's own files, so a
/// preset can be overridden by anything loaded after it.
pub fn mindset_preset_yaml(name: &str) -> Option<&'static str> {
    match name {
        "conservative" => Some(CONSERVATIVE_PRESET),
        "balanced" => Some(BALANCED_PRESET),
        "aggressive" => Some(AGGRESSIVE_PRESET),
        _ => None,
    }
}

const CONSERVATIVE_PRESET: &str = r#"
risk:
  position_size_pct: 0.01
  emergency_drawdown_pct: 0.10
  max_total_positions: 3
exit_strategies:
  - type: trailing_stop
    enabled: true
    params:
      activation_profit_pct: 0.5
"#;

const BALANCED_PRESET: &str = r#"
risk:
  position_size_pct: 0.02
  emergency_drawdown_pct: 0.15
  max_total_positions: 5
"#;

const AGGRESSIVE_PRESET: &str = r#"
risk:
  position_size_pct: 0.05
  emergency_drawdown_pct: 0.25
  max_total_positions: 10
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> serde_json::Value {
        serde_json::json!({
            "engine": {"engine_id": "main", "mode": "dry_run"},
            "trading": {
                "symbol": "EURUSD",
                "timeframe_secs": 300,
                "poll_interval_seconds": 60,
                "lookback_bars": 200,
                "magic_tag": 778899
            },
            "risk": {
                "max_volume_per_order_micros": 10_000_000,
                "default_volume_micros": 1_000_000,
                "max_daily_loss_micros": 50_000_000,
                "max_positions_per_symbol": 2,
                "max_total_positions": 5,
                "position_size_pct": 0.02,
                "emergency_drawdown_pct": 0.2,
                "circuit_breaker_enabled": true
            },
            "strategy": {"type": "ma_cross", "params": {}}
        })
    }

    #[test]
    fn valid_config_parses_and_validates() {
        EngineConfig::from_canonical_json(&valid_json()).unwrap();
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut v = valid_json();
        v["engine"]["bogus_field"] = serde_json::json!(true);
        assert!(EngineConfig::from_canonical_json(&v).is_err());
    }

    #[test]
    fn live_mode_requires_broker() {
        let mut v = valid_json();
        v["engine"]["mode"] = serde_json::json!("live");
        assert!(EngineConfig::from_canonical_json(&v).is_err());
    }

    #[test]
    fn known_mindset_presets_resolve() {
        assert!(mindset_preset_yaml("conservative").is_some());
        assert!(mindset_preset_yaml("balanced").is_some());
        assert!(mindset_preset_yaml("aggressive").is_some());
        assert!(mindset_preset_yaml("unknown").is_none());
    }
}
