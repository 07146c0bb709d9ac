//! Shared setup the `run` and `trade` subcommands both need: loading and
//! validating config, resolving secrets, and building each pluggable piece
//! (indicator pipeline, strategy, exit rule set, risk limits, adoption
//! policy) from its config section.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use vigil_config::engine_config::{EngineConfig, ExitStrategySpec, IndicatorSpec};
use vigil_config::secrets::{resolve_secrets_for_mode, ResolvedSecrets};
use vigil_config::{load_layered_yaml_from_strings, mindset_preset_yaml};
use vigil_exits::{
    AdverseMovement, AdverseMovementConfig, ExitRule, ProfitLevel, ProfitTarget, ProfitTargetConfig,
    TimeBased, TimeBasedConfig, TrailingStop, TrailingStopConfig, WeeklyCloseWindow,
};
use vigil_indicators::{atr_indicator, rsi_indicator, sma_indicator, Indicator, Pipeline};
use vigil_portfolio::AdoptionPolicy;
use vigil_risk::RiskLimits;
use vigil_strategy::{MovingAverageCrossStrategy, PluginRegistry, Strategy, StrategyMeta};

/// Wraps any failure that originates in config loading/validation, so
/// `main` can map it to exit code 2 rather than the generic fatal code.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Marker wrapping a caught SIGINT/SIGTERM, so `main` can map it to exit
/// code 130 instead of the generic fatal code.
#[derive(Debug)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interrupted")
    }
}

impl std::error::Error for Interrupted {}

pub struct LoadedEngine {
    pub cfg: EngineConfig,
    pub config_hash: String,
    pub secrets: ResolvedSecrets,
}

/// Load + merge the named config files into one document. `mindset`, when
/// given, is spliced in as the very first layer so every file on the
/// command line can still override an individual preset field; a config
/// file that already declares `engine.mindset` gets the same treatment even
/// without a `--mindset` flag. Validates the merged document and resolves
/// secrets for the engine's own `mode` — a config run with `--dry-run`
/// still needs broker credentials to read a live bar feed, even though
/// orders never reach the broker, so secret resolution is keyed off `mode`
/// rather than the CLI flag.
pub fn load_engine(config_paths: &[String], mindset: Option<&str>) -> Result<LoadedEngine> {
    if let Some(name) = mindset {
        if mindset_preset_yaml(name).is_none() {
            bail!(ConfigError(format!("unknown mindset preset '{name}'")));
        }
    }

    let mut sources: Vec<String> = Vec::new();
    if let Some(name) = mindset {
        sources.push(mindset_preset_yaml(name).expect("checked above").to_string());
    }
    for path in config_paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {path}"))
            .map_err(|e| anyhow!(ConfigError(e.to_string())))?;
        sources.push(text);
    }

    let refs: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
    let mut loaded = load_layered_yaml_from_strings(&refs).map_err(|e| anyhow!(ConfigError(e.to_string())))?;

    // No `--mindset` flag, but the files themselves named one: re-merge
    // with that preset spliced in first, same as an explicit flag would.
    if mindset.is_none() {
        if let Some(declared) = loaded
            .config_json
            .pointer("/engine/mindset")
            .and_then(|v| v.as_str())
        {
            let preset_yaml = mindset_preset_yaml(declared)
                .ok_or_else(|| anyhow!(ConfigError(format!("unknown mindset preset '{declared}'"))))?;
            let mut re_sources = vec![preset_yaml.to_string()];
            re_sources.extend(sources.into_iter());
            let refs: Vec<&str> = re_sources.iter().map(|s| s.as_str()).collect();
            loaded = load_layered_yaml_from_strings(&refs).map_err(|e| anyhow!(ConfigError(e.to_string())))?;
        }
    }

    let cfg = EngineConfig::from_canonical_json(&loaded.config_json)
        .map_err(|e| anyhow!(ConfigError(e.to_string())))?;

    let secrets = resolve_secrets_for_mode(&loaded.config_json, &cfg.engine.mode)
        .map_err(|e| anyhow!(ConfigError(e.to_string())))?;

    Ok(LoadedEngine {
        cfg,
        config_hash: loaded.config_hash,
        secrets,
    })
}

pub fn risk_limits(cfg: &EngineConfig) -> RiskLimits {
    let r = &cfg.risk;
    RiskLimits {
        max_volume_per_order_micros: r.max_volume_per_order_micros,
        default_volume_micros: r.default_volume_micros,
        max_daily_loss_micros: r.max_daily_loss_micros,
        max_positions_per_symbol: r.max_positions_per_symbol,
        max_total_positions: r.max_total_positions,
        position_size_pct: r.position_size_pct,
        emergency_drawdown_fraction: r.emergency_drawdown_pct,
        circuit_breaker_enabled: r.circuit_breaker_enabled,
        broker_min_volume_micros: r.broker_min_volume_micros,
        lot_step_micros: r.lot_step_micros,
    }
}

/// Orphan-trade adoption is only as permissive as `orphan_trades.enabled`
/// allows: a disabled section still reports orphans (matching `log_only`'s
/// own meaning) rather than silently adopting them.
pub fn adoption_policy(cfg: &EngineConfig) -> AdoptionPolicy {
    let o = &cfg.orphan_trades;
    AdoptionPolicy {
        symbol_whitelist: o.adopt_symbols.clone(),
        symbol_blacklist: o.ignore_symbols.clone(),
        max_age: chrono::Duration::milliseconds((o.max_age_hours * 3_600_000.0) as i64),
        log_only: o.log_only || !o.enabled,
    }
}

fn param_f64(params: &BTreeMap<String, Value>, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn param_i64(params: &BTreeMap<String, Value>, key: &str, default: i64) -> i64 {
    params.get(key).and_then(Value::as_i64).unwrap_or(default)
}

fn param_u64(params: &BTreeMap<String, Value>, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn parse_naive_time(s: &str) -> Result<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| chrono::NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| anyhow!(ConfigError(format!("invalid time-of-day '{s}', expected HH:MM or HH:MM:SS"))))
}

fn parse_weekday(s: &str) -> Result<chrono::Weekday> {
    s.parse::<chrono::Weekday>()
        .map_err(|_| anyhow!(ConfigError(format!("invalid weekday '{s}'"))))
}

/// Parses the optional `weekend_protection` calendar trigger from a
/// `time_based` exit strategy's params: `{before_weekday, before_time,
/// lead_hours}`. Absent entirely when the section isn't configured.
fn weekend_protection_from_params(p: &BTreeMap<String, Value>) -> Result<Option<WeeklyCloseWindow>> {
    let Some(section) = p.get("weekend_protection").and_then(Value::as_object) else {
        return Ok(None);
    };
    let before_weekday = section
        .get("before_weekday")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!(ConfigError("weekend_protection requires 'before_weekday'".into())))?;
    let before_time = section
        .get("before_time")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!(ConfigError("weekend_protection requires 'before_time'".into())))?;
    let lead_hours = section.get("lead_hours").and_then(Value::as_f64).unwrap_or(2.0);

    Ok(Some(WeeklyCloseWindow {
        before_weekday: parse_weekday(before_weekday)?,
        before_time: parse_naive_time(before_time)?,
        lead_time: chrono::Duration::milliseconds((lead_hours * 3_600_000.0) as i64),
    }))
}

/// Parses the optional `day_trading_eod` cutoff (a bare `"HH:MM[:SS]"`
/// string) from a `time_based` exit strategy's params.
fn day_trading_eod_from_params(p: &BTreeMap<String, Value>) -> Result<Option<chrono::NaiveTime>> {
    p.get("day_trading_eod")
        .and_then(Value::as_str)
        .map(parse_naive_time)
        .transpose()
}

/// Parses `profit_target`'s `levels[]` — a list of `{profit_pct,
/// close_fraction}` pairs (scenario S6's partial-scale-out). Falls back to
/// a single level built from the flat `profit_pct`/`close_fraction` params
/// when `levels` is absent, so a single-target config doesn't need the
/// array form.
fn profit_levels_from_params(p: &BTreeMap<String, Value>) -> Result<Vec<ProfitLevel>> {
    let Some(levels) = p.get("levels").and_then(Value::as_array) else {
        return Ok(vec![ProfitLevel {
            profit_pct: param_f64(p, "profit_pct", 0.01),
            close_fraction: param_f64(p, "close_fraction", 1.0),
        }]);
    };

    levels
        .iter()
        .map(|level| {
            let profit_pct = level
                .get("profit_pct")
                .and_then(Value::as_f64)
                .ok_or_else(|| anyhow!(ConfigError("profit_target level requires 'profit_pct'".into())))?;
            let close_fraction = level
                .get("close_fraction")
                .and_then(Value::as_f64)
                .ok_or_else(|| anyhow!(ConfigError("profit_target level requires 'close_fraction'".into())))?;
            Ok(ProfitLevel { profit_pct, close_fraction })
        })
        .collect()
}

fn indicator_from_spec(spec: &IndicatorSpec) -> Result<Box<dyn Indicator>> {
    let period = param_u64(&spec.params, "period", 14) as usize;
    match spec.type_.as_str() {
        "sma" => Ok(sma_indicator(period)),
        "rsi" => Ok(rsi_indicator(period)),
        "atr" => Ok(atr_indicator(period)),
        other => bail!(ConfigError(format!("unknown indicator type '{other}'"))),
    }
}

pub fn indicator_pipeline(cfg: &EngineConfig) -> Result<Pipeline> {
    let indicators = cfg
        .indicators
        .iter()
        .map(indicator_from_spec)
        .collect::<Result<Vec<_>>>()?;
    Ok(Pipeline::new(indicators))
}

fn exit_rule_from_spec(spec: &ExitStrategySpec) -> Result<Box<dyn ExitRule>> {
    let p = &spec.params;
    let rule: Box<dyn ExitRule> = match spec.type_.as_str() {
        "adverse_movement" => Box::new(AdverseMovement::new(AdverseMovementConfig {
            adverse_pct: param_f64(p, "adverse_pct", 0.01),
            window: chrono::Duration::seconds(param_i64(p, "window_secs", 30)),
            consecutive_ticks: param_u64(p, "consecutive_ticks", 3) as u32,
            volatility_ceiling_micros: p.get("volatility_ceiling_micros").and_then(Value::as_i64),
            cooldown: chrono::Duration::seconds(param_i64(p, "cooldown_secs", 300)),
            enabled: spec.enabled,
        })),
        "time_based" => Box::new(TimeBased::new(TimeBasedConfig {
            max_hold: p
                .get("max_hold_hours")
                .and_then(Value::as_f64)
                .map(|h| chrono::Duration::milliseconds((h * 3_600_000.0) as i64)),
            weekend_protection: weekend_protection_from_params(p)?,
            day_trading_eod: day_trading_eod_from_params(p)?,
            enabled: spec.enabled,
        })),
        "profit_target" => Box::new(ProfitTarget::new(ProfitTargetConfig {
            levels: profit_levels_from_params(p)?,
            enabled: spec.enabled,
        })),
        "trailing_stop" => Box::new(TrailingStop::new(TrailingStopConfig {
            activation_profit_pct: param_f64(p, "activation_profit_pct", 0.005),
            atr_multiple: param_f64(p, "atr_multiple", 2.0),
            min_distance_micros: param_i64(p, "min_distance_micros", 500),
            enabled: spec.enabled,
        })),
        other => bail!(ConfigError(format!("unknown exit strategy type '{other}'"))),
    };
    Ok(rule)
}

pub fn exit_rules(cfg: &EngineConfig) -> Result<Vec<Box<dyn ExitRule>>> {
    cfg.exit_strategies.iter().map(exit_rule_from_spec).collect()
}

/// Only `ma_cross` is registered today; the registry exists so a second
/// strategy can be added without touching call sites that already go
/// through it.
pub fn strategy_for(cfg: &EngineConfig) -> Result<Box<dyn Strategy>> {
    let mut registry = PluginRegistry::new();
    let timeframe_secs = cfg.trading.timeframe_secs;
    let fast = param_u64(&cfg.strategy.params, "fast_period", 10) as usize;
    let slow = param_u64(&cfg.strategy.params, "slow_period", 30) as usize;

    registry
        .register(
            StrategyMeta::new("ma_cross", "1.0.0", timeframe_secs, "moving-average crossover"),
            move || Box::new(MovingAverageCrossStrategy::new(timeframe_secs, fast, slow)),
        )
        .map_err(|e| anyhow!(ConfigError(e.to_string())))?;

    registry
        .instantiate_verified(&cfg.strategy.type_)
        .map_err(|e| anyhow!(ConfigError(e.to_string())))
}
