use std::collections::BTreeMap;

use vigil_indicators::BarWindow;
use vigil_schemas::Side;

/// Strategy identity and the one timeframe it expects to be driven on.
/// Exactly one strategy may be registered with a [`crate::StrategyHost`] at
/// a time and its timeframe must match the bar feed's — this crate has no
/// notion of running several strategies concurrently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategySpec {
    pub strategy_id: String,
    pub timeframe_secs: u32,
}

impl StrategySpec {
    pub fn new(strategy_id: impl Into<String>, timeframe_secs: u32) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            timeframe_secs,
        }
    }
}

/// Everything a strategy is given on a bar close. No broker or DB access:
/// a strategy is a pure function of recent bars and indicator values.
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    pub timeframe_secs: u32,
    pub window: &'a BarWindow,
    pub indicators: &'a BTreeMap<String, f64>,
}

/// A strategy's decision for one symbol on one bar close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrategyOutput {
    NoAction,
    Enter(Side),
    Exit,
}

pub trait Strategy: Send {
    fn spec(&self) -> StrategySpec;

    fn on_bar(&mut self, ctx: &StrategyContext) -> StrategyOutput;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrategyHostError {
    MultiStrategyNotAllowed,
    TimeframeMismatch { expected_secs: u32, got_secs: u32 },
    NoStrategyRegistered,
}

impl std::fmt::Display for StrategyHostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyHostError::MultiStrategyNotAllowed => {
                write!(f, "a strategy is already registered; only one may run at a time")
            }
            StrategyHostError::TimeframeMismatch { expected_secs, got_secs } => {
                write!(f, "timeframe mismatch: strategy expects {expected_secs}s, bar feed supplied {got_secs}s")
            }
            StrategyHostError::NoStrategyRegistered => write!(f, "no strategy registered"),
        }
    }
}

impl std::error::Error for StrategyHostError {}

/// Whether live intents execute against the broker or are just recorded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShadowMode {
    Off,
    On,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntentMode {
    Live,
    Shadow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyIntents {
    pub mode: IntentMode,
    pub output: StrategyOutput,
}

impl StrategyIntents {
    pub fn should_execute(&self) -> bool {
        self.mode == IntentMode::Live && !matches!(self.output, StrategyOutput::NoAction)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyBarResult {
    pub spec: StrategySpec,
    pub intents: StrategyIntents,
}
