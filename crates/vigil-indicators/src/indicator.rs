use std::collections::BTreeMap;

use crate::BarWindow;

/// A single named indicator updated once per new bar.
pub trait Indicator: Send {
    fn name(&self) -> &str;

    /// Recompute from the current window and return the latest value, or
    /// `None` if the window doesn't yet hold enough bars.
    fn update(&mut self, window: &BarWindow) -> Option<f64>;
}

/// Runs a fixed set of indicators over one bar window. An individual
/// indicator's failure to produce a value (not enough history yet) never
/// aborts the others; it just omits that entry from the output map.
pub struct Pipeline {
    indicators: Vec<Box<dyn Indicator>>,
}

impl Pipeline {
    pub fn new(indicators: Vec<Box<dyn Indicator>>) -> Self {
        Self { indicators }
    }

    pub fn run(&mut self, window: &BarWindow) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for ind in self.indicators.iter_mut() {
            if let Some(v) = ind.update(window) {
                out.insert(ind.name().to_string(), v);
            }
        }
        out
    }
}

struct SmaIndicator {
    period: usize,
}

impl Indicator for SmaIndicator {
    fn name(&self) -> &str {
        "sma"
    }

    fn update(&mut self, window: &BarWindow) -> Option<f64> {
        crate::reference::sma(&window.closes_micros(), self.period)
    }
}

struct RsiIndicator {
    period: usize,
}

impl Indicator for RsiIndicator {
    fn name(&self) -> &str {
        "rsi"
    }

    fn update(&mut self, window: &BarWindow) -> Option<f64> {
        crate::reference::rsi(&window.closes_micros(), self.period)
    }
}

struct AtrIndicator {
    period: usize,
}

impl Indicator for AtrIndicator {
    fn name(&self) -> &str {
        "atr"
    }

    fn update(&mut self, window: &BarWindow) -> Option<f64> {
        let highs: Vec<i64> = window.iter().map(|b| b.high_micros).collect();
        let lows: Vec<i64> = window.iter().map(|b| b.low_micros).collect();
        let closes = window.closes_micros();
        crate::reference::atr(&highs, &lows, &closes, self.period)
    }
}

pub fn sma_indicator(period: usize) -> Box<dyn Indicator> {
    Box::new(SmaIndicator { period })
}

pub fn rsi_indicator(period: usize) -> Box<dyn Indicator> {
    Box::new(RsiIndicator { period })
}

/// Volatility proxy feeding `ExitContext.volatility_proxy_micros`. Named "atr" in the pipeline's output
/// map so the control loop can look it up without a special case.
pub fn atr_indicator(period: usize) -> Box<dyn Indicator> {
    Box::new(AtrIndicator { period })
}
