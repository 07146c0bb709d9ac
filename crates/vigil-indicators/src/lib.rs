//! Bar feed bookkeeping and the indicator pipeline that runs on every new
//! closed bar.
//!
//! Indicator math (moving averages, RSI, ATR) is float-based on purpose:
//! unlike money and volume, these are continuous statistics derived from a
//! rolling window, and forcing them into the fixed-point micros convention
//! used everywhere else would buy nothing but noise.

pub mod indicator;
pub mod reference;
pub mod window;

pub use indicator::{atr_indicator, rsi_indicator, sma_indicator, Indicator, Pipeline};
pub use reference::{atr, ema, rsi, sma};
pub use window::BarWindow;

use vigil_schemas::Bar;

/// True when `candidate` closes strictly after the last bar held in
/// `window`, i.e. it is a genuinely new bar rather than a re-delivery or
/// out-of-order duplicate from the broker's bar feed.
pub fn is_new_bar(window: &BarWindow, candidate: &Bar) -> bool {
    match window.last() {
        Some(last) => candidate.ts_close_utc > last.ts_close_utc,
        None => true,
    }
}
