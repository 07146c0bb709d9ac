//! Strategy hosting.
//!
//! Contract:
//! - A strategy emits a directional decision (`StrategyOutput`), never a
//!   sized order; sizing and ticket bookkeeping belong downstream.
//! - Exactly one strategy may run per host for the lifetime of a process.
//! - Shadow mode lets a strategy run and be recorded without ever reaching
//!   the broker.
//! - `on_bar` is a pure function of the bar window and indicator values
//!   supplied in `StrategyContext`; strategies never touch the broker or a
//!   database directly.

mod host;
mod ma_cross;
mod plugin_registry;
mod types;

pub use host::*;
pub use ma_cross::*;
pub use plugin_registry::*;
pub use types::*;
