//! Shared scaffolding for the `ControlLoop` scenario tests: a scriptable
//! strategy double and a bar-pushing helper, so each scenario can drive a
//! precise, deterministic sequence of Enter/Exit outputs instead of relying
//! on a real crossover strategy's indicator math.

use std::collections::VecDeque;

use chrono::Utc;
use vigil_broker::MockBrokerSession;
use vigil_strategy::{Strategy, StrategyContext, StrategyOutput, StrategySpec};

/// A strategy double that yields a fixed, scripted queue of outputs, one
/// per `on_bar` call, then `NoAction` forever once the queue drains.
pub struct ScriptedStrategy {
    timeframe_secs: u32,
    queue: VecDeque<StrategyOutput>,
}

impl ScriptedStrategy {
    pub fn new(timeframe_secs: u32, outputs: Vec<StrategyOutput>) -> Self {
        Self {
            timeframe_secs,
            queue: outputs.into(),
        }
    }
}

impl Strategy for ScriptedStrategy {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("scripted", self.timeframe_secs)
    }

    fn on_bar(&mut self, _ctx: &StrategyContext) -> StrategyOutput {
        self.queue.pop_front().unwrap_or(StrategyOutput::NoAction)
    }
}

/// Append one closed bar to `symbol`'s feed on `broker`, strictly later than
/// any bar pushed before it, so `is_new_bar` always recognises it.
pub fn push_bar(broker: &MockBrokerSession, symbol: &str, idx: i64, close_micros: i64) {
    broker.push_bar(
        symbol,
        vigil_schemas::Bar {
            ts_open_utc: Utc::now() - chrono::Duration::minutes(2_000 - idx),
            ts_close_utc: Utc::now() - chrono::Duration::minutes(1_999 - idx),
            timeframe_secs: 60,
            open_micros: close_micros,
            high_micros: close_micros,
            low_micros: close_micros,
            close_micros,
            volume_micros: 0,
        },
    );
}
