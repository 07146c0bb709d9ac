use vigil_indicators::reference::sma;
use vigil_schemas::Side;

use crate::{Strategy, StrategyContext, StrategyOutput, StrategySpec};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CrossState {
    Flat,
    Long,
}

/// Reference strategy: goes long when the fast SMA crosses above the slow
/// SMA, exits when it crosses back below. Holds no broker state and no
/// short side — it exists to give the runtime something concrete to drive
/// end to end, not to be a production signal.
pub struct MovingAverageCrossStrategy {
    strategy_id: String,
    timeframe_secs: u32,
    fast_period: usize,
    slow_period: usize,
    state: CrossState,
}

impl MovingAverageCrossStrategy {
    pub fn new(timeframe_secs: u32, fast_period: usize, slow_period: usize) -> Self {
        Self {
            strategy_id: "ma_cross".to_string(),
            timeframe_secs,
            fast_period,
            slow_period,
            state: CrossState::Flat,
        }
    }
}

impl Strategy for MovingAverageCrossStrategy {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(self.strategy_id.clone(), self.timeframe_secs)
    }

    fn on_bar(&mut self, ctx: &StrategyContext) -> StrategyOutput {
        let closes = ctx.window.closes_micros();
        let (Some(fast), Some(slow)) = (sma(&closes, self.fast_period), sma(&closes, self.slow_period)) else {
            return StrategyOutput::NoAction;
        };

        match self.state {
            CrossState::Flat if fast > slow => {
                self.state = CrossState::Long;
                StrategyOutput::Enter(Side::Long)
            }
            CrossState::Long if fast <= slow => {
                self.state = CrossState::Flat;
                StrategyOutput::Exit
            }
            _ => StrategyOutput::NoAction,
        }
    }
}
