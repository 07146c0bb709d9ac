use std::collections::BTreeMap;

use vigil_indicators::BarWindow;
use vigil_schemas::Side;
use vigil_strategy::*;

struct Dummy;
impl Strategy for Dummy {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("dummy", 60)
    }

    fn on_bar(&mut self, _ctx: &StrategyContext) -> StrategyOutput {
        StrategyOutput::Enter(Side::Long)
    }
}

#[test]
fn scenario_timeframe_mismatch_rejection() {
    let mut host = StrategyHost::new(ShadowMode::Off);
    host.register(Box::new(Dummy)).unwrap();

    let window = BarWindow::new(5);
    let indicators = BTreeMap::new();
    let ctx = StrategyContext {
        symbol: "SPY",
        timeframe_secs: 300, // mismatch: strategy expects 60
        window: &window,
        indicators: &indicators,
    };

    let err = host.on_bar(&ctx).unwrap_err();
    assert_eq!(
        err,
        StrategyHostError::TimeframeMismatch {
            expected_secs: 60,
            got_secs: 300
        }
    );
}
