//! Exit Arbiter: priority-ordered, first-match-wins exit
//! rule evaluation over the tracked position book.
//!
//! Each rule is independent and stateless with respect to the others;
//! the arbiter only imposes an evaluation order and a first-match-wins
//! short-circuit per position. Priorities are fixed:
//! AdverseMovement=90, TimeBased=50, ProfitTarget=40, TrailingStop=25.

pub mod arbiter;
pub mod calendar;
pub mod rule;
pub mod rules;
pub mod types;

pub use arbiter::ExitArbiter;
pub use calendar::{past_day_trading_eod, within_weekend_protection, WeeklyCloseWindow};
pub use rule::ExitRule;
pub use rules::adverse_movement::{AdverseMovement, AdverseMovementConfig};
pub use rules::profit_target::{ProfitLevel, ProfitTarget, ProfitTargetConfig};
pub use rules::time_based::{TimeBased, TimeBasedConfig};
pub use rules::trailing_stop::{TrailingStop, TrailingStopConfig};
pub use types::{ExitContext, ExitDecision};
