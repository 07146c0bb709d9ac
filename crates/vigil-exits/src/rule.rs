use vigil_schemas::PositionRecord;

use crate::types::{ExitContext, ExitDecision};

/// One exit rule. Rules are independent and stateless with respect to each
/// other — all shared knowledge flows through the `PositionRecord` the
/// arbiter passes in plus whatever scratch a rule keeps per ticket.
/// `on_position_closed` is the only way a rule learns a
/// ticket is gone; it must drop every scratch entry for that ticket there.
pub trait ExitRule: Send + Sync {
    fn name(&self) -> &str;

    /// Higher fires first: AdverseMovement=90, TimeBased=50,
    /// ProfitTarget=40, TrailingStop=25.
    fn priority(&self) -> u8;

    fn enabled(&self) -> bool;

    /// Evaluate this rule against one tracked position. Returning `Some`
    /// short-circuits the arbiter's evaluation for that position — lower
    /// priority rules never see it this tick.
    fn evaluate(&mut self, pos: &PositionRecord, ctx: &ExitContext) -> Option<ExitDecision>;

    /// Called by the arbiter exactly once per ticket, the tick after the
    /// tracker removes it. Rules with no per-ticket scratch can leave this
    /// empty.
    fn on_position_closed(&mut self, ticket: u64);
}
