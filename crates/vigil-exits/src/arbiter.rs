use vigil_schemas::PositionRecord;

use crate::rule::ExitRule;
use crate::types::{ExitContext, ExitDecision};

/// Ordered set of `ExitRule`s evaluated against every tracked position once
/// per tick. Rules are sorted by priority descending at
/// construction; ties keep registration order, since `Vec::sort_by` is a
/// stable sort.
pub struct ExitArbiter {
    rules: Vec<Box<dyn ExitRule>>,
}

impl ExitArbiter {
    pub fn new(mut rules: Vec<Box<dyn ExitRule>>) -> Self {
        rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate every rule, in priority order, against every position in
    /// `positions` (expected ticket-ascending — the Position Tracker's
    /// `iter()` already yields that order). The first rule to return a
    /// decision for a given position wins; decisions are collected, not
    /// executed, so the caller applies them outside this scan.
    pub fn evaluate_all<'a>(
        &mut self,
        positions: impl IntoIterator<Item = &'a PositionRecord>,
        ctx: &ExitContext,
    ) -> Vec<ExitDecision> {
        let mut decisions = Vec::new();
        for pos in positions {
            for rule in self.rules.iter_mut() {
                if !rule.enabled() {
                    continue;
                }
                if let Some(decision) = rule.evaluate(pos, ctx) {
                    decisions.push(decision);
                    break;
                }
            }
        }
        decisions
    }

    /// Fan out a ticket's removal to every rule so none retains scratch
    /// for a position the tracker no longer holds.
    pub fn remove_ticket(&mut self, ticket: u64) {
        for rule in self.rules.iter_mut() {
            rule.on_position_closed(ticket);
        }
    }
}
