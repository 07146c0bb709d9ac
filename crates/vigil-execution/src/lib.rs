//! Execution Engine: the seam between a risk-approved
//! `OrderRequest` and a broker session. Owns idempotent submission (a
//! restart replaying the same signal must never double-order) and
//! partial-fill draining, so callers only ever see a terminal
//! `OrderOutcome`.

mod engine;
mod id_map;
mod oms;

pub use engine::{closing_order_side, DryRunExecutionEngine, ExecutionEngine, ExecutionTuning, LiveExecutionEngine};
pub use id_map::ClientTagCache;
