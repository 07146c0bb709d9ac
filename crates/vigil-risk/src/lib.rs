//! Risk Gate: converts a raw signal plus account state into
//! an approved, sized order, or a typed refusal. Deterministic, pure logic
//! — no IO, no broker calls. The only wall-clock-adjacent input is the
//! broker's own `AccountSnapshot.server_time`, which the caller supplies;
//! this crate never reads the local clock.

mod engine;
mod types;

pub use engine::{check_emergency_drawdown, evaluate, record_realized_close, size_order, tick};
pub use types::*;
