//! Position Tracker: the authoritative ticket → PositionRecord
//! map plus adoption, monitoring and reconciliation against a broker's
//! open-position list.

mod adoption;
mod tracker;
mod types;
mod watermark;

pub use adoption::decide_adoption;
pub use tracker::PositionTracker;
pub use types::{AdoptionDecision, AdoptionPolicy, ClosedTrade, ReconcileAction, TrackedPosition};
pub use watermark::{SnapshotFreshness, SnapshotWatermark};
