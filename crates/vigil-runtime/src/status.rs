//! Shared, pollable loop state: a cloneable, `Arc`-wrapped snapshot a
//! supervising process (or the control CLI) can read without
//! synchronizing with the control loop's own task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Point-in-time snapshot of one control loop's state.
#[derive(Debug, Clone)]
pub struct LoopStatus {
    pub run_id: Uuid,
    pub tick_count: u64,
    pub open_position_count: usize,
    pub circuit_breaker_open: bool,
    pub emergency_halt_requested: bool,
    pub broker_connected: bool,
    pub last_tick_at_utc: Option<DateTime<Utc>>,
}

impl LoopStatus {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            tick_count: 0,
            open_position_count: 0,
            circuit_breaker_open: false,
            emergency_halt_requested: false,
            broker_connected: true,
            last_tick_at_utc: None,
        }
    }
}

pub type SharedStatus = Arc<RwLock<LoopStatus>>;

/// Shutdown flag checked at every phase boundary and before every broker
/// call. Cloning shares the same underlying
/// flag, so a CLI's signal handler and the running loop always agree.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_signalled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}
