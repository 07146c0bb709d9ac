use std::time::Duration;

/// Tunables the control loop needs beyond what `vigil-config::EngineConfig`
/// already validates — this is the runtime-facing subset, built by the CLI
/// from a loaded `EngineConfig`.
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    pub symbol: String,
    pub timeframe_secs: u32,
    pub magic_tag: u64,
    pub lookback_bars: usize,
    pub poll_interval: Duration,
    /// Emit a metrics sample and log loop duration every N ticks.
    pub metrics_every_n_ticks: u64,
    /// Whether shutdown calls Execution.close on every tracked position
    /// before flushing persistence and disconnecting.
    pub flatten_on_shutdown: bool,
    pub shutdown_grace: Duration,
}

impl ControlLoopConfig {
    pub fn new(symbol: impl Into<String>, timeframe_secs: u32, magic_tag: u64) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe_secs,
            magic_tag,
            lookback_bars: 200,
            poll_interval: Duration::from_secs(60),
            metrics_every_n_ticks: 10,
            flatten_on_shutdown: false,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}
