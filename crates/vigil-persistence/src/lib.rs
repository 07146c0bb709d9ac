//! Persistence Sink: an append-only record of signals,
//! orders, trades and periodic metrics samples. Schema exactness is
//! explicitly not required: only the semantic fields each record type
//! carries need to survive a round trip through this sink.
//!
//! Writes are buffered over a bounded channel and applied by a background
//! writer task, so a slow disk/DB never blocks the control loop;
//! `PersistenceSink::flush` drains the channel synchronously, which the
//! control loop calls once during shutdown.

pub mod sink;

pub use sink::{
    connect_from_env, connect_with_env_var, migrate, InMemoryPersistenceSink, MetricsSample,
    PersistenceSink, PgPersistenceSink, ENV_DATABASE_URL,
};
