//! Broker session abstraction shared by every execution path.
//!
//! `BrokerSession` is the single seam between the rest of the engine and a
//! concrete broker integration. [`MockBrokerSession`] is the deterministic,
//! in-memory implementation used by tests and dry runs; [`live::LiveBrokerSession`]
//! sketches a generic REST/WS-backed adapter. Both sit behind [`SessionWrapper`],
//! which adds rate limiting and bounded retry so neither implementation has
//! to reimplement that policy.

pub mod live;
pub mod mock;
pub mod types;
pub mod wrapper;

pub use mock::MockBrokerSession;
pub use types::BrokerFault;
pub use wrapper::SessionWrapper;

use async_trait::async_trait;
use vigil_schemas::{AccountSnapshot, Bar, OrderOutcome, OrderRequest, PositionRecord};

/// A live or simulated connection to a broker. All methods are async so a
/// real implementation can await network I/O; [`MockBrokerSession`] resolves
/// immediately.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Lightweight liveness check the control loop runs first in every
    /// tick. Distinct from `account_snapshot` so an implementation can
    /// probe with a cheap ping instead of a full account fetch.
    async fn health_probe(&self) -> Result<(), BrokerFault>;

    /// Re-establish the session after a `health_probe` failure. A no-op
    /// successful return for sessions that don't hold persistent state.
    async fn reconnect(&self) -> Result<(), BrokerFault>;

    /// Fetch up to `count` most-recently-closed bars for `symbol` at
    /// `timeframe_secs`, oldest first.
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Bar>, BrokerFault>;

    /// Fetch the broker's current view of account state and open positions
    /// carrying the given magic-tag.
    async fn account_snapshot(&self, magic_tag: u64) -> Result<AccountSnapshot, BrokerFault>;

    /// All open positions on the account carrying `magic_tag`, independent
    /// of `account_snapshot` so the tracker's reconcile pass can fetch just
    /// this list without paying for a full account refresh.
    async fn open_positions(&self, magic_tag: u64) -> Result<Vec<PositionRecord>, BrokerFault>;

    /// Submit a new order. Implementations must treat resubmission of a
    /// previously-seen `client_tag` as a no-op that returns the cached
    /// outcome, so the execution engine's retry path is always safe.
    async fn submit_order(&self, req: OrderRequest) -> Result<OrderOutcome, BrokerFault>;

    /// Close (or partially close) an existing position by ticket.
    async fn close_position(
        &self,
        ticket: u64,
        volume_micros: i64,
    ) -> Result<OrderOutcome, BrokerFault>;

    /// Poll the current status of a previously submitted order/ticket.
    async fn poll_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault>;

    /// Cancel the still-working remainder of a partially filled order.
    async fn cancel_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault>;
}

/// An `Arc`-wrapped session delegates straight through, so a single
/// connection (and its rate limiter, inside `SessionWrapper`) can be shared
/// between the control loop's bar feed/tracker calls and the execution
/// engine's order calls without a second, independently-throttled session.
#[async_trait]
impl<T: BrokerSession + ?Sized> BrokerSession for std::sync::Arc<T> {
    async fn health_probe(&self) -> Result<(), BrokerFault> {
        (**self).health_probe().await
    }

    async fn reconnect(&self) -> Result<(), BrokerFault> {
        (**self).reconnect().await
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Bar>, BrokerFault> {
        (**self).fetch_bars(symbol, timeframe_secs, count).await
    }

    async fn account_snapshot(&self, magic_tag: u64) -> Result<AccountSnapshot, BrokerFault> {
        (**self).account_snapshot(magic_tag).await
    }

    async fn open_positions(&self, magic_tag: u64) -> Result<Vec<PositionRecord>, BrokerFault> {
        (**self).open_positions(magic_tag).await
    }

    async fn submit_order(&self, req: OrderRequest) -> Result<OrderOutcome, BrokerFault> {
        (**self).submit_order(req).await
    }

    async fn close_position(
        &self,
        ticket: u64,
        volume_micros: i64,
    ) -> Result<OrderOutcome, BrokerFault> {
        (**self).close_position(ticket, volume_micros).await
    }

    async fn poll_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault> {
        (**self).poll_order(ticket).await
    }

    async fn cancel_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault> {
        (**self).cancel_order(ticket).await
    }
}
