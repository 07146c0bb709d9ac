//! Execution Engine: turns an approved `OrderRequest` into a
//! terminal `OrderOutcome`, owning idempotency and partial-fill handling so
//! neither the control loop nor the broker session has to.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;
use vigil_broker::BrokerSession;
use vigil_schemas::{OrderOutcome, OrderRequest, OrderSide, OrderType, Side};

use crate::id_map::ClientTagCache;
use crate::oms;

/// The one seam between risk-approved orders and a broker. `submit`/`close`
/// take `&self`, not `&mut self` — the mutable idempotency cache lives
/// behind an internal `Mutex` so a `LiveExecutionEngine` can be shared
/// across concurrent control-loop tasks without the caller managing
/// exclusivity itself.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn submit(&self, req: OrderRequest) -> OrderOutcome;

    async fn close(&self, ticket: u64, volume_micros: i64, reason: &str) -> OrderOutcome;
}

/// Tunables governing how long a partially-filled order is given to
/// complete before the remainder is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTuning {
    pub fill_timeout: Duration,
    pub poll_interval: Duration,
    pub idempotency_capacity: usize,
}

impl Default for ExecutionTuning {
    fn default() -> Self {
        Self {
            fill_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            idempotency_capacity: crate::id_map::DEFAULT_CAPACITY,
        }
    }
}

/// Broker-backed execution engine used in paper and live modes alike — the
/// broker session itself (mock vs REST-backed) is what distinguishes paper
/// from live, not this type.
pub struct LiveExecutionEngine<B: BrokerSession> {
    broker: B,
    tuning: ExecutionTuning,
    cache: Mutex<ClientTagCache>,
}

impl<B: BrokerSession> LiveExecutionEngine<B> {
    pub fn new(broker: B, tuning: ExecutionTuning) -> Self {
        Self {
            broker,
            cache: Mutex::new(ClientTagCache::new(tuning.idempotency_capacity)),
            tuning,
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }
}

#[async_trait]
impl<B: BrokerSession> ExecutionEngine for LiveExecutionEngine<B> {
    async fn submit(&self, req: OrderRequest) -> OrderOutcome {
        {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&req.client_tag) {
                tracing::debug!(client_tag = %req.client_tag, "idempotent resubmit; returning cached outcome");
                return cached;
            }
        }

        let client_tag = req.client_tag.clone();
        let submitted = match self.broker.submit_order(req).await {
            Ok(outcome) => outcome,
            Err(fault) => OrderOutcome::Error {
                detail: format!("submit_order failed: {fault}"),
            },
        };

        let settled = match (&submitted, submitted.ticket()) {
            (OrderOutcome::PartiallyFilled { .. } | OrderOutcome::Placed { .. }, Some(ticket)) => {
                oms::drive_to_terminal(
                    &self.broker,
                    ticket,
                    submitted,
                    self.tuning.fill_timeout,
                    self.tuning.poll_interval,
                )
                .await
            }
            _ => submitted,
        };

        self.cache.lock().await.put(client_tag, settled.clone());
        settled
    }

    async fn close(&self, ticket: u64, volume_micros: i64, reason: &str) -> OrderOutcome {
        let nonce = Uuid::new_v4().simple().to_string();
        let client_tag = format!("close:{ticket}:{nonce}");
        tracing::info!(ticket, volume_micros, reason, client_tag = %client_tag, "closing position");

        match self.broker.close_position(ticket, volume_micros).await {
            Ok(outcome) => outcome,
            Err(fault) => OrderOutcome::Error {
                detail: format!("close_position failed for ticket {ticket}: {fault}"),
            },
        }
    }
}

/// Dry-run engine: simulates an immediate fill at the
/// requested reference price without ever touching a broker, so the full
/// control loop can run end to end against a live feed with zero broker
/// side effects.
pub struct DryRunExecutionEngine {
    next_ticket: std::sync::atomic::AtomicU64,
    cache: Mutex<ClientTagCache>,
}

impl DryRunExecutionEngine {
    pub fn new() -> Self {
        Self {
            next_ticket: std::sync::atomic::AtomicU64::new(1),
            cache: Mutex::new(ClientTagCache::new(crate::id_map::DEFAULT_CAPACITY)),
        }
    }
}

impl Default for DryRunExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionEngine for DryRunExecutionEngine {
    async fn submit(&self, req: OrderRequest) -> OrderOutcome {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(&req.client_tag) {
            return cached;
        }

        let fill_price = match req.order_type {
            OrderType::Limit | OrderType::Stop | OrderType::StopLimit => {
                req.limit_price_micros.unwrap_or(req.reference_price_micros)
            }
            OrderType::Market => req.reference_price_micros,
        };
        let ticket = self.next_ticket.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let outcome = OrderOutcome::Filled {
            ticket,
            fill_price_micros: fill_price,
            filled_volume_micros: req.volume_micros,
            filled_at_utc: chrono::Utc::now(),
            commission_micros: 0,
            swap_micros: 0,
        };
        cache.put(req.client_tag, outcome.clone());
        outcome
    }

    async fn close(&self, ticket: u64, volume_micros: i64, reason: &str) -> OrderOutcome {
        tracing::info!(ticket, volume_micros, reason, "dry-run close");
        OrderOutcome::Filled {
            ticket,
            fill_price_micros: 0,
            filled_volume_micros: volume_micros,
            filled_at_utc: chrono::Utc::now(),
            commission_micros: 0,
            swap_micros: 0,
        }
    }
}

/// Side an opposing close order must use to flatten a position held in
/// `side`. Kept here (rather than on `Side` itself) since it is a detail of
/// how the execution engine phrases a close, not a property of a signal's
/// market view.
pub fn closing_order_side(side: Side) -> OrderSide {
    OrderSide::from(side.opposite())
}
