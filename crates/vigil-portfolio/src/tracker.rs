//! Position Tracker: the authoritative ticket → PositionRecord
//! map. Owns every mutation to a tracked position; exit rules and the risk
//! gate only ever read through `iter`/`get`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use vigil_broker::{BrokerFault, BrokerSession};
use vigil_execution::ExecutionEngine;
use vigil_schemas::{OrderOutcome, PositionRecord};

use crate::adoption::decide_adoption;
use crate::types::{AdoptionDecision, AdoptionPolicy, ClosedTrade, ReconcileAction, TrackedPosition};
use crate::watermark::SnapshotWatermark;

pub struct PositionTracker {
    positions: BTreeMap<u64, TrackedPosition>,
    magic_tag: u64,
    adoption_policy: AdoptionPolicy,
    watermark: SnapshotWatermark,
}

impl PositionTracker {
    pub fn new(magic_tag: u64, adoption_policy: AdoptionPolicy) -> Self {
        Self {
            positions: BTreeMap::new(),
            magic_tag,
            adoption_policy,
            watermark: SnapshotWatermark::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, ticket: u64) -> Option<&TrackedPosition> {
        self.positions.get(&ticket)
    }

    /// Ticket-ascending iteration order, which the exit arbiter depends on
    /// for deterministic per-tick evaluation.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedPosition> {
        self.positions.values()
    }

    pub fn tickets(&self) -> impl Iterator<Item = u64> + '_ {
        self.positions.keys().copied()
    }

    /// Register(OrderOutcome.Filled): adds a new native PositionRecord.
    /// Fails (ignored with warning) if the ticket is already present.
    pub fn register(&mut self, record: PositionRecord, now: DateTime<Utc>) {
        let ticket = record.ticket;
        if self.positions.contains_key(&ticket) {
            tracing::warn!(ticket, "register called for an already-tracked ticket; ignoring");
            return;
        }
        self.positions.insert(ticket, TrackedPosition::native(record, now));
    }

    /// Monitor(): refresh every tracked position's live fields in one
    /// batched call; positions the broker no longer reports are closed
    /// externally and removed, producing a best-effort trade record.
    pub async fn monitor<B: BrokerSession>(
        &mut self,
        broker: &B,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClosedTrade>, BrokerFault> {
        if !self.watermark.accept(now).is_fresh() {
            tracing::warn!("monitor skipped: snapshot watermark rejected this fetch as stale");
            return Ok(Vec::new());
        }

        let broker_positions = broker.open_positions(self.magic_tag).await?;
        let broker_by_ticket: BTreeMap<u64, PositionRecord> =
            broker_positions.into_iter().map(|p| (p.ticket, p)).collect();

        let mut closed = Vec::new();
        let tracked_tickets: Vec<u64> = self.positions.keys().copied().collect();
        for ticket in tracked_tickets {
            match broker_by_ticket.get(&ticket) {
                Some(fresh) => {
                    if let Some(tracked) = self.positions.get_mut(&ticket) {
                        let mark = fresh.current_price_micros;
                        tracked.record.refresh_mark(mark);
                        tracked.record.commission_micros = fresh.commission_micros;
                        tracked.record.swap_micros = fresh.swap_micros;
                    }
                }
                None => {
                    if let Some(removed) = self.remove_closed_externally(ticket, now) {
                        closed.push(removed);
                    }
                }
            }
        }

        Ok(closed)
    }

    fn remove_closed_externally(&mut self, ticket: u64, now: DateTime<Utc>) -> Option<ClosedTrade> {
        let tracked = self.positions.remove(&ticket)?;
        tracing::warn!(ticket, "position closed externally; removing from tracker");
        Some(ClosedTrade {
            ticket,
            symbol: tracked.record.symbol,
            volume_micros: tracked.record.volume_micros,
            open_price_micros: tracked.record.open_price_micros,
            exit_price_micros: tracked.record.current_price_micros,
            realized_pnl_micros: tracked.record.unrealized_pnl_micros,
            commission_micros: tracked.record.commission_micros,
            swap_micros: tracked.record.swap_micros,
            opened_at_utc: tracked.record.open_time_utc,
            closed_at_utc: now,
            reason: "closed_externally".to_string(),
            closed_externally: true,
        })
    }

    /// Close(ticket, reason, volume?): delegates to the Execution Engine;
    /// on success, either removes the record (full close) or shrinks the
    /// tracked volume (partial close).
    pub async fn close<E: ExecutionEngine>(
        &mut self,
        ticket: u64,
        volume_micros: Option<i64>,
        reason: &str,
        engine: &E,
        now: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let current_volume = self.positions.get(&ticket)?.record.volume_micros;
        let close_volume = volume_micros.unwrap_or(current_volume).min(current_volume);
        if close_volume <= 0 {
            tracing::warn!(ticket, "close called with a non-positive volume; ignoring");
            return None;
        }

        let outcome = engine.close(ticket, close_volume, reason).await;
        match outcome {
            OrderOutcome::Filled {
                fill_price_micros,
                filled_volume_micros,
                filled_at_utc,
                commission_micros,
                swap_micros,
                ..
            } => {
                let tracked = self.positions.get(&ticket)?;
                let realized = tracked.record.compute_unrealized_pnl_micros(fill_price_micros) * filled_volume_micros
                    / tracked.record.volume_micros.max(1);

                if filled_volume_micros >= tracked.record.volume_micros {
                    let tracked = self.positions.remove(&ticket)?;
                    Some(ClosedTrade {
                        ticket,
                        symbol: tracked.record.symbol,
                        volume_micros: filled_volume_micros,
                        open_price_micros: tracked.record.open_price_micros,
                        exit_price_micros: fill_price_micros,
                        realized_pnl_micros: realized,
                        commission_micros,
                        swap_micros,
                        opened_at_utc: tracked.record.open_time_utc,
                        closed_at_utc: filled_at_utc,
                        reason: reason.to_string(),
                        closed_externally: false,
                    })
                } else {
                    let symbol;
                    let open_price_micros;
                    let open_time_utc;
                    {
                        let tracked = self.positions.get_mut(&ticket)?;
                        tracked.record.volume_micros -= filled_volume_micros;
                        tracked.record.realized_pnl_micros += realized;
                        symbol = tracked.record.symbol.clone();
                        open_price_micros = tracked.record.open_price_micros;
                        open_time_utc = tracked.record.open_time_utc;
                    }
                    Some(ClosedTrade {
                        ticket,
                        symbol,
                        volume_micros: filled_volume_micros,
                        open_price_micros,
                        exit_price_micros: fill_price_micros,
                        realized_pnl_micros: realized,
                        commission_micros,
                        swap_micros,
                        opened_at_utc: open_time_utc,
                        closed_at_utc: filled_at_utc,
                        reason: format!("{reason} (partial)"),
                        closed_externally: false,
                    })
                }
            }
            other => {
                tracing::warn!(ticket, ?other, "close did not produce a fill; position remains tracked");
                None
            }
        }
    }

    /// CloseAll(reason): best-effort emergency flatten; collects
    /// per-position outcomes in ticket-ascending order.
    pub async fn close_all<E: ExecutionEngine>(
        &mut self,
        reason: &str,
        engine: &E,
        now: DateTime<Utc>,
    ) -> Vec<ClosedTrade> {
        let tickets: Vec<u64> = self.positions.keys().copied().collect();
        let mut closed = Vec::new();
        for ticket in tickets {
            if let Some(trade) = self.close(ticket, None, reason, engine, now).await {
                closed.push(trade);
            }
        }
        closed
    }

    /// Reconcile(): authoritative sync with the broker's open-position
    /// list, invoked on startup and after every reconnect.
    pub async fn reconcile<B: BrokerSession>(
        &mut self,
        broker: &B,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReconcileAction>, BrokerFault> {
        if !self.watermark.accept(now).is_fresh() {
            tracing::warn!("reconcile skipped: snapshot watermark rejected this fetch as stale");
            return Ok(Vec::new());
        }

        let broker_positions = broker.open_positions(self.magic_tag).await?;
        let broker_tickets: BTreeSet<u64> = broker_positions.iter().map(|p| p.ticket).collect();
        let mut actions = Vec::new();

        for position in broker_positions {
            let ticket = position.ticket;
            if let Some(tracked) = self.positions.get_mut(&ticket) {
                let mark = position.current_price_micros;
                tracked.record.refresh_mark(mark);
                tracked.record.commission_micros = position.commission_micros;
                tracked.record.swap_micros = position.swap_micros;
                actions.push(ReconcileAction::Refresh { ticket });
                continue;
            }

            match decide_adoption(&position, &self.adoption_policy, now) {
                AdoptionDecision::Adopt => {
                    self.positions.insert(ticket, TrackedPosition::adopted(position, now));
                    actions.push(ReconcileAction::Adopt { ticket });
                }
                AdoptionDecision::Refuse { reason } => {
                    tracing::warn!(ticket, %reason, "adoption refused");
                    actions.push(ReconcileAction::AdoptRefused { ticket, reason });
                }
                AdoptionDecision::LogOnly => {
                    tracing::info!(ticket, "log-only mode: orphan position reported, not adopted");
                    actions.push(ReconcileAction::AdoptRefused {
                        ticket,
                        reason: "log-only mode: orphan reported, not adopted".to_string(),
                    });
                }
            }
        }

        let stale_tracked: Vec<u64> = self
            .positions
            .keys()
            .copied()
            .filter(|t| !broker_tickets.contains(t))
            .collect();
        for ticket in stale_tracked {
            self.remove_closed_externally(ticket, now);
            actions.push(ReconcileAction::CloseExternally { ticket });
        }

        Ok(actions)
    }
}
