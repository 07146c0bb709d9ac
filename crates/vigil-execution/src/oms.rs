//! Partial-fill polling state machine.
//!
//! A `submit_order` call that returns `PartiallyFilled` or the broker's
//! equivalent "still working" state leaves the execution engine polling
//! `poll_order` until the order reaches a terminal state or `fill_timeout`
//! elapses, at which point the unfilled remainder is cancelled and the
//! consolidated fill is returned. This never surfaces as
//! `Error` to the caller — a timeout is a legitimate business outcome
//! (`PartiallyFilled`), not a fault.

use std::time::Duration;

use vigil_broker::{BrokerFault, BrokerSession};
use vigil_schemas::OrderOutcome;

/// Poll `ticket` until it reaches a terminal outcome (`Filled`, `Rejected`,
/// `Cancelled`) or `timeout` elapses, sleeping `poll_interval` between
/// attempts. A timeout while still `PartiallyFilled` cancels the working
/// remainder and returns the last known partial-fill state; a timeout while
/// still `Placed` (no fill at all yet) cancels and returns `Cancelled`.
pub async fn drive_to_terminal<B: BrokerSession + ?Sized>(
    broker: &B,
    ticket: u64,
    initial: OrderOutcome,
    timeout: Duration,
    poll_interval: Duration,
) -> OrderOutcome {
    if is_terminal(&initial) {
        return initial;
    }

    let mut last = initial;
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(poll_interval).await;
        match broker.poll_order(ticket).await {
            Ok(outcome) => {
                if is_terminal(&outcome) {
                    return outcome;
                }
                last = outcome;
            }
            Err(fault) => {
                tracing::warn!(ticket, %fault, "poll_order failed while draining a working order");
                if !fault.is_transient() {
                    return OrderOutcome::Error {
                        detail: format!("poll_order failed for ticket {ticket}: {fault}"),
                    };
                }
            }
        }
    }

    tracing::info!(ticket, "fill-timeout elapsed; cancelling working remainder");
    match broker.cancel_order(ticket).await {
        Ok(cancelled @ OrderOutcome::Cancelled { .. }) => match last {
            OrderOutcome::PartiallyFilled { .. } => last,
            _ => cancelled,
        },
        Ok(other) => other,
        Err(BrokerFault::Rejected(_)) => last,
        Err(fault) => OrderOutcome::Error {
            detail: format!("cancel_order failed for ticket {ticket}: {fault}"),
        },
    }
}

fn is_terminal(outcome: &OrderOutcome) -> bool {
    matches!(
        outcome,
        OrderOutcome::Filled { .. }
            | OrderOutcome::Rejected { .. }
            | OrderOutcome::Cancelled { .. }
            | OrderOutcome::Error { .. }
    )
}
