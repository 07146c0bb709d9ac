//! Starting with an empty tracker, a broker-side
//! position opened 2 hours ago under this system's magic-tag is adopted on
//! reconcile (origin=Adopted). A later reconcile pass that no longer sees
//! the ticket removes it as closed-externally, matching invariant I2
//! ("after Reconcile completes, Tracker.tickets == Broker.open_positions").

use chrono::Utc;
use vigil_broker::MockBrokerSession;
use vigil_portfolio::{AdoptionPolicy, PositionTracker, ReconcileAction};
use vigil_schemas::{PositionOrigin, PositionRecord, Side};

fn orphan(ticket: u64, opened_hours_ago: i64) -> PositionRecord {
    PositionRecord {
        ticket,
        symbol: "EURUSD".into(),
        side: Side::Long,
        volume_micros: 50_000,
        open_price_micros: 1_100_000,
        open_time_utc: Utc::now() - chrono::Duration::hours(opened_hours_ago),
        current_price_micros: 1_100_000,
        stop_loss_micros: None,
        take_profit_micros: None,
        unrealized_pnl_micros: 0,
        realized_pnl_micros: 0,
        commission_micros: 0,
        swap_micros: 0,
    }
}

#[tokio::test]
async fn orphan_within_max_age_is_adopted_then_removed_when_broker_drops_it() {
    let broker = MockBrokerSession::new();
    broker.seed_position(orphan(9, 2));

    let policy = AdoptionPolicy {
        max_age: chrono::Duration::hours(72),
        ..AdoptionPolicy::default()
    };
    let mut tracker = PositionTracker::new(777, policy);

    let actions = tracker.reconcile(&broker, Utc::now()).await.unwrap();
    assert_eq!(actions, vec![ReconcileAction::Adopt { ticket: 9 }]);
    let tracked = tracker.get(9).expect("ticket should be adopted");
    assert_eq!(tracked.origin, PositionOrigin::Adopted);

    // Next tick: broker no longer reports the ticket (closed manually).
    broker.remove_position_externally(9);
    let later = Utc::now() + chrono::Duration::seconds(1);
    let actions = tracker.reconcile(&broker, later).await.unwrap();
    assert_eq!(actions, vec![ReconcileAction::CloseExternally { ticket: 9 }]);
    assert!(tracker.is_empty(), "I2: tracker tickets must match broker tickets after reconcile");
}

#[tokio::test]
async fn orphan_older_than_max_age_is_refused_not_adopted() {
    let broker = MockBrokerSession::new();
    broker.seed_position(orphan(11, 100));

    let policy = AdoptionPolicy {
        max_age: chrono::Duration::hours(72),
        ..AdoptionPolicy::default()
    };
    let mut tracker = PositionTracker::new(777, policy);

    let actions = tracker.reconcile(&broker, Utc::now()).await.unwrap();
    assert!(matches!(actions.as_slice(), [ReconcileAction::AdoptRefused { ticket: 11, .. }]));
    assert!(tracker.get(11).is_none());
}
