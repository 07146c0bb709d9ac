//! Pure adoption-policy decision, unit-testable without a broker.

use chrono::{DateTime, Utc};
use vigil_schemas::PositionRecord;

use crate::types::{AdoptionDecision, AdoptionPolicy};

pub fn decide_adoption(
    position: &PositionRecord,
    policy: &AdoptionPolicy,
    now: DateTime<Utc>,
) -> AdoptionDecision {
    if policy.log_only {
        return AdoptionDecision::LogOnly;
    }

    if policy.symbol_blacklist.iter().any(|s| s == &position.symbol) {
        return AdoptionDecision::Refuse {
            reason: format!("symbol {} is blacklisted from adoption", position.symbol),
        };
    }

    if !policy.symbol_whitelist.is_empty() && !policy.symbol_whitelist.iter().any(|s| s == &position.symbol) {
        return AdoptionDecision::Refuse {
            reason: format!("symbol {} is not on the adoption whitelist", position.symbol),
        };
    }

    let age = now.signed_duration_since(position.open_time_utc);
    if age > policy.max_age {
        return AdoptionDecision::Refuse {
            reason: format!(
                "position age {}s exceeds max adoption age {}s",
                age.num_seconds(),
                policy.max_age.num_seconds()
            ),
        };
    }

    AdoptionDecision::Adopt
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_schemas::Side;

    fn position(symbol: &str, age: chrono::Duration) -> PositionRecord {
        let now = Utc::now();
        PositionRecord {
            ticket: 1,
            symbol: symbol.to_string(),
            side: Side::Long,
            volume_micros: 10_000,
            open_price_micros: 1_100_000,
            open_time_utc: now - age,
            current_price_micros: 1_100_000,
            stop_loss_micros: None,
            take_profit_micros: None,
            unrealized_pnl_micros: 0,
            realized_pnl_micros: 0,
            commission_micros: 0,
            swap_micros: 0,
        }
    }

    #[test]
    fn default_policy_adopts_anything_within_age() {
        let pos = position("EURUSD", chrono::Duration::minutes(5));
        let decision = decide_adoption(&pos, &AdoptionPolicy::default(), Utc::now());
        assert_eq!(decision, AdoptionDecision::Adopt);
    }

    #[test]
    fn blacklisted_symbol_is_refused() {
        let policy = AdoptionPolicy {
            symbol_blacklist: vec!["EURUSD".into()],
            ..AdoptionPolicy::default()
        };
        let pos = position("EURUSD", chrono::Duration::minutes(1));
        let decision = decide_adoption(&pos, &policy, Utc::now());
        assert!(matches!(decision, AdoptionDecision::Refuse { .. }));
    }

    #[test]
    fn nonempty_whitelist_excludes_other_symbols() {
        let policy = AdoptionPolicy {
            symbol_whitelist: vec!["GBPUSD".into()],
            ..AdoptionPolicy::default()
        };
        let pos = position("EURUSD", chrono::Duration::minutes(1));
        let decision = decide_adoption(&pos, &policy, Utc::now());
        assert!(matches!(decision, AdoptionDecision::Refuse { .. }));
    }

    #[test]
    fn position_older_than_max_age_is_refused() {
        let policy = AdoptionPolicy {
            max_age: chrono::Duration::hours(1),
            ..AdoptionPolicy::default()
        };
        let pos = position("EURUSD", chrono::Duration::hours(2));
        let decision = decide_adoption(&pos, &policy, Utc::now());
        assert!(matches!(decision, AdoptionDecision::Refuse { .. }));
    }

    #[test]
    fn log_only_mode_never_adopts() {
        let policy = AdoptionPolicy {
            log_only: true,
            ..AdoptionPolicy::default()
        };
        let pos = position("EURUSD", chrono::Duration::minutes(1));
        let decision = decide_adoption(&pos, &policy, Utc::now());
        assert_eq!(decision, AdoptionDecision::LogOnly);
    }
}
