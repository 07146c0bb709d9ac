//! Idempotency cache: `client_tag` → last `OrderOutcome`.
//!
//! Every `client_tag` a strategy/risk-gate pair can produce is derived
//! deterministically from a signal id (`Signal::client_tag`), so a restart
//! that replays the same signal must never place a second order for it.
//! `submit` checks this map before it ever reaches the broker; a hit
//! short-circuits straight back to the caller.
//!
//! Bounded by an LRU eviction policy rather than left to grow forever —
//! a long-running daemon processes far more signals over its lifetime than
//! it needs to remember for idempotency purposes, so an unbounded map would
//! be a slow memory leak.

use std::num::NonZeroUsize;

use lru::LruCache;
use vigil_schemas::OrderOutcome;

/// Default capacity: generous enough that a retry burst within one control
/// loop's fault-recovery window never evicts the entry it needs, small
/// enough that memory stays flat across a multi-week run.
pub const DEFAULT_CAPACITY: usize = 4_096;

pub struct ClientTagCache {
    inner: LruCache<String, OrderOutcome>,
}

impl ClientTagCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Look up a previously recorded outcome without disturbing its LRU
    /// position further than a normal read already would.
    pub fn get(&mut self, client_tag: &str) -> Option<OrderOutcome> {
        self.inner.get(client_tag).cloned()
    }

    /// Record (or overwrite) the outcome for `client_tag`. Called once per
    /// broker round trip, covering both the first submission and the
    /// terminal outcome a fill-polling pass later settles on.
    pub fn put(&mut self, client_tag: impl Into<String>, outcome: OrderOutcome) {
        self.inner.put(client_tag.into(), outcome);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for ClientTagCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn filled(ticket: u64) -> OrderOutcome {
        OrderOutcome::Filled {
            ticket,
            fill_price_micros: 1_100_000,
            filled_volume_micros: 10_000,
            filled_at_utc: Utc::now(),
            commission_micros: 0,
            swap_micros: 0,
        }
    }

    #[test]
    fn miss_then_hit_after_put() {
        let mut cache = ClientTagCache::new(8);
        assert!(cache.get("sig:a").is_none());
        cache.put("sig:a", filled(1));
        assert!(matches!(cache.get("sig:a"), Some(OrderOutcome::Filled { ticket: 1, .. })));
    }

    #[test]
    fn eviction_drops_oldest_entry_past_capacity() {
        let mut cache = ClientTagCache::new(2);
        cache.put("a", filled(1));
        cache.put("b", filled(2));
        cache.put("c", filled(3));
        assert!(cache.get("a").is_none(), "oldest entry should have been evicted");
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let mut cache = ClientTagCache::new(8);
        cache.put("sig:a", filled(1));
        cache.put("sig:a", filled(2));
        assert!(matches!(cache.get("sig:a"), Some(OrderOutcome::Filled { ticket: 2, .. })));
    }
}
