//! Per-key last-fire bookkeeping.

use std::{collections::HashMap, hash::Hash, time::Duration};

use tokio::time::Instant;

/// Tracks when each key last fired and whether it may fire again.
///
/// Evaluators own their tracker outright; the type does no locking.
#[derive(Debug, Clone)]
pub struct CooldownTracker<K = ()> {
    cooldown: Duration,
    last_fired: HashMap<K, Instant>,
}

impl<K: Eq + Hash> CooldownTracker<K> {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_fired(&self, key: &K) -> Option<Instant> {
        self.last_fired.get(key).copied()
    }

    /// True when `key` never fired or at least the cooldown elapsed since it did.
    pub fn eligible(&self, key: &K, now: Instant) -> bool {
        match self.last_fired.get(key) {
            Some(last) => now.saturating_duration_since(*last) >= self.cooldown,
            None => true,
        }
    }

    /// Records a fire. Timestamps never move backwards.
    pub fn record_fire(&mut self, key: K, now: Instant) {
        self.last_fired
            .entry(key)
            .and_modify(|last| {
                if now > *last {
                    *last = now;
                }
            })
            .or_insert(now);
    }
}
