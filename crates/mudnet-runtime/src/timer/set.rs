//! Ordered set of active timers.
//!
//! Keyed by `(expiry, index)`: earliest expiry first, and for equal expiries
//! the smaller stable index (older timer) first. Removal is exact (no lazy
//! cancellation), so `len()` is always the number of armed timers.
//!
//! # Complexity
//!
//! - Insert / remove: O(log n)
//! - Pop expired: O(log n) per timer
//! - Next deadline: O(log n)

use std::collections::BTreeMap;

/// Ordering key of an armed timer. Expiry is in loop-clock microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey {
    pub expiry_us: u64,
    pub index: u32,
}

impl TimerKey {
    pub fn new(expiry_us: u64, index: u32) -> Self {
        Self { expiry_us, index }
    }

    /// Next key of a repeating timer: previous expiry + interval.
    #[inline]
    pub fn rearm(self, interval_us: u64) -> Self {
        Self {
            expiry_us: self.expiry_us.saturating_add(interval_us),
            index: self.index,
        }
    }
}

pub struct TimerSet<T> {
    entries: BTreeMap<TimerKey, T>,
    total_inserted: u64,
    total_fired: u64,
    total_removed: u64,
}

impl<T> TimerSet<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            total_inserted: 0,
            total_fired: 0,
            total_removed: 0,
        }
    }

    /// Insert; a previous entry under the same key is returned.
    pub fn insert(&mut self, key: TimerKey, value: T) -> Option<T> {
        self.total_inserted += 1;
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &TimerKey) -> Option<T> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.total_removed += 1;
        }
        removed
    }

    /// Pop the earliest entry if it expired at or before `now_us`.
    pub fn pop_expired(&mut self, now_us: u64) -> Option<(TimerKey, T)> {
        let (key, _) = self.entries.first_key_value()?;
        if key.expiry_us > now_us {
            return None;
        }
        let popped = self.entries.pop_first();
        if popped.is_some() {
            self.total_fired += 1;
        }
        popped
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.first_key_value().map(|(k, _)| k.expiry_us)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TimerSetStats {
        TimerSetStats {
            active: self.entries.len(),
            total_inserted: self.total_inserted,
            total_fired: self.total_fired,
            total_removed: self.total_removed,
        }
    }
}

impl<T> Default for TimerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a `TimerSet`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSetStats {
    pub active: usize,
    /// Lifetime inserts, including repeat re-arms
    pub total_inserted: u64,
    pub total_fired: u64,
    /// Lifetime removals by `stop`
    pub total_removed: u64,
}
