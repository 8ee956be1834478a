//! Bidirectional correlation id ↔ timer handle index.
//!
//! The two maps are always exact inverses of each other over the live timer
//! set. All mutation goes through this type so the invariant cannot be
//! broken by touching one side alone.

use crate::wheel::TimerId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct TimerIndex {
    timer_by_correlation: HashMap<i64, TimerId>,
    correlation_by_timer: HashMap<TimerId, i64>,
}

impl TimerIndex {
    /// Record a freshly scheduled timer. The caller cancels any prior timer
    /// for the correlation id first, so neither key may be present.
    pub fn insert(&mut self, correlation_id: i64, timer_id: TimerId) {
        let prior = self.timer_by_correlation.insert(correlation_id, timer_id);
        debug_assert!(prior.is_none(), "correlation id rescheduled without cancel");
        let prior = self.correlation_by_timer.insert(timer_id, correlation_id);
        debug_assert!(prior.is_none(), "wheel handle reused while live");
    }

    pub fn remove_by_correlation_id(&mut self, correlation_id: i64) -> Option<TimerId> {
        let timer_id = self.timer_by_correlation.remove(&correlation_id)?;
        self.correlation_by_timer.remove(&timer_id);
        Some(timer_id)
    }

    pub fn remove_by_timer_id(&mut self, timer_id: TimerId) -> Option<i64> {
        let correlation_id = self.correlation_by_timer.remove(&timer_id)?;
        self.timer_by_correlation.remove(&correlation_id);
        Some(correlation_id)
    }

    pub fn correlation_id_for(&self, timer_id: TimerId) -> Option<i64> {
        self.correlation_by_timer.get(&timer_id).copied()
    }

    pub fn len(&self) -> usize {
        self.timer_by_correlation.len()
    }

    /// All live `(correlation_id, timer_id)` pairs, unordered.
    pub fn iter(&self) -> impl Iterator<Item = (i64, TimerId)> + '_ {
        self.timer_by_correlation.iter().map(|(&c, &t)| (c, t))
    }
}
