//! Deadline-ordered timer store.
//!
//! Stands in for the classic bucketed timer wheel behind the same contract:
//! schedule by deadline, cancel by handle, poll with a per-call expiry
//! budget. Storage here is an ordered deadline map rather than hashed
//! buckets; only the observable contract matters to the consensus module:
//!
//! - the internal tick clock advances at most one resolution step per
//!   `poll` call, so a single call never does unbounded work;
//! - a timer expires once the tick clock reaches its deadline;
//! - an expiry handler returning `false` leaves the timer in place, and the
//!   clock does not advance past it, so the same timer is offered again on
//!   a later poll.

use std::collections::{BTreeSet, HashMap};

/// Opaque handle for one scheduled deadline. Valid until the timer expires
/// (and is consumed) or is cancelled; never reused within one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Deadline-bucketed timer store with a bounded-per-call poll.
#[derive(Debug)]
pub struct DeadlineTimerWheel {
    start_time_ms: i64,
    tick_resolution_ms: i64,
    /// Ticks fully elapsed since `start_time_ms`.
    current_tick: i64,
    next_timer_id: u64,
    /// Ordered by (deadline, handle) so expiry is deterministic.
    by_deadline: BTreeSet<(i64, TimerId)>,
    deadlines: HashMap<TimerId, i64>,
}

impl DeadlineTimerWheel {
    pub fn new(start_time_ms: i64, tick_resolution_ms: i64) -> Self {
        assert!(tick_resolution_ms > 0, "tick resolution must be positive");
        Self {
            start_time_ms,
            tick_resolution_ms,
            current_tick: 0,
            next_timer_id: 0,
            by_deadline: BTreeSet::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Insert a timer due at `deadline_ms`. A deadline already in the past
    /// expires on the next poll.
    pub fn schedule_timer(&mut self, deadline_ms: i64) -> TimerId {
        let timer_id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        self.by_deadline.insert((deadline_ms, timer_id));
        self.deadlines.insert(timer_id, deadline_ms);
        timer_id
    }

    /// Remove a timer by handle. Returns whether it was still scheduled.
    pub fn cancel_timer(&mut self, timer_id: TimerId) -> bool {
        match self.deadlines.remove(&timer_id) {
            Some(deadline) => {
                self.by_deadline.remove(&(deadline, timer_id));
                true
            }
            None => false,
        }
    }

    /// Deadline of a live timer.
    pub fn deadline(&self, timer_id: TimerId) -> Option<i64> {
        self.deadlines.get(&timer_id).copied()
    }

    pub fn timer_count(&self) -> usize {
        self.deadlines.len()
    }

    /// End of the tick the wheel is currently working through. Timers with
    /// deadlines at or before this have either expired or are pending
    /// expiry in the current poll pass.
    pub fn current_tick_time(&self) -> i64 {
        self.start_time_ms + (self.current_tick + 1) * self.tick_resolution_ms
    }

    /// Rebase the clock origin, e.g. when resuming in a new epoch after
    /// restart. Only valid while no timers are scheduled.
    pub fn reset_start_time(&mut self, start_time_ms: i64) {
        debug_assert!(
            self.deadlines.is_empty(),
            "cannot rebase the wheel clock with timers scheduled"
        );
        self.start_time_ms = start_time_ms;
        self.current_tick = 0;
    }

    /// Expire due timers, at most `expiry_limit` per call.
    ///
    /// `on_expiry(now_ms, timer_id)` must return `true` to consume the
    /// timer; on `false` the timer stays scheduled, the pass stops, and the
    /// clock holds so the timer is re-offered next poll. Returns the number
    /// of timers consumed.
    pub fn poll(
        &mut self,
        now_ms: i64,
        mut on_expiry: impl FnMut(i64, TimerId) -> bool,
        expiry_limit: usize,
    ) -> usize {
        if self.current_tick_time() > now_ms {
            return 0;
        }

        let mut expired = 0;
        while expired < expiry_limit {
            let Some(&(deadline, timer_id)) = self.by_deadline.first() else {
                break;
            };
            if deadline > self.current_tick_time() {
                break;
            }
            if !on_expiry(now_ms, timer_id) {
                return expired;
            }
            self.by_deadline.remove(&(deadline, timer_id));
            self.deadlines.remove(&timer_id);
            expired += 1;
        }

        // Nothing due remains in this tick; advance one step per call.
        if expired < expiry_limit {
            self.current_tick += 1;
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the wheel clock to `now_ms`, the way the owning service does.
    fn drain(wheel: &mut DeadlineTimerWheel, now_ms: i64, fired: &mut Vec<TimerId>) -> usize {
        let mut expired = 0;
        while wheel.current_tick_time() <= now_ms {
            expired += wheel.poll(
                now_ms,
                |_, id| {
                    fired.push(id);
                    true
                },
                usize::MAX,
            );
        }
        expired
    }

    #[test]
    fn test_expires_at_deadline_not_before() {
        let mut wheel = DeadlineTimerWheel::new(0, 1);
        let id = wheel.schedule_timer(5);

        let mut fired = Vec::new();
        assert_eq!(drain(&mut wheel, 4, &mut fired), 0);
        assert!(fired.is_empty());

        assert_eq!(drain(&mut wheel, 5, &mut fired), 1);
        assert_eq!(fired, vec![id]);
        assert_eq!(wheel.timer_count(), 0);

        assert_eq!(drain(&mut wheel, 6, &mut fired), 0);
    }

    #[test]
    fn test_cancel_removes_timer() {
        let mut wheel = DeadlineTimerWheel::new(0, 1);
        let id = wheel.schedule_timer(3);
        assert_eq!(wheel.deadline(id), Some(3));

        assert!(wheel.cancel_timer(id));
        assert!(!wheel.cancel_timer(id));
        assert_eq!(wheel.deadline(id), None);

        let mut fired = Vec::new();
        assert_eq!(drain(&mut wheel, 10, &mut fired), 0);
    }

    #[test]
    fn test_expiry_limit_bounds_a_single_poll() {
        let mut wheel = DeadlineTimerWheel::new(0, 1);
        for _ in 0..5 {
            wheel.schedule_timer(1);
        }

        // reach the tick where all five are due
        while wheel.current_tick_time() < 1 {
            wheel.poll(1, |_, _| true, usize::MAX);
        }
        assert_eq!(wheel.poll(1, |_, _| true, 2), 2);
        assert_eq!(wheel.timer_count(), 3);
        assert_eq!(wheel.poll(1, |_, _| true, usize::MAX), 3);
    }

    #[test]
    fn test_rejected_expiry_is_reoffered() {
        let mut wheel = DeadlineTimerWheel::new(0, 1);
        let id = wheel.schedule_timer(1);

        let mut offers = 0;
        for _ in 0..3 {
            wheel.poll(
                1,
                |_, offered| {
                    offers += 1;
                    assert_eq!(offered, id);
                    false
                },
                usize::MAX,
            );
        }
        // the clock holds at the deadline tick, re-offering every poll
        assert_eq!(offers, 3);
        assert_eq!(wheel.timer_count(), 1);

        assert_eq!(wheel.poll(1, |_, _| true, usize::MAX), 1);
        assert_eq!(wheel.timer_count(), 0);
    }

    #[test]
    fn test_reset_start_time_rebases_clock() {
        let mut wheel = DeadlineTimerWheel::new(0, 1);
        let mut fired = Vec::new();
        drain(&mut wheel, 100, &mut fired);
        assert_eq!(wheel.current_tick_time(), 101);

        wheel.reset_start_time(1_000_000);
        assert_eq!(wheel.current_tick_time(), 1_000_001);

        let id = wheel.schedule_timer(1_000_005);
        assert_eq!(drain(&mut wheel, 1_000_005, &mut fired), 1);
        assert_eq!(fired, vec![id]);
    }

    #[test]
    fn test_same_deadline_fires_in_schedule_order() {
        let mut wheel = DeadlineTimerWheel::new(0, 1);
        let a = wheel.schedule_timer(2);
        let b = wheel.schedule_timer(2);

        let mut fired = Vec::new();
        drain(&mut wheel, 2, &mut fired);
        assert_eq!(fired, vec![a, b]);
    }
}
