//! Logical timers addressed by correlation id.

use crate::handler::{ClusterEventHandler, SnapshotWriter};
use crate::index::TimerIndex;
use crate::wheel::DeadlineTimerWheel;
use tracing::{debug, trace, warn};

/// Expiry budget for one [`TimerService::poll`] call, so timer work cannot
/// monopolize the duty cycle.
pub const TIMER_POLL_LIMIT: usize = 10;

/// Safety valve against a misbehaving wheel; a correct wheel converges on
/// `now` long before this.
const MAX_ITERATIONS_PER_POLL: usize = 10_000_000;

/// Wheel tick resolution in milliseconds.
const TICK_RESOLUTION_MS: i64 = 1;

/// Schedules, cancels, and fires logical timers for the consensus module.
///
/// A correlation id addresses at most one live timer; scheduling again
/// implicitly cancels the prior one. A fired timer is consumed only once
/// the handler durably records it — on backpressure it stays pending and is
/// re-offered, so a timer never disappears silently and never fires twice
/// for the same logical event.
#[derive(Debug)]
pub struct TimerService {
    wheel: DeadlineTimerWheel,
    index: TimerIndex,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            wheel: DeadlineTimerWheel::new(0, TICK_RESOLUTION_MS),
            index: TimerIndex::default(),
        }
    }

    /// Schedule a timer for `correlation_id` due at `deadline_ms`,
    /// replacing any timer already scheduled under that id.
    pub fn schedule_timer(&mut self, correlation_id: i64, deadline_ms: i64) {
        self.cancel_timer(correlation_id);

        let timer_id = self.wheel.schedule_timer(deadline_ms);
        self.index.insert(correlation_id, timer_id);
        debug!(correlation_id, deadline_ms, "timer scheduled");
    }

    /// Cancel the timer for `correlation_id`, if one is live. Returns
    /// whether anything was removed.
    pub fn cancel_timer(&mut self, correlation_id: i64) -> bool {
        match self.index.remove_by_correlation_id(correlation_id) {
            Some(timer_id) => {
                self.wheel.cancel_timer(timer_id);
                debug!(correlation_id, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Advance the wheel to `now_ms`, firing due timers into the handler.
    ///
    /// Bounded by [`TIMER_POLL_LIMIT`] expiries per call; whatever is left
    /// fires on later polls. Returns the number of timers consumed.
    pub fn poll<H: ClusterEventHandler>(&mut self, now_ms: i64, handler: &mut H) -> usize {
        let mut expired = 0;
        let mut iterations = 0;

        loop {
            let tick_time_before = self.wheel.current_tick_time();
            let Self { wheel, index } = self;
            let newly_expired = wheel.poll(
                now_ms,
                |now, timer_id| match index.correlation_id_for(timer_id) {
                    Some(correlation_id) => {
                        if handler.on_timer_event(correlation_id, now) {
                            index.remove_by_timer_id(timer_id);
                            trace!(correlation_id, now, "timer fired");
                            true
                        } else {
                            trace!(correlation_id, now, "timer expiry backpressured, retrying");
                            false
                        }
                    }
                    // every wheel timer has an index entry; consume strays
                    None => true,
                },
                TIMER_POLL_LIMIT,
            );
            expired += newly_expired;

            // the tick equal to now_ms must be polled before breaking, so a
            // timer due exactly at now_ms fires in this call
            if expired >= TIMER_POLL_LIMIT || self.wheel.current_tick_time() > now_ms {
                break;
            }
            // a rejected expiry holds the clock in place; hand back and let
            // a later poll re-offer it
            if newly_expired == 0 && self.wheel.current_tick_time() == tick_time_before {
                break;
            }
            iterations += 1;
            if iterations >= MAX_ITERATIONS_PER_POLL {
                warn!(now_ms, iterations, "timer poll hit iteration ceiling");
                break;
            }
        }

        expired
    }

    /// Number of live timers.
    pub fn timer_count(&self) -> usize {
        debug_assert_eq!(self.index.len(), self.wheel.timer_count());
        self.wheel.timer_count()
    }

    /// Progress of the wheel's internal clock.
    pub fn current_tick_time_ms(&self) -> i64 {
        self.wheel.current_tick_time()
    }

    /// Rebase the wheel clock, e.g. when resuming after restart in a new
    /// epoch. Only valid while no timers are live.
    pub fn reset_start_time(&mut self, start_time_ms: i64) {
        self.wheel.reset_start_time(start_time_ms);
    }

    /// Emit every live `(correlation_id, deadline)` pair to the snapshot
    /// writer, one record each, in unspecified order. Restoring is
    /// `schedule_timer` with each pair.
    pub fn snapshot<W: SnapshotWriter>(&self, writer: &mut W) {
        for (correlation_id, timer_id) in self.index.iter() {
            if let Some(deadline_ms) = self.wheel.deadline(timer_id) {
                writer.snapshot_timer(correlation_id, deadline_ms);
            }
        }
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHandler;

    #[test]
    fn test_expires_at_deadline() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();
        service.schedule_timer(100, 5000);

        assert_eq!(service.poll(4000, &mut handler), 0);
        assert!(handler.fired.is_empty());

        assert_eq!(service.poll(5000, &mut handler), 1);
        assert_eq!(handler.fired, vec![(100, 5000)]);
        assert_eq!(service.timer_count(), 0);

        assert_eq!(service.poll(6000, &mut handler), 0);
        assert_eq!(handler.fired.len(), 1);
    }

    #[test]
    fn test_schedule_then_cancel_leaves_nothing() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();

        let before = service.timer_count();
        service.schedule_timer(7, 100);
        assert!(service.cancel_timer(7));
        assert_eq!(service.timer_count(), before);

        assert_eq!(service.poll(10_000, &mut handler), 0);
        assert!(handler.fired.is_empty());
    }

    #[test]
    fn test_cancel_absent_is_noop() {
        let mut service = TimerService::new();
        assert!(!service.cancel_timer(123));
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();

        service.schedule_timer(7, 100);
        service.schedule_timer(7, 300);
        assert_eq!(service.timer_count(), 1);

        // past the first deadline: nothing fires
        assert_eq!(service.poll(200, &mut handler), 0);
        // at the second deadline: exactly one fire
        assert_eq!(service.poll(300, &mut handler), 1);
        assert_eq!(handler.fired, vec![(7, 300)]);
    }

    #[test]
    fn test_backpressured_timer_retried_until_acknowledged() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();
        handler.accept_timer_events = false;

        service.schedule_timer(9, 50);
        assert_eq!(service.poll(50, &mut handler), 0);
        assert!(!handler.fired.is_empty());
        assert_eq!(service.timer_count(), 1);

        // same nowMs, still backpressured: offered again, still pending
        let offers = handler.fired.len();
        assert_eq!(service.poll(50, &mut handler), 0);
        assert!(handler.fired.len() > offers);
        assert_eq!(service.timer_count(), 1);

        // downstream drains: consumed exactly once, never offered again
        handler.accept_timer_events = true;
        handler.fired.clear();
        assert_eq!(service.poll(50, &mut handler), 1);
        assert_eq!(handler.fired, vec![(9, 50)]);
        assert_eq!(service.timer_count(), 0);
        assert_eq!(service.poll(60, &mut handler), 0);
        assert_eq!(handler.fired.len(), 1);
    }

    #[test]
    fn test_backpressured_timer_offered_once_per_poll() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();
        handler.accept_timer_events = false;

        service.schedule_timer(9, 50);

        // nowMs far past the deadline: still exactly one offer per poll call
        assert_eq!(service.poll(5000, &mut handler), 0);
        assert_eq!(handler.fired, vec![(9, 5000)]);

        assert_eq!(service.poll(5000, &mut handler), 0);
        assert_eq!(handler.fired.len(), 2);
        assert_eq!(service.timer_count(), 1);
    }

    #[test]
    fn test_poll_limit_bounds_one_call() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();

        for correlation_id in 0..(TIMER_POLL_LIMIT as i64 + 5) {
            service.schedule_timer(correlation_id, 10);
        }

        assert_eq!(service.poll(10, &mut handler), TIMER_POLL_LIMIT);
        assert_eq!(service.timer_count(), 5);
        assert_eq!(service.poll(10, &mut handler), 5);
        assert_eq!(service.timer_count(), 0);
    }

    #[test]
    fn test_snapshot_emits_each_live_timer_once() {
        let mut service = TimerService::new();
        service.schedule_timer(1, 100);
        service.schedule_timer(2, 200);
        service.schedule_timer(2, 250); // replaces
        service.schedule_timer(3, 300);
        service.cancel_timer(3);

        let mut written = Vec::new();
        service.snapshot(&mut written);
        written.sort_unstable();
        assert_eq!(written, vec![(1, 100), (2, 250)]);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();
        service.schedule_timer(1, 5000);
        service.schedule_timer(2, 6000);
        assert_eq!(service.poll(4000, &mut handler), 0);

        let mut written = Vec::new();
        service.snapshot(&mut written);

        // restart: rebuild from the snapshot pairs
        let mut restored = TimerService::new();
        for (correlation_id, deadline_ms) in written {
            restored.schedule_timer(correlation_id, deadline_ms);
        }
        assert_eq!(restored.timer_count(), 2);

        let mut replay = Vec::new();
        restored.snapshot(&mut replay);
        replay.sort_unstable();
        assert_eq!(replay, vec![(1, 5000), (2, 6000)]);

        assert_eq!(restored.poll(5000, &mut handler), 1);
        assert_eq!(restored.poll(6000, &mut handler), 1);
        assert_eq!(handler.fired, vec![(1, 5000), (2, 6000)]);
    }

    #[test]
    fn test_reset_start_time_skips_idle_ticks() {
        let mut service = TimerService::new();
        let mut handler = RecordingHandler::new();

        service.reset_start_time(1_000_000);
        service.schedule_timer(4, 1_000_010);
        assert_eq!(service.poll(1_000_010, &mut handler), 1);
        assert_eq!(handler.fired, vec![(4, 1_000_010)]);
        assert!(service.current_tick_time_ms() > 1_000_000);
    }
}
