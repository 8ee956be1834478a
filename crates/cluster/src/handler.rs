//! Callback seams between this crate and the consensus-module state machine.

use lodestone_codec::{ChangeType, ClusterAction, CloseReason};

/// The state machine's view of replayed log events and live timer expiry.
///
/// One method per log event variant plus the live timer notification. The
/// replay methods are infallible: by the time a frame is in the durable log
/// it has been accepted by the cluster and the state machine must apply it.
/// Only [`on_timer_event`](Self::on_timer_event) can push back, because it
/// is the one call that needs to append new data downstream.
pub trait ClusterEventHandler {
    /// A client session message replayed from the log. `payload` is the
    /// opaque client bytes with the session header already stripped.
    fn on_replay_session_message(
        &mut self,
        session_id: i64,
        timestamp: i64,
        payload: &[u8],
        log_position: i64,
    );

    fn on_replay_session_open(
        &mut self,
        log_position: i64,
        correlation_id: i64,
        session_id: i64,
        timestamp: i64,
        response_stream_id: i32,
        response_channel: &str,
    );

    fn on_replay_session_close(&mut self, session_id: i64, timestamp: i64, close_reason: CloseReason);

    fn on_replay_timer_event(&mut self, correlation_id: i64, timestamp: i64);

    fn on_replay_new_leadership_term(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        term_base_log_position: i64,
        leader_member_id: i32,
        log_session_id: i32,
    );

    #[allow(clippy::too_many_arguments)]
    fn on_replay_membership_change(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        leader_member_id: i32,
        cluster_size: i32,
        change_type: ChangeType,
        member_id: i32,
        cluster_members: &str,
    );

    fn on_replay_cluster_action(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        action: ClusterAction,
    );

    /// A live timer fired at `now_ms`.
    ///
    /// Return `true` once the timer-fired event is durably recorded (e.g.
    /// appended to the log). Return `false` if downstream is backpressured;
    /// the timer stays pending and will be offered again on a later poll.
    fn on_timer_event(&mut self, correlation_id: i64, now_ms: i64) -> bool;
}

/// Sink for the timer state captured into a snapshot.
///
/// Called once per live timer during
/// [`TimerService::snapshot`](crate::TimerService::snapshot). Restoring is
/// the inverse: the loader calls `schedule_timer` with each recorded pair.
pub trait SnapshotWriter {
    fn snapshot_timer(&mut self, correlation_id: i64, deadline_ms: i64);
}

/// Collect snapshot records in memory.
impl SnapshotWriter for Vec<(i64, i64)> {
    fn snapshot_timer(&mut self, correlation_id: i64, deadline_ms: i64) {
        self.push((correlation_id, deadline_ms));
    }
}
