//! In-memory collaborators for tests and simulations.

use crate::handler::ClusterEventHandler;
use crate::stream::{ControlledPollAction, LogStream};
use lodestone_codec::{ChangeType, ClusterAction, CloseReason};
use std::collections::VecDeque;

/// One recorded replay callback, with the arguments it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayCall {
    SessionMessage {
        session_id: i64,
        timestamp: i64,
        payload: Vec<u8>,
        log_position: i64,
    },
    SessionOpen {
        log_position: i64,
        correlation_id: i64,
        session_id: i64,
        timestamp: i64,
        response_stream_id: i32,
        response_channel: String,
    },
    SessionClose {
        session_id: i64,
        timestamp: i64,
        close_reason: CloseReason,
    },
    TimerEvent {
        correlation_id: i64,
        timestamp: i64,
    },
    NewLeadershipTerm {
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        term_base_log_position: i64,
        leader_member_id: i32,
        log_session_id: i32,
    },
    MembershipChange {
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        leader_member_id: i32,
        cluster_size: i32,
        change_type: ChangeType,
        member_id: i32,
        cluster_members: String,
    },
    ClusterAction {
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        action: ClusterAction,
    },
}

/// Handler double that records every callback for later assertion.
#[derive(Debug)]
pub struct RecordingHandler {
    /// Replay callbacks, in dispatch order.
    pub replayed: Vec<ReplayCall>,
    /// Every live timer offer as `(correlation_id, now_ms)`, accepted or not.
    pub fired: Vec<(i64, i64)>,
    /// What `on_timer_event` reports back; flip to `false` to simulate
    /// downstream backpressure.
    pub accept_timer_events: bool,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            replayed: Vec::new(),
            fired: Vec::new(),
            accept_timer_events: true,
        }
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterEventHandler for RecordingHandler {
    fn on_replay_session_message(
        &mut self,
        session_id: i64,
        timestamp: i64,
        payload: &[u8],
        log_position: i64,
    ) {
        self.replayed.push(ReplayCall::SessionMessage {
            session_id,
            timestamp,
            payload: payload.to_vec(),
            log_position,
        });
    }

    fn on_replay_session_open(
        &mut self,
        log_position: i64,
        correlation_id: i64,
        session_id: i64,
        timestamp: i64,
        response_stream_id: i32,
        response_channel: &str,
    ) {
        self.replayed.push(ReplayCall::SessionOpen {
            log_position,
            correlation_id,
            session_id,
            timestamp,
            response_stream_id,
            response_channel: response_channel.to_string(),
        });
    }

    fn on_replay_session_close(
        &mut self,
        session_id: i64,
        timestamp: i64,
        close_reason: CloseReason,
    ) {
        self.replayed.push(ReplayCall::SessionClose {
            session_id,
            timestamp,
            close_reason,
        });
    }

    fn on_replay_timer_event(&mut self, correlation_id: i64, timestamp: i64) {
        self.replayed.push(ReplayCall::TimerEvent {
            correlation_id,
            timestamp,
        });
    }

    fn on_replay_new_leadership_term(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        term_base_log_position: i64,
        leader_member_id: i32,
        log_session_id: i32,
    ) {
        self.replayed.push(ReplayCall::NewLeadershipTerm {
            leadership_term_id,
            log_position,
            timestamp,
            term_base_log_position,
            leader_member_id,
            log_session_id,
        });
    }

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
    ) {
        self.replayed.push(ReplayCall::MembershipChange {
            leadership_term_id,
            log_position,
            timestamp,
            leader_member_id,
            cluster_size,
            change_type,
            member_id,
            cluster_members: cluster_members.to_string(),
        });
    }

    fn on_replay_cluster_action(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        action: ClusterAction,
    ) {
        self.replayed.push(ReplayCall::ClusterAction {
            leadership_term_id,
            log_position,
            timestamp,
            action,
        });
    }

    fn on_timer_event(&mut self, correlation_id: i64, now_ms: i64) -> bool {
        self.fired.push((correlation_id, now_ms));
        self.accept_timer_events
    }
}

/// [`LogStream`] backed by a queue of frames.
///
/// Position advances by each frame's encoded length. An aborted fragment
/// stays at the head of the queue with the position untouched, matching the
/// controlled-poll contract.
#[derive(Debug, Default)]
pub struct InMemoryLogStream {
    frames: VecDeque<Vec<u8>>,
    position: i64,
    closed: bool,
    removed_destinations: Vec<String>,
}

impl InMemoryLogStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one encoded frame to the tail of the log.
    pub fn append(&mut self, frame: Vec<u8>) {
        self.frames.push_back(frame);
    }

    /// Log position once every queued frame is consumed.
    pub fn end_position(&self) -> i64 {
        self.position + self.frames.iter().map(|f| f.len() as i64).sum::<i64>()
    }

    /// Simulate the producer closing the stream (end of log).
    pub fn close_by_producer(&mut self) {
        self.closed = true;
    }

    /// Destinations detached via [`LogStream::remove_destination`].
    pub fn removed_destinations(&self) -> &[String] {
        &self.removed_destinations
    }
}

impl LogStream for InMemoryLogStream {
    fn position(&self) -> i64 {
        self.position
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn bounded_controlled_poll(
        &mut self,
        on_fragment: &mut dyn FnMut(&[u8], i64) -> ControlledPollAction,
        bound_position: i64,
        fragment_limit: usize,
    ) -> usize {
        let mut fragments = 0;
        while fragments < fragment_limit {
            let Some(frame) = self.frames.pop_front() else {
                break;
            };
            let end = self.position + frame.len() as i64;
            if end > bound_position {
                self.frames.push_front(frame);
                break;
            }
            match on_fragment(&frame, end) {
                ControlledPollAction::Abort => {
                    self.frames.push_front(frame);
                    break;
                }
                ControlledPollAction::Continue => {
                    self.position = end;
                    fragments += 1;
                }
                ControlledPollAction::Break => {
                    self.position = end;
                    fragments += 1;
                    break;
                }
            }
        }
        fragments
    }

    fn remove_destination(&mut self, destination: &str) {
        self.removed_destinations.push(destination.to_string());
    }

    fn close(&mut self) {
        self.closed = true;
        self.frames.clear();
    }
}
