//! Bounded replay of the durable log into the state machine.

use crate::handler::ClusterEventHandler;
use crate::stream::{ControlledPollAction, LogStream};
use crate::ClusterError;
use lodestone_codec::{LogEvent, MessageHeader, ReadCursor};

/// Most frames decoded and dispatched by one [`LogAdapter::poll`] call.
pub const FRAGMENT_LIMIT: usize = 100;

/// Decodes log frames and dispatches them, strictly in order, to the
/// state-machine handler.
///
/// The replay cursor mirrors the stream's position and only ever moves
/// forward. Each poll is double-bounded — by `bound_position` and by
/// [`FRAGMENT_LIMIT`] — so the driving loop can interleave replay with
/// timer polling and housekeeping without starving either.
#[derive(Debug)]
pub struct LogAdapter<S> {
    stream: S,
}

impl<S: LogStream> LogAdapter<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Replay frames from the current position up to `bound_position`.
    ///
    /// Returns the number of frames dispatched; 0 means no data was
    /// available. Stops early after dispatching a cluster action frame —
    /// such actions (snapshot, shutdown) change what continuing replay
    /// means, so the caller must re-evaluate before polling again.
    ///
    /// Fails only on an untrustworthy frame (schema mismatch or corrupt
    /// layout); the offending frame is left unconsumed.
    pub fn poll<H: ClusterEventHandler>(
        &mut self,
        handler: &mut H,
        bound_position: i64,
    ) -> Result<usize, ClusterError> {
        let mut failure = None;
        let fragments = self.stream.bounded_controlled_poll(
            &mut |buffer, position| match on_fragment(handler, buffer, position) {
                Ok(action) => action,
                Err(e) => {
                    failure = Some(e);
                    ControlledPollAction::Abort
                }
            },
            bound_position,
            FRAGMENT_LIMIT,
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(fragments),
        }
    }

    /// Current replay position. Monotonic.
    pub fn position(&self) -> i64 {
        self.stream.position()
    }

    /// Whether the producer has closed the stream (end of log or leader
    /// transition).
    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Detach a transport destination from the underlying stream.
    pub fn remove_destination(&mut self, destination: &str) {
        self.stream.remove_destination(destination);
    }

    /// Release the underlying subscription.
    pub fn close(&mut self) {
        self.stream.close();
    }
}

/// Decode and dispatch a single frame.
///
/// `position` is the log position at the end of the frame. Unknown template
/// ids are skipped with `Continue` so newer event types do not wedge older
/// replicas; a schema mismatch or truncated body aborts replay instead.
pub fn on_fragment<H: ClusterEventHandler>(
    handler: &mut H,
    buffer: &[u8],
    position: i64,
) -> Result<ControlledPollAction, ClusterError> {
    let mut cursor = ReadCursor::new(buffer);
    let header = MessageHeader::decode(&mut cursor)?;
    header.ensure_schema()?;

    let Some(event) = LogEvent::decode_body(&header, &mut cursor)? else {
        return Ok(ControlledPollAction::Continue);
    };

    let action = match event {
        LogEvent::SessionMessage {
            session_id,
            timestamp,
            payload,
        } => {
            handler.on_replay_session_message(session_id, timestamp, &payload, position);
            ControlledPollAction::Continue
        }
        LogEvent::SessionOpen {
            log_position,
            correlation_id,
            session_id,
            timestamp,
            response_stream_id,
            response_channel,
        } => {
            handler.on_replay_session_open(
                log_position,
                correlation_id,
                session_id,
                timestamp,
                response_stream_id,
                &response_channel,
            );
            ControlledPollAction::Continue
        }
        LogEvent::SessionClose {
            session_id,
            timestamp,
            close_reason,
        } => {
            handler.on_replay_session_close(session_id, timestamp, close_reason);
            ControlledPollAction::Continue
        }
        LogEvent::TimerEvent {
            correlation_id,
            timestamp,
        } => {
            handler.on_replay_timer_event(correlation_id, timestamp);
            ControlledPollAction::Continue
        }
        LogEvent::NewLeadershipTerm {
            leadership_term_id,
            log_position,
            timestamp,
            term_base_log_position,
            leader_member_id,
            log_session_id,
        } => {
            handler.on_replay_new_leadership_term(
                leadership_term_id,
                log_position,
                timestamp,
                term_base_log_position,
                leader_member_id,
                log_session_id,
            );
            ControlledPollAction::Continue
        }
        LogEvent::MembershipChange {
            leadership_term_id,
            log_position,
            timestamp,
            leader_member_id,
            cluster_size,
            change_type,
            member_id,
            cluster_members,
        } => {
            handler.on_replay_membership_change(
                leadership_term_id,
                log_position,
                timestamp,
                leader_member_id,
                cluster_size,
                change_type,
                member_id,
                &cluster_members,
            );
            ControlledPollAction::Continue
        }
        LogEvent::ClusterAction {
            leadership_term_id,
            log_position,
            timestamp,
            action,
        } => {
            handler.on_replay_cluster_action(leadership_term_id, log_position, timestamp, action);
            // the action may invalidate what "continue" means; stop here
            ControlledPollAction::Break
        }
    };
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHandler, ReplayCall};
    use lodestone_codec::{ClusterAction, CodecError, MessageHeader, WriteCursor, SCHEMA_ID};

    fn timer_frame(correlation_id: i64) -> Vec<u8> {
        LogEvent::TimerEvent {
            correlation_id,
            timestamp: 1,
        }
        .encode()
    }

    #[test]
    fn test_recognized_templates_continue() {
        let mut handler = RecordingHandler::new();
        let action = on_fragment(&mut handler, &timer_frame(5), 64).unwrap();
        assert_eq!(action, ControlledPollAction::Continue);
        assert_eq!(
            handler.replayed,
            vec![ReplayCall::TimerEvent {
                correlation_id: 5,
                timestamp: 1,
            }]
        );
    }

    #[test]
    fn test_cluster_action_breaks() {
        let frame = LogEvent::ClusterAction {
            leadership_term_id: 1,
            log_position: 128,
            timestamp: 9,
            action: ClusterAction::Snapshot,
        }
        .encode();

        let mut handler = RecordingHandler::new();
        let action = on_fragment(&mut handler, &frame, 128).unwrap();
        assert_eq!(action, ControlledPollAction::Break);
        assert_eq!(handler.replayed.len(), 1);
    }

    #[test]
    fn test_unknown_template_continues_without_dispatch() {
        let mut cursor = WriteCursor::new();
        MessageHeader::new(4242, 8).encode(&mut cursor);
        cursor.write_i64(-1);

        let mut handler = RecordingHandler::new();
        let action = on_fragment(&mut handler, &cursor.into_vec(), 64).unwrap();
        assert_eq!(action, ControlledPollAction::Continue);
        assert!(handler.replayed.is_empty());
    }

    #[test]
    fn test_schema_mismatch_is_fatal() {
        let mut frame = timer_frame(5);
        frame[4] = 0x07; // schema_id low byte
        frame[5] = 0x00;

        let mut handler = RecordingHandler::new();
        let err = on_fragment(&mut handler, &frame, 64).unwrap_err();
        assert_eq!(
            err,
            ClusterError::Protocol(CodecError::SchemaMismatch {
                expected: SCHEMA_ID,
                actual: 7,
            })
        );
        assert!(handler.replayed.is_empty());
    }

    #[test]
    fn test_session_message_payload_stripped_of_prefix() {
        let frame = LogEvent::SessionMessage {
            session_id: 3,
            timestamp: 77,
            payload: b"order:buy:100".to_vec(),
        }
        .encode();

        let mut handler = RecordingHandler::new();
        on_fragment(&mut handler, &frame, 999).unwrap();
        assert_eq!(
            handler.replayed,
            vec![ReplayCall::SessionMessage {
                session_id: 3,
                timestamp: 77,
                payload: b"order:buy:100".to_vec(),
                log_position: 999,
            }]
        );
    }
}
