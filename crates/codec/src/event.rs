//! The closed set of events recorded in the cluster log.
//!
//! One [`LogEvent`] variant per template id. Decoding is dispatch-by-tag:
//! recognized templates produce a variant, unrecognized templates produce
//! `None` so newer event types can be skipped by older replicas.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::header::{MessageHeader, HEADER_LENGTH};
use crate::CodecError;

/// Template ids, one per event variant. Fixed for the life of the schema.
pub mod templates {
    pub const SESSION_MESSAGE: u16 = 1;
    pub const SESSION_OPEN: u16 = 2;
    pub const SESSION_CLOSE: u16 = 3;
    pub const TIMER_EVENT: u16 = 4;
    pub const CLUSTER_ACTION: u16 = 5;
    pub const NEW_LEADERSHIP_TERM: u16 = 6;
    pub const MEMBERSHIP_CHANGE: u16 = 7;
}

/// Length of the fixed prefix of a session-message frame: message header
/// plus session id and timestamp. The client payload tail starts here.
pub const SESSION_HEADER_LENGTH: usize = HEADER_LENGTH + 16;

/// Why a client session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientAction,
    ServiceAction,
    Timeout,
    /// Code minted by a newer schema.
    Null,
}

impl CloseReason {
    pub fn code(self) -> u8 {
        match self {
            CloseReason::ClientAction => 0,
            CloseReason::ServiceAction => 1,
            CloseReason::Timeout => 2,
            CloseReason::Null => 255,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => CloseReason::ClientAction,
            1 => CloseReason::ServiceAction,
            2 => CloseReason::Timeout,
            _ => CloseReason::Null,
        }
    }
}

/// Kind of membership change being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Join,
    Quit,
    /// Code minted by a newer schema.
    Null,
}

impl ChangeType {
    pub fn code(self) -> u8 {
        match self {
            ChangeType::Join => 0,
            ChangeType::Quit => 1,
            ChangeType::Null => 255,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChangeType::Join,
            1 => ChangeType::Quit,
            _ => ChangeType::Null,
        }
    }
}

/// Cluster-wide action agreed through the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAction {
    Suspend,
    Resume,
    Snapshot,
    Shutdown,
    Abort,
    /// Code minted by a newer schema.
    Null,
}

impl ClusterAction {
    pub fn code(self) -> u8 {
        match self {
            ClusterAction::Suspend => 0,
            ClusterAction::Resume => 1,
            ClusterAction::Snapshot => 2,
            ClusterAction::Shutdown => 3,
            ClusterAction::Abort => 4,
            ClusterAction::Null => 255,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ClusterAction::Suspend,
            1 => ClusterAction::Resume,
            2 => ClusterAction::Snapshot,
            3 => ClusterAction::Shutdown,
            4 => ClusterAction::Abort,
            _ => ClusterAction::Null,
        }
    }
}

/// One decoded log frame.
///
/// Variable-length fields sit at the end of each record, matching the wire
/// layout. `SessionMessage` carries the client payload tail opaquely; the
/// cluster does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    SessionMessage {
        session_id: i64,
        timestamp: i64,
        payload: Vec<u8>,
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
    ClusterAction {
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        action: ClusterAction,
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
}

impl LogEvent {
    /// Template id this variant encodes under.
    pub fn template_id(&self) -> u16 {
        match self {
            LogEvent::SessionMessage { .. } => templates::SESSION_MESSAGE,
            LogEvent::SessionOpen { .. } => templates::SESSION_OPEN,
            LogEvent::SessionClose { .. } => templates::SESSION_CLOSE,
            LogEvent::TimerEvent { .. } => templates::TIMER_EVENT,
            LogEvent::ClusterAction { .. } => templates::CLUSTER_ACTION,
            LogEvent::NewLeadershipTerm { .. } => templates::NEW_LEADERSHIP_TERM,
            LogEvent::MembershipChange { .. } => templates::MEMBERSHIP_CHANGE,
        }
    }

    fn block_length(&self) -> u16 {
        match self {
            LogEvent::SessionMessage { .. } => (SESSION_HEADER_LENGTH - HEADER_LENGTH) as u16,
            LogEvent::SessionOpen { .. } => 36,
            LogEvent::SessionClose { .. } => 17,
            LogEvent::TimerEvent { .. } => 16,
            LogEvent::ClusterAction { .. } => 25,
            LogEvent::NewLeadershipTerm { .. } => 40,
            LogEvent::MembershipChange { .. } => 33,
        }
    }

    /// Decode one frame, header included.
    ///
    /// Returns `Ok(None)` for an unrecognized template id. Fails on a
    /// schema mismatch or a frame shorter than its fields claim.
    pub fn decode(buffer: &[u8]) -> Result<Option<Self>, CodecError> {
        let mut cursor = ReadCursor::new(buffer);
        let header = MessageHeader::decode(&mut cursor)?;
        header.ensure_schema()?;
        Self::decode_body(&header, &mut cursor)
    }

    /// Decode the body of a frame whose header has already been read and
    /// schema-checked. The cursor sits at the first body byte.
    pub fn decode_body(
        header: &MessageHeader,
        cursor: &mut ReadCursor<'_>,
    ) -> Result<Option<Self>, CodecError> {
        let event = match header.template_id {
            templates::SESSION_MESSAGE => LogEvent::SessionMessage {
                session_id: cursor.read_i64()?,
                timestamp: cursor.read_i64()?,
                payload: cursor.remaining_bytes().to_vec(),
            },
            templates::SESSION_OPEN => LogEvent::SessionOpen {
                log_position: cursor.read_i64()?,
                correlation_id: cursor.read_i64()?,
                session_id: cursor.read_i64()?,
                timestamp: cursor.read_i64()?,
                response_stream_id: cursor.read_i32()?,
                response_channel: cursor.read_string()?,
            },
            templates::SESSION_CLOSE => LogEvent::SessionClose {
                session_id: cursor.read_i64()?,
                timestamp: cursor.read_i64()?,
                close_reason: CloseReason::from_code(cursor.read_u8()?),
            },
            templates::TIMER_EVENT => LogEvent::TimerEvent {
                correlation_id: cursor.read_i64()?,
                timestamp: cursor.read_i64()?,
            },
            templates::CLUSTER_ACTION => LogEvent::ClusterAction {
                leadership_term_id: cursor.read_i64()?,
                log_position: cursor.read_i64()?,
                timestamp: cursor.read_i64()?,
                action: ClusterAction::from_code(cursor.read_u8()?),
            },
            templates::NEW_LEADERSHIP_TERM => LogEvent::NewLeadershipTerm {
                leadership_term_id: cursor.read_i64()?,
                log_position: cursor.read_i64()?,
                timestamp: cursor.read_i64()?,
                term_base_log_position: cursor.read_i64()?,
                leader_member_id: cursor.read_i32()?,
                log_session_id: cursor.read_i32()?,
            },
            templates::MEMBERSHIP_CHANGE => LogEvent::MembershipChange {
                leadership_term_id: cursor.read_i64()?,
                log_position: cursor.read_i64()?,
                timestamp: cursor.read_i64()?,
                leader_member_id: cursor.read_i32()?,
                cluster_size: cursor.read_i32()?,
                change_type: ChangeType::from_code(cursor.read_u8()?),
                member_id: cursor.read_i32()?,
                cluster_members: cursor.read_string()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Encode a full frame, header included.
    pub fn encode(&self) -> Vec<u8> {
        let mut cursor = WriteCursor::with_capacity(HEADER_LENGTH + self.block_length() as usize);
        MessageHeader::new(self.template_id(), self.block_length()).encode(&mut cursor);

        match self {
            LogEvent::SessionMessage {
                session_id,
                timestamp,
                payload,
            } => {
                cursor.write_i64(*session_id);
                cursor.write_i64(*timestamp);
                cursor.write_bytes(payload);
            }
            LogEvent::SessionOpen {
                log_position,
                correlation_id,
                session_id,
                timestamp,
                response_stream_id,
                response_channel,
            } => {
                cursor.write_i64(*log_position);
                cursor.write_i64(*correlation_id);
                cursor.write_i64(*session_id);
                cursor.write_i64(*timestamp);
                cursor.write_i32(*response_stream_id);
                cursor.write_string(response_channel);
            }
            LogEvent::SessionClose {
                session_id,
                timestamp,
                close_reason,
            } => {
                cursor.write_i64(*session_id);
                cursor.write_i64(*timestamp);
                cursor.write_u8(close_reason.code());
            }
            LogEvent::TimerEvent {
                correlation_id,
                timestamp,
            } => {
                cursor.write_i64(*correlation_id);
                cursor.write_i64(*timestamp);
            }
            LogEvent::ClusterAction {
                leadership_term_id,
                log_position,
                timestamp,
                action,
            } => {
                cursor.write_i64(*leadership_term_id);
                cursor.write_i64(*log_position);
                cursor.write_i64(*timestamp);
                cursor.write_u8(action.code());
            }
            LogEvent::NewLeadershipTerm {
                leadership_term_id,
                log_position,
                timestamp,
                term_base_log_position,
                leader_member_id,
                log_session_id,
            } => {
                cursor.write_i64(*leadership_term_id);
                cursor.write_i64(*log_position);
                cursor.write_i64(*timestamp);
                cursor.write_i64(*term_base_log_position);
                cursor.write_i32(*leader_member_id);
                cursor.write_i32(*log_session_id);
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
                cursor.write_i64(*leadership_term_id);
                cursor.write_i64(*log_position);
                cursor.write_i64(*timestamp);
                cursor.write_i32(*leader_member_id);
                cursor.write_i32(*cluster_size);
                cursor.write_u8(change_type.code());
                cursor.write_i32(*member_id);
                cursor.write_string(cluster_members);
            }
        }

        cursor.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SCHEMA_ID;

    fn assert_round_trip(event: LogEvent) {
        let bytes = event.encode();
        let decoded = LogEvent::decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_session_message_round_trip() {
        let event = LogEvent::SessionMessage {
            session_id: 7,
            timestamp: 1000,
            payload: b"X".to_vec(),
        };
        let bytes = event.encode();
        // the opaque payload tail starts right after the session header
        assert_eq!(&bytes[SESSION_HEADER_LENGTH..], b"X");
        assert_eq!(LogEvent::decode(&bytes).unwrap().unwrap(), event);
    }

    #[test]
    fn test_session_open_round_trip() {
        assert_round_trip(LogEvent::SessionOpen {
            log_position: 4096,
            correlation_id: 42,
            session_id: 7,
            timestamp: 1000,
            response_stream_id: 5,
            response_channel: "aeron:udp?endpoint=localhost:9999".to_string(),
        });
    }

    #[test]
    fn test_session_close_round_trip() {
        assert_round_trip(LogEvent::SessionClose {
            session_id: 7,
            timestamp: 2000,
            close_reason: CloseReason::ClientAction,
        });
    }

    #[test]
    fn test_timer_event_round_trip() {
        assert_round_trip(LogEvent::TimerEvent {
            correlation_id: -3,
            timestamp: 99,
        });
    }

    #[test]
    fn test_cluster_action_round_trip() {
        assert_round_trip(LogEvent::ClusterAction {
            leadership_term_id: 2,
            log_position: 8192,
            timestamp: 3000,
            action: ClusterAction::Snapshot,
        });
    }

    #[test]
    fn test_new_leadership_term_round_trip() {
        assert_round_trip(LogEvent::NewLeadershipTerm {
            leadership_term_id: 3,
            log_position: 16384,
            timestamp: 4000,
            term_base_log_position: 8192,
            leader_member_id: 1,
            log_session_id: -99,
        });
    }

    #[test]
    fn test_membership_change_round_trip() {
        assert_round_trip(LogEvent::MembershipChange {
            leadership_term_id: 3,
            log_position: 16384,
            timestamp: 4000,
            leader_member_id: 1,
            cluster_size: 4,
            change_type: ChangeType::Join,
            member_id: 3,
            cluster_members: "0,localhost:20000|1,localhost:20001".to_string(),
        });
    }

    #[test]
    fn test_unknown_template_skipped() {
        let mut cursor = WriteCursor::new();
        MessageHeader::new(999, 8).encode(&mut cursor);
        cursor.write_i64(1234);
        assert_eq!(LogEvent::decode(&cursor.into_vec()).unwrap(), None);
    }

    #[test]
    fn test_schema_mismatch_is_fatal() {
        let mut bytes = LogEvent::TimerEvent {
            correlation_id: 1,
            timestamp: 1,
        }
        .encode();
        // schema_id occupies bytes 4..6 of the header
        bytes[4] = 0x22;
        bytes[5] = 0x00;
        assert_eq!(
            LogEvent::decode(&bytes).unwrap_err(),
            CodecError::SchemaMismatch {
                expected: SCHEMA_ID,
                actual: 0x22,
            }
        );
    }

    #[test]
    fn test_truncated_body_is_fatal() {
        let bytes = LogEvent::TimerEvent {
            correlation_id: 1,
            timestamp: 1,
        }
        .encode();
        let err = LogEvent::decode(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn test_unknown_enum_codes_decode_to_null() {
        assert_eq!(CloseReason::from_code(200), CloseReason::Null);
        assert_eq!(ChangeType::from_code(200), ChangeType::Null);
        assert_eq!(ClusterAction::from_code(200), ClusterAction::Null);
        // known codes survive the trip
        assert_eq!(
            ClusterAction::from_code(ClusterAction::Shutdown.code()),
            ClusterAction::Shutdown
        );
    }
}
