//! Wire format for the Lodestone cluster log.
//!
//! Every record appended to the durable log is a self-delimited frame:
//!
//! ```text
//! [block_length: u16][template_id: u16][schema_id: u16][version: u16][body]
//! ```
//!
//! All integers are little-endian. The 8-byte header identifies the body
//! layout via `template_id`; `schema_id` must match [`SCHEMA_ID`] or the
//! frame cannot be trusted at all (a mismatch means the replicas were built
//! against different schemas and replay must abort).
//!
//! Bodies are flat records of fixed-width fields with any variable-length
//! fields (strings, opaque payload tails) at the end. Decoding is
//! bounds-checked but otherwise trusts the log: the producer side validates
//! content before a frame becomes durable.
//!
//! Decoding an unrecognized `template_id` yields `None` rather than an
//! error, so replicas can skip event types introduced by newer schemas.

mod cursor;
mod event;
mod header;

pub use cursor::{ReadCursor, WriteCursor};
pub use event::{
    templates, ChangeType, ClusterAction, CloseReason, LogEvent, SESSION_HEADER_LENGTH,
};
pub use header::{MessageHeader, HEADER_LENGTH, SCHEMA_ID, SCHEMA_VERSION};

/// Errors raised while decoding log frames.
///
/// Only [`CodecError::SchemaMismatch`] is expected to be observable in a
/// healthy cluster, and then only after a botched rolling upgrade. The
/// remaining variants indicate a corrupt or foreign log and are treated the
/// same way by callers: replay aborts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The frame header named a schema this build does not speak.
    #[error("expected schema id {expected}, was {actual}")]
    SchemaMismatch { expected: u16, actual: u16 },

    /// A field read would run past the end of the frame.
    #[error("frame truncated: {needed} bytes needed at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A variable-length string field held invalid UTF-8.
    #[error("var-length field at offset {0} is not valid UTF-8")]
    Utf8(usize),
}
