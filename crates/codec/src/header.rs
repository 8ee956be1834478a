//! Framed message header.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::CodecError;

/// Schema this build encodes and decodes. Replicas on different schema ids
/// cannot replay each other's logs.
pub const SCHEMA_ID: u16 = 111;

/// Schema version this build encodes.
pub const SCHEMA_VERSION: u16 = 1;

/// Encoded length of [`MessageHeader`] in bytes.
pub const HEADER_LENGTH: usize = 8;

/// Header prefixed to every frame in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Length of the fixed-width block that follows the header.
    pub block_length: u16,
    /// Tag selecting the body layout.
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
}

impl MessageHeader {
    /// Header for a frame encoded by this build.
    pub fn new(template_id: u16, block_length: u16) -> Self {
        Self {
            block_length,
            template_id,
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        }
    }

    pub fn decode(cursor: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            block_length: cursor.read_u16()?,
            template_id: cursor.read_u16()?,
            schema_id: cursor.read_u16()?,
            version: cursor.read_u16()?,
        })
    }

    /// Fail unless the frame was encoded under [`SCHEMA_ID`].
    ///
    /// A mismatch is unrecoverable: field offsets of every subsequent byte
    /// in the log are suspect.
    pub fn ensure_schema(&self) -> Result<(), CodecError> {
        if self.schema_id != SCHEMA_ID {
            return Err(CodecError::SchemaMismatch {
                expected: SCHEMA_ID,
                actual: self.schema_id,
            });
        }
        Ok(())
    }

    pub fn encode(&self, cursor: &mut WriteCursor) {
        cursor.write_u16(self.block_length);
        cursor.write_u16(self.template_id);
        cursor.write_u16(self.schema_id);
        cursor.write_u16(self.version);
    }
}
