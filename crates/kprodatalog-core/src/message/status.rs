//! Status message (0x40)

use crate::codec::{Field, FieldType, Record, RecordReader, RecordWriter, SchemaError};
use crate::frame::DatalogFrame;

use super::{MessageType, WireMessage};

const IDENTITY_LEN: usize = 13;
const RESERVED_LEN: usize = 3;

/// Device status.
///
/// Only `online` drives the capture loop. The identity block and the
/// trailing reserved bytes are carried verbatim.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusMessage {
    /// Device and firmware identity
    pub identity: [u8; IDENTITY_LEN],
    /// Device is connected to a running ECU
    pub online: bool,
    pub sectors_read: u32,
    pub sectors_written: u32,
    pub sector_errors: u32,
    pub reserved: [u8; RESERVED_LEN],
    /// Device-side checksum byte
    pub checksum: u8,
}

impl StatusMessage {
    /// Synthetic status reporting an online device
    pub fn online() -> Self {
        Self {
            online: true,
            ..Default::default()
        }
    }
}

impl Record for StatusMessage {
    const SCHEMA: &'static [Field] = &[
        Field::new("identity", FieldType::Bytes(IDENTITY_LEN)),
        Field::new("online", FieldType::Bool),
        Field::new("sectors_read", FieldType::U32),
        Field::new("sectors_written", FieldType::U32),
        Field::new("sector_errors", FieldType::U32),
        Field::new("reserved", FieldType::Bytes(RESERVED_LEN)),
        Field::new("checksum", FieldType::U8),
    ];

    fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
        w.put_bytes(&self.identity)?;
        w.put_bool(self.online)?;
        w.put_u32(self.sectors_read)?;
        w.put_u32(self.sectors_written)?;
        w.put_u32(self.sector_errors)?;
        w.put_bytes(&self.reserved)?;
        w.put_u8(self.checksum)
    }

    fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
        Ok(Self {
            identity: r.get_bytes()?,
            online: r.get_bool()?,
            sectors_read: r.get_u32()?,
            sectors_written: r.get_u32()?,
            sector_errors: r.get_u32()?,
            reserved: r.get_bytes()?,
            checksum: r.get_u8()?,
        })
    }
}

impl WireMessage for StatusMessage {
    const TYPE: MessageType = MessageType::Status;

    fn from_frame(_frame: &DatalogFrame) -> Self {
        Self::online()
    }

    fn apply_to(&self, frame: &DatalogFrame) -> DatalogFrame {
        frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    #[test]
    fn test_online_flag_offset() {
        let bytes = encode(&StatusMessage::online()).unwrap();
        assert_eq!(bytes.len(), 30);
        assert_eq!(bytes[13], 1);

        let mut offline = bytes.clone();
        offline[13] = 0;
        assert!(!decode::<StatusMessage>(&offline).unwrap().online);
    }
}
