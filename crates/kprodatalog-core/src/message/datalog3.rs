//! Datalog3 message (0x62): diagnostics

use crate::codec::{Field, FieldType, Record, RecordReader, RecordWriter, SchemaError};
use crate::frame::{DatalogFrame, DIAGNOSTIC_CODES_LEN};

use super::{MessageType, WireMessage};

/// Raw Datalog3 payload, 22 bytes. Every field is copied straight through.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Datalog3Message {
    pub diagnostics1: u8,
    pub diagnostics2: u8,
    /// Active diagnostic trouble codes
    pub diagnostic_codes: [u8; DIAGNOSTIC_CODES_LEN],
}

impl Record for Datalog3Message {
    const SCHEMA: &'static [Field] = &[
        Field::new("diagnostics1", FieldType::U8),
        Field::new("diagnostics2", FieldType::U8),
        Field::new("diagnostic_codes", FieldType::Bytes(DIAGNOSTIC_CODES_LEN)),
    ];

    fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
        w.put_u8(self.diagnostics1)?;
        w.put_u8(self.diagnostics2)?;
        w.put_bytes(&self.diagnostic_codes)
    }

    fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
        Ok(Self {
            diagnostics1: r.get_u8()?,
            diagnostics2: r.get_u8()?,
            diagnostic_codes: r.get_bytes()?,
        })
    }
}

impl WireMessage for Datalog3Message {
    const TYPE: MessageType = MessageType::Datalog3;

    fn from_frame(frame: &DatalogFrame) -> Self {
        Self {
            diagnostics1: frame.diagnostics1,
            diagnostics2: frame.diagnostics2,
            diagnostic_codes: frame.diagnostic_codes,
        }
    }

    fn apply_to(&self, frame: &DatalogFrame) -> DatalogFrame {
        DatalogFrame {
            diagnostics1: self.diagnostics1,
            diagnostics2: self.diagnostics2,
            diagnostic_codes: self.diagnostic_codes,
            ..frame.clone()
        }
    }
}
