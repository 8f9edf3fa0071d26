//! Wire Message Catalog
//!
//! The four fixed-size payloads exchanged with the KPro device, and the
//! mapping between each payload's raw fields and the composite
//! [`DatalogFrame`].
//!
//! | Type     | Id   | Payload | Owns                                   |
//! |----------|------|---------|----------------------------------------|
//! | Status   | 0x40 | 30      | device identity, online flag           |
//! | Datalog1 | 0x60 | 45      | high-rate engine parameters            |
//! | Datalog2 | 0x61 | 9       | temperatures, voltage, trims, fuel     |
//! | Datalog3 | 0x62 | 22      | diagnostic flags and codes             |

mod datalog1;
mod datalog2;
mod datalog3;
mod status;

pub use datalog1::Datalog1Message;
pub use datalog2::Datalog2Message;
pub use datalog3::Datalog3Message;
pub use status::StatusMessage;

pub mod flags {
    //! Bit assignments inside Datalog1 status bytes

    pub use super::datalog1::{
        DATALOGGING_ACTIVE, N2O_1_ARM, N2O_1_ON, N2O_2_ARM, N2O_2_ON, N2O_3_ARM, N2O_3_ON,
        SW_ACCL, SW_ACSW, SW_BKSW, SW_EPS, SW_FANC, SW_FLR, SW_RVSLCK, SW_SCS, SW_VTP, SW_VTS,
    };
}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{self, Record, SchemaError};
use crate::frame::DatalogFrame;
use crate::protocol::FRAME_OVERHEAD;

/// Message type codes, as sent in poll requests and response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Device status and online flag
    Status = 0x40,
    /// High-rate engine parameters
    Datalog1 = 0x60,
    /// Temperatures, voltage, trims
    Datalog2 = 0x61,
    /// Diagnostic codes
    Datalog3 = 0x62,
}

impl MessageType {
    /// Order in which a capture pass visits the message types
    pub const POLL_ORDER: [MessageType; 4] = [
        MessageType::Status,
        MessageType::Datalog1,
        MessageType::Datalog2,
        MessageType::Datalog3,
    ];

    /// Wire type code
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look up a type code
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x40 => Some(MessageType::Status),
            0x60 => Some(MessageType::Datalog1),
            0x61 => Some(MessageType::Datalog2),
            0x62 => Some(MessageType::Datalog3),
            _ => None,
        }
    }

    /// Declared payload size in bytes
    pub fn payload_size(self) -> usize {
        match self {
            MessageType::Status => StatusMessage::SIZE,
            MessageType::Datalog1 => Datalog1Message::SIZE,
            MessageType::Datalog2 => Datalog2Message::SIZE,
            MessageType::Datalog3 => Datalog3Message::SIZE,
        }
    }

    /// Size of the framed message: type, length, payload, checksum
    pub fn frame_size(self) -> usize {
        self.payload_size() + FRAME_OVERHEAD
    }

    /// Datalog messages are only polled once the device reports online
    pub fn requires_online(self) -> bool {
        !matches!(self, MessageType::Status)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Status => "Status",
            MessageType::Datalog1 => "Datalog1",
            MessageType::Datalog2 => "Datalog2",
            MessageType::Datalog3 => "Datalog3",
        };
        write!(f, "{} (0x{:02X})", name, self.id())
    }
}

/// A payload that maps to and from the composite frame
pub trait WireMessage: Record {
    /// Type code this payload travels under
    const TYPE: MessageType;

    /// Derive the payload from a stored frame
    fn from_frame(frame: &DatalogFrame) -> Self;

    /// Return `frame` with the fields this message owns overwritten
    fn apply_to(&self, frame: &DatalogFrame) -> DatalogFrame;
}

/// Any decoded wire payload
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Status(StatusMessage),
    Datalog1(Datalog1Message),
    Datalog2(Datalog2Message),
    Datalog3(Datalog3Message),
}

impl Message {
    /// Type code of the wrapped payload
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Status(_) => MessageType::Status,
            Message::Datalog1(_) => MessageType::Datalog1,
            Message::Datalog2(_) => MessageType::Datalog2,
            Message::Datalog3(_) => MessageType::Datalog3,
        }
    }

    /// Decode a payload of the given type. `payload` must be exactly the
    /// declared size.
    pub fn decode(message_type: MessageType, payload: &[u8]) -> Result<Self, SchemaError> {
        Ok(match message_type {
            MessageType::Status => Message::Status(codec::decode(payload)?),
            MessageType::Datalog1 => Message::Datalog1(codec::decode(payload)?),
            MessageType::Datalog2 => Message::Datalog2(codec::decode(payload)?),
            MessageType::Datalog3 => Message::Datalog3(codec::decode(payload)?),
        })
    }

    /// Encode the payload bytes (without framing)
    pub fn encode(&self) -> Result<Vec<u8>, SchemaError> {
        match self {
            Message::Status(m) => codec::encode(m),
            Message::Datalog1(m) => codec::encode(m),
            Message::Datalog2(m) => codec::encode(m),
            Message::Datalog3(m) => codec::encode(m),
        }
    }

    /// The response a device would give to a poll for `message_type` while
    /// showing `frame`. Status answers are always "online".
    pub fn for_request(message_type: MessageType, frame: &DatalogFrame) -> Self {
        match message_type {
            MessageType::Status => Message::Status(StatusMessage::online()),
            MessageType::Datalog1 => Message::Datalog1(Datalog1Message::from_frame(frame)),
            MessageType::Datalog2 => Message::Datalog2(Datalog2Message::from_frame(frame)),
            MessageType::Datalog3 => Message::Datalog3(Datalog3Message::from_frame(frame)),
        }
    }

    /// Partial update of `frame`; Status leaves the frame untouched
    pub fn apply_to(&self, frame: &DatalogFrame) -> DatalogFrame {
        match self {
            Message::Status(m) => m.apply_to(frame),
            Message::Datalog1(m) => m.apply_to(frame),
            Message::Datalog2(m) => m.apply_to(frame),
            Message::Datalog3(m) => m.apply_to(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_sizes() {
        assert_eq!(MessageType::Status.payload_size(), 30);
        assert_eq!(MessageType::Datalog1.payload_size(), 45);
        assert_eq!(MessageType::Datalog2.payload_size(), 9);
        assert_eq!(MessageType::Datalog3.payload_size(), 22);
        assert_eq!(MessageType::Datalog1.frame_size(), 48);
    }

    #[test]
    fn test_type_ids() {
        for message_type in MessageType::POLL_ORDER {
            assert_eq!(MessageType::from_id(message_type.id()), Some(message_type));
        }
        assert_eq!(MessageType::from_id(0x41), None);
        assert_eq!(MessageType::Datalog2.to_string(), "Datalog2 (0x61)");
    }

    #[test]
    fn test_online_gate() {
        assert!(!MessageType::Status.requires_online());
        assert!(MessageType::Datalog1.requires_online());
        assert!(MessageType::Datalog3.requires_online());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = Message::decode(MessageType::Datalog2, &[0u8; 8]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::LengthMismatch {
                expected: 9,
                actual: 8
            }
        );
    }

    #[test]
    fn test_status_request_is_online() {
        let message = Message::for_request(MessageType::Status, &DatalogFrame::default());
        match message {
            Message::Status(status) => assert!(status.online),
            other => panic!("unexpected {:?}", other),
        }
    }
}
