//! Packet encoding/decoding
//!
//! Every message travels in the same envelope, in both directions:
//! - 1 byte: message type code
//! - 1 byte: payload length
//! - N bytes: payload
//! - 1 byte: checksum, chosen so that all bytes sum to 0 mod 256
//!
//! Received checksums are checked but not enforced; the device is known to
//! send datalog frames that do not sum correctly.

use tracing::warn;

use super::{ProtocolError, FRAME_OVERHEAD};
use crate::message::{Message, MessageType};

/// A framed protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw type code
    pub message_type: u8,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Checksum byte as sent or received
    pub checksum: u8,
}

impl Packet {
    /// Frame `payload` with a valid checksum
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        let checksum = frame_checksum(message_type.id(), &payload);
        Self {
            message_type: message_type.id(),
            payload,
            checksum,
        }
    }

    /// Frame an encoded message
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        Ok(Self::new(message.message_type(), message.encode()?))
    }

    /// Decode a packet from raw bytes.
    ///
    /// A checksum mismatch is logged and the packet is returned anyway; use
    /// [`Packet::is_checksum_valid`] to inspect it.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < FRAME_OVERHEAD {
            return Err(ProtocolError::ShortRead {
                expected: FRAME_OVERHEAD,
                actual: data.len(),
            });
        }

        let message_type = data[0];
        let length = data[1] as usize;
        let expected = length + FRAME_OVERHEAD;
        if data.len() < expected {
            return Err(ProtocolError::ShortRead {
                expected,
                actual: data.len(),
            });
        }

        let packet = Self {
            message_type,
            payload: data[2..2 + length].to_vec(),
            checksum: data[2 + length],
        };

        if !packet.is_checksum_valid() {
            warn!(
                "Checksum mismatch on type 0x{:02X}: byte sum is 0x{:02X}",
                message_type,
                checksum(&data[..expected])
            );
        }

        Ok(packet)
    }

    /// Encode the packet to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.push(self.message_type);
        bytes.push(self.payload.len() as u8);
        bytes.extend_from_slice(&self.payload);
        bytes.push(self.checksum);
        bytes
    }

    /// All bytes of the frame sum to zero mod 256
    pub fn is_checksum_valid(&self) -> bool {
        frame_checksum(self.message_type, &self.payload) == self.checksum
    }

    /// Known message type, if any
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_id(self.message_type)
    }

    /// Decode the payload according to the type byte
    pub fn decode(&self) -> Result<Message, ProtocolError> {
        let message_type = self
            .kind()
            .ok_or(ProtocolError::UnknownMessageType(self.message_type))?;
        Ok(Message::decode(message_type, &self.payload)?)
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }
}

/// Unsigned byte sum mod 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Checksum byte that makes `[type][len][payload][checksum]` sum to zero
pub fn frame_checksum(message_type: u8, payload: &[u8]) -> u8 {
    let sum = message_type
        .wrapping_add(payload.len() as u8)
        .wrapping_add(checksum(payload));
    sum.wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_roundtrip() {
        let original = Packet::new(MessageType::Datalog2, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let encoded = original.to_bytes();
        assert_eq!(encoded.len(), 12);
        assert_eq!(&encoded[..2], &[0x61, 9]);

        let decoded = Packet::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert!(decoded.is_checksum_valid());
    }

    #[test]
    fn test_checksum_sums_to_zero() {
        let packet = Packet::new(MessageType::Status, vec![0xFF; 30]);
        assert_eq!(checksum(&packet.to_bytes()), 0);
    }

    #[test]
    fn test_bad_checksum_is_lenient() {
        let mut encoded = Packet::new(MessageType::Datalog2, vec![0; 9]).to_bytes();
        encoded[4] ^= 0x10;

        let decoded = Packet::from_bytes(&encoded).unwrap();
        assert!(!decoded.is_checksum_valid());
        assert_eq!(decoded.payload[2], 0x10);
    }

    #[test]
    fn test_truncated_frame() {
        let encoded = Packet::new(MessageType::Datalog2, vec![0; 9]).to_bytes();
        match Packet::from_bytes(&encoded[..7]) {
            Err(ProtocolError::ShortRead { expected, actual }) => {
                assert_eq!((expected, actual), (12, 7));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type() {
        let packet = Packet::from_bytes(&[0x41, 0, 0xBF]).unwrap();
        assert!(packet.is_checksum_valid());
        assert!(matches!(
            packet.decode(),
            Err(ProtocolError::UnknownMessageType(0x41))
        ));
    }
}
