//! Protocol errors

use thiserror::Error;

use crate::codec::SchemaError;
use crate::store::StoreError;

/// Errors that can occur while capturing from or replaying to a device
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Timed out waiting for the device")]
    Timeout,

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Unexpected response: polled 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedResponse { expected: u8, actual: u8 },

    #[error("Payload length mismatch for 0x{message_type:02X}: expected {expected}, got {actual}")]
    LengthMismatch {
        message_type: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown message type 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Frame store error: {0}")]
    Store(#[from] StoreError),
}

impl ProtocolError {
    /// Conditions the capture loop rides out by retrying on the next
    /// scheduled poll. Schema and store failures are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::Serial(_)
                | ProtocolError::Timeout
                | ProtocolError::ShortRead { .. }
                | ProtocolError::UnexpectedResponse { .. }
                | ProtocolError::LengthMismatch { .. }
                | ProtocolError::UnknownMessageType(_)
        )
    }

    /// Failures of the channel itself, which warrant a device reset
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, ProtocolError::Io(_) | ProtocolError::Serial(_))
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(err: serialport::Error) -> Self {
        ProtocolError::Serial(err.to_string())
    }
}
