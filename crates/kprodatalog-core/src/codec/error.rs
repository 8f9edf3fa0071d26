//! Schema errors

use thiserror::Error;

use super::FieldType;

/// Structural failures of the record codec.
///
/// These indicate that a record's schema and the code walking it disagree, or
/// that a buffer of the wrong size was handed to the codec. They are never
/// retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Record length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Field '{field}' is declared as {expected:?} but was accessed as {actual:?}")]
    FieldTypeMismatch {
        field: &'static str,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("Byte block '{field}' is declared as {expected} bytes but holds {actual}")]
    BlockSizeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Record accessed more fields than its schema declares ({declared})")]
    SchemaOverrun { declared: usize },

    #[error("Record accessed {accessed} of {declared} declared fields")]
    SchemaUnderrun { accessed: usize, declared: usize },
}
