//! Fixed-Layout Record Codec
//!
//! Transcodes records to and from little-endian byte buffers of a known size.
//!
//! Every record type declares its layout as an ordered, compile-time list of
//! [`Field`] descriptors. [`RecordWriter`] and [`RecordReader`] walk that list
//! one field at a time and refuse any access that disagrees with it, so a
//! record whose `encode_fields`/`decode_fields` drift from its schema fails
//! with a [`SchemaError`] instead of silently shifting every later offset.
//!
//! The codec knows nothing about message types or checksums. The same
//! machinery lays out the `.kdl` frame store and the wire payloads.

mod error;

pub use error::SchemaError;

use byteorder::{ByteOrder, LittleEndian};

/// Semantic type and width of a single record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer
    U64,
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    F64,
    /// Boolean stored as a single byte
    Bool,
    /// Fixed-size opaque byte block
    Bytes(usize),
}

impl FieldType {
    /// Width of the field in bytes
    pub const fn size_bytes(&self) -> usize {
        match *self {
            FieldType::I8 | FieldType::U8 | FieldType::Bool => 1,
            FieldType::I16 | FieldType::U16 => 2,
            FieldType::I32 | FieldType::U32 | FieldType::F32 => 4,
            FieldType::I64 | FieldType::U64 | FieldType::F64 => 8,
            FieldType::Bytes(n) => n,
        }
    }
}

/// A named field descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name, used in error reports
    pub name: &'static str,
    /// Field type and width
    pub ty: FieldType,
}

impl Field {
    /// Create a field descriptor
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// Total encoded width of a schema
pub const fn schema_size(fields: &[Field]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < fields.len() {
        total += fields[i].ty.size_bytes();
        i += 1;
    }
    total
}

/// A record with a fixed little-endian layout
pub trait Record: Sized {
    /// Ordered field layout
    const SCHEMA: &'static [Field];

    /// Encoded size in bytes
    const SIZE: usize = schema_size(Self::SCHEMA);

    /// Write every field, in schema order
    fn encode_fields(&self, writer: &mut RecordWriter<'_>) -> Result<(), SchemaError>;

    /// Read every field, in schema order
    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self, SchemaError>;
}

/// Encode a record into a freshly allocated buffer of exactly `R::SIZE` bytes
pub fn encode<R: Record>(record: &R) -> Result<Vec<u8>, SchemaError> {
    let mut buf = vec![0u8; R::SIZE];
    encode_into(record, &mut buf)?;
    Ok(buf)
}

/// Encode a record into `buf`, which must be exactly `R::SIZE` bytes
pub fn encode_into<R: Record>(record: &R, buf: &mut [u8]) -> Result<(), SchemaError> {
    if buf.len() != R::SIZE {
        return Err(SchemaError::LengthMismatch {
            expected: R::SIZE,
            actual: buf.len(),
        });
    }

    let mut writer = RecordWriter::new(R::SCHEMA, buf);
    record.encode_fields(&mut writer)?;
    writer.finish()
}

/// Decode a record from a buffer of exactly `R::SIZE` bytes
pub fn decode<R: Record>(bytes: &[u8]) -> Result<R, SchemaError> {
    if bytes.len() != R::SIZE {
        return Err(SchemaError::LengthMismatch {
            expected: R::SIZE,
            actual: bytes.len(),
        });
    }

    let mut reader = RecordReader::new(R::SCHEMA, bytes);
    let record = R::decode_fields(&mut reader)?;
    reader.finish()?;
    Ok(record)
}

/// Check a requested access against the declared field type
fn check_field(field: &Field, requested: FieldType) -> Result<(), SchemaError> {
    match (field.ty, requested) {
        (FieldType::Bytes(expected), FieldType::Bytes(actual)) if expected != actual => {
            Err(SchemaError::BlockSizeMismatch {
                field: field.name,
                expected,
                actual,
            })
        }
        (declared, requested) if declared != requested => Err(SchemaError::FieldTypeMismatch {
            field: field.name,
            expected: declared,
            actual: requested,
        }),
        _ => Ok(()),
    }
}

/// Sequential, schema-checked field writer
pub struct RecordWriter<'a> {
    schema: &'static [Field],
    buf: &'a mut [u8],
    index: usize,
    offset: usize,
}

impl<'a> RecordWriter<'a> {
    fn new(schema: &'static [Field], buf: &'a mut [u8]) -> Self {
        Self {
            schema,
            buf,
            index: 0,
            offset: 0,
        }
    }

    /// Claim the next field's byte range
    fn slot(&mut self, requested: FieldType) -> Result<&mut [u8], SchemaError> {
        let field = self
            .schema
            .get(self.index)
            .ok_or(SchemaError::SchemaOverrun {
                declared: self.schema.len(),
            })?;
        check_field(field, requested)?;

        let start = self.offset;
        let end = start + field.ty.size_bytes();
        self.index += 1;
        self.offset = end;
        Ok(&mut self.buf[start..end])
    }

    pub fn put_i8(&mut self, value: i8) -> Result<(), SchemaError> {
        self.slot(FieldType::I8)?[0] = value as u8;
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), SchemaError> {
        self.slot(FieldType::U8)?[0] = value;
        Ok(())
    }

    pub fn put_i16(&mut self, value: i16) -> Result<(), SchemaError> {
        LittleEndian::write_i16(self.slot(FieldType::I16)?, value);
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), SchemaError> {
        LittleEndian::write_u16(self.slot(FieldType::U16)?, value);
        Ok(())
    }

    pub fn put_i32(&mut self, value: i32) -> Result<(), SchemaError> {
        LittleEndian::write_i32(self.slot(FieldType::I32)?, value);
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), SchemaError> {
        LittleEndian::write_u32(self.slot(FieldType::U32)?, value);
        Ok(())
    }

    pub fn put_i64(&mut self, value: i64) -> Result<(), SchemaError> {
        LittleEndian::write_i64(self.slot(FieldType::I64)?, value);
        Ok(())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<(), SchemaError> {
        LittleEndian::write_u64(self.slot(FieldType::U64)?, value);
        Ok(())
    }

    pub fn put_f32(&mut self, value: f32) -> Result<(), SchemaError> {
        LittleEndian::write_f32(self.slot(FieldType::F32)?, value);
        Ok(())
    }

    pub fn put_f64(&mut self, value: f64) -> Result<(), SchemaError> {
        LittleEndian::write_f64(self.slot(FieldType::F64)?, value);
        Ok(())
    }

    /// Booleans are written as 0 or 1
    pub fn put_bool(&mut self, value: bool) -> Result<(), SchemaError> {
        self.slot(FieldType::Bool)?[0] = u8::from(value);
        Ok(())
    }

    /// Write a byte block; its length must equal the declared width
    pub fn put_bytes(&mut self, value: &[u8]) -> Result<(), SchemaError> {
        self.slot(FieldType::Bytes(value.len()))?
            .copy_from_slice(value);
        Ok(())
    }

    fn finish(self) -> Result<(), SchemaError> {
        if self.index != self.schema.len() {
            return Err(SchemaError::SchemaUnderrun {
                accessed: self.index,
                declared: self.schema.len(),
            });
        }
        Ok(())
    }
}

/// Sequential, schema-checked field reader
pub struct RecordReader<'a> {
    schema: &'static [Field],
    buf: &'a [u8],
    index: usize,
    offset: usize,
}

impl<'a> RecordReader<'a> {
    fn new(schema: &'static [Field], buf: &'a [u8]) -> Self {
        Self {
            schema,
            buf,
            index: 0,
            offset: 0,
        }
    }

    fn slot(&mut self, requested: FieldType) -> Result<&'a [u8], SchemaError> {
        let field = self
            .schema
            .get(self.index)
            .ok_or(SchemaError::SchemaOverrun {
                declared: self.schema.len(),
            })?;
        check_field(field, requested)?;

        let start = self.offset;
        let end = start + field.ty.size_bytes();
        self.index += 1;
        self.offset = end;
        let buf = self.buf;
        Ok(&buf[start..end])
    }

    pub fn get_i8(&mut self) -> Result<i8, SchemaError> {
        Ok(self.slot(FieldType::I8)?[0] as i8)
    }

    pub fn get_u8(&mut self) -> Result<u8, SchemaError> {
        Ok(self.slot(FieldType::U8)?[0])
    }

    pub fn get_i16(&mut self) -> Result<i16, SchemaError> {
        Ok(LittleEndian::read_i16(self.slot(FieldType::I16)?))
    }

    pub fn get_u16(&mut self) -> Result<u16, SchemaError> {
        Ok(LittleEndian::read_u16(self.slot(FieldType::U16)?))
    }

    pub fn get_i32(&mut self) -> Result<i32, SchemaError> {
        Ok(LittleEndian::read_i32(self.slot(FieldType::I32)?))
    }

    pub fn get_u32(&mut self) -> Result<u32, SchemaError> {
        Ok(LittleEndian::read_u32(self.slot(FieldType::U32)?))
    }

    pub fn get_i64(&mut self) -> Result<i64, SchemaError> {
        Ok(LittleEndian::read_i64(self.slot(FieldType::I64)?))
    }

    pub fn get_u64(&mut self) -> Result<u64, SchemaError> {
        Ok(LittleEndian::read_u64(self.slot(FieldType::U64)?))
    }

    pub fn get_f32(&mut self) -> Result<f32, SchemaError> {
        Ok(LittleEndian::read_f32(self.slot(FieldType::F32)?))
    }

    pub fn get_f64(&mut self) -> Result<f64, SchemaError> {
        Ok(LittleEndian::read_f64(self.slot(FieldType::F64)?))
    }

    /// Any nonzero byte reads as `true`
    pub fn get_bool(&mut self) -> Result<bool, SchemaError> {
        Ok(self.slot(FieldType::Bool)?[0] != 0)
    }

    /// Read a byte block of exactly `N` bytes
    pub fn get_bytes<const N: usize>(&mut self) -> Result<[u8; N], SchemaError> {
        let mut block = [0u8; N];
        block.copy_from_slice(self.slot(FieldType::Bytes(N))?);
        Ok(block)
    }

    fn finish(self) -> Result<(), SchemaError> {
        if self.index != self.schema.len() {
            return Err(SchemaError::SchemaUnderrun {
                accessed: self.index,
                declared: self.schema.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        id: u16,
        enabled: bool,
        level: f64,
        tag: [u8; 3],
    }

    impl Record for Sample {
        const SCHEMA: &'static [Field] = &[
            Field::new("id", FieldType::U16),
            Field::new("enabled", FieldType::Bool),
            Field::new("level", FieldType::F64),
            Field::new("tag", FieldType::Bytes(3)),
        ];

        fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
            w.put_u16(self.id)?;
            w.put_bool(self.enabled)?;
            w.put_f64(self.level)?;
            w.put_bytes(&self.tag)
        }

        fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
            Ok(Self {
                id: r.get_u16()?,
                enabled: r.get_bool()?,
                level: r.get_f64()?,
                tag: r.get_bytes()?,
            })
        }
    }

    /// Writes its block with the wrong width
    #[derive(Debug)]
    struct BadBlock;

    impl Record for BadBlock {
        const SCHEMA: &'static [Field] = &[Field::new("block", FieldType::Bytes(4))];

        fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
            w.put_bytes(&[1, 2, 3])
        }

        fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
            r.get_bytes::<4>()?;
            Ok(BadBlock)
        }
    }

    /// Forgets its last field
    #[derive(Debug)]
    struct Incomplete;

    impl Record for Incomplete {
        const SCHEMA: &'static [Field] = &[
            Field::new("a", FieldType::U8),
            Field::new("b", FieldType::U8),
        ];

        fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
            w.put_u8(1)
        }

        fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
            r.get_u8()?;
            Ok(Incomplete)
        }
    }

    #[test]
    fn test_schema_size() {
        assert_eq!(Sample::SIZE, 2 + 1 + 8 + 3);
    }

    #[test]
    fn test_little_endian_layout() {
        let sample = Sample {
            id: 0x1234,
            enabled: true,
            level: 1.0,
            tag: *b"abc",
        };
        let bytes = encode(&sample).unwrap();

        assert_eq!(&bytes[0..2], &[0x34, 0x12]);
        assert_eq!(bytes[2], 1);
        assert_eq!(&bytes[3..11], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[11..14], b"abc");
        assert_eq!(decode::<Sample>(&bytes).unwrap(), sample);
    }

    #[test]
    fn test_nonzero_bool_is_true() {
        let mut bytes = vec![0u8; Sample::SIZE];
        bytes[2] = 0x7F;
        assert!(decode::<Sample>(&bytes).unwrap().enabled);
    }

    #[test]
    fn test_wrong_buffer_length() {
        let err = decode::<Sample>(&[0u8; 5]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::LengthMismatch {
                expected: 14,
                actual: 5
            }
        );
    }

    #[test]
    fn test_block_width_mismatch() {
        let err = encode(&BadBlock).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::BlockSizeMismatch {
                field: "block",
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_incomplete_record() {
        assert!(matches!(
            encode(&Incomplete).unwrap_err(),
            SchemaError::SchemaUnderrun {
                accessed: 1,
                declared: 2
            }
        ));
        assert!(matches!(
            decode::<Incomplete>(&[0, 0]).unwrap_err(),
            SchemaError::SchemaUnderrun { .. }
        ));
    }
}
