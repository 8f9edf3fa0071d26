//! Frame Store Format
//!
//! KManager-compatible `.kdl` datalog files:
//! - 154-byte header starting with the ASCII magic `KFLASH`
//! - `number_of_frames` × 336-byte frames, back to back
//!
//! All values little-endian. Files are written in one go at the end of a
//! capture and read sequentially during replay.

use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::codec::{self, Field, FieldType, Record, RecordReader, RecordWriter, SchemaError};
use crate::frame::{DatalogFrame, FRAME_SIZE};

/// File magic
pub const MAGIC: [u8; 6] = *b"KFLASH";

/// Serialized header size
pub const HEADER_SIZE: usize = 154;

const HEADER_RESERVED_LEN: usize = 128;

/// Errors reading or writing a frame store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Not a KFLASH datalog (magic {0:02X?})")]
    BadMagic([u8; 6]),

    #[error("Frame size mismatch: expected {expected}, header declares {actual}")]
    FrameSizeMismatch { expected: usize, actual: i32 },

    #[error("Invalid frame count: {0}")]
    InvalidFrameCount(i64),

    #[error("Truncated datalog: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Datalog file header
#[derive(Debug, Clone, PartialEq)]
pub struct DatalogHeader {
    /// Always `KFLASH`
    pub id: [u8; 6],
    pub number_of_frames: i32,
    /// Bytes per frame, always 336
    pub data_frame_size: i32,
    pub unknown1: i16,
    pub unknown2: i32,
    pub unknown3: i16,
    /// Capture length
    pub duration_ms: i32,
    pub unknown4: [u8; HEADER_RESERVED_LEN],
}

impl DatalogHeader {
    /// Header for a capture of `number_of_frames` frames
    pub fn new(number_of_frames: i32, duration_ms: i32) -> Self {
        Self {
            number_of_frames,
            duration_ms,
            ..Default::default()
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.max(0) as u64)
    }

    /// Check magic, frame size and frame count
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id != MAGIC {
            return Err(StoreError::BadMagic(self.id));
        }
        if self.data_frame_size != FRAME_SIZE as i32 {
            return Err(StoreError::FrameSizeMismatch {
                expected: FRAME_SIZE,
                actual: self.data_frame_size,
            });
        }
        if self.number_of_frames < 0 {
            return Err(StoreError::InvalidFrameCount(self.number_of_frames as i64));
        }
        Ok(())
    }
}

impl Default for DatalogHeader {
    fn default() -> Self {
        Self {
            id: MAGIC,
            number_of_frames: 0,
            data_frame_size: FRAME_SIZE as i32,
            unknown1: 0,
            unknown2: 0,
            unknown3: 0,
            duration_ms: 0,
            unknown4: [0; HEADER_RESERVED_LEN],
        }
    }
}

impl Record for DatalogHeader {
    const SCHEMA: &'static [Field] = &[
        Field::new("id", FieldType::Bytes(6)),
        Field::new("number_of_frames", FieldType::I32),
        Field::new("data_frame_size", FieldType::I32),
        Field::new("unknown1", FieldType::I16),
        Field::new("unknown2", FieldType::I32),
        Field::new("unknown3", FieldType::I16),
        Field::new("duration_ms", FieldType::I32),
        Field::new("unknown4", FieldType::Bytes(HEADER_RESERVED_LEN)),
    ];

    fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
        w.put_bytes(&self.id)?;
        w.put_i32(self.number_of_frames)?;
        w.put_i32(self.data_frame_size)?;
        w.put_i16(self.unknown1)?;
        w.put_i32(self.unknown2)?;
        w.put_i16(self.unknown3)?;
        w.put_i32(self.duration_ms)?;
        w.put_bytes(&self.unknown4)
    }

    fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
        Ok(Self {
            id: r.get_bytes()?,
            number_of_frames: r.get_i32()?,
            data_frame_size: r.get_i32()?,
            unknown1: r.get_i16()?,
            unknown2: r.get_i32()?,
            unknown3: r.get_i16()?,
            duration_ms: r.get_i32()?,
            unknown4: r.get_bytes()?,
        })
    }
}

/// Write a complete datalog: header, then every frame in order
pub fn write_frame_store<W: Write>(
    sink: &mut W,
    frames: &[DatalogFrame],
    duration: Duration,
) -> Result<(), StoreError> {
    let number_of_frames = i32::try_from(frames.len())
        .map_err(|_| StoreError::InvalidFrameCount(frames.len() as i64))?;
    let duration_ms = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
    let header = DatalogHeader::new(number_of_frames, duration_ms);

    sink.write_all(&codec::encode(&header)?)?;

    let mut buf = [0u8; FRAME_SIZE];
    for frame in frames {
        codec::encode_into(frame, &mut buf)?;
        sink.write_all(&buf)?;
    }
    sink.flush()?;

    debug!(
        "Wrote {} frames ({} ms) to datalog",
        number_of_frames, duration_ms
    );
    Ok(())
}

/// Sequential reader over a stored datalog
pub struct FrameStoreReader<R: Read> {
    source: R,
    header: DatalogHeader,
    frames_read: usize,
    failed: bool,
}

impl<R: Read> FrameStoreReader<R> {
    /// Read and validate the header
    pub fn open(mut source: R) -> Result<Self, StoreError> {
        let mut buf = [0u8; HEADER_SIZE];
        read_record(&mut source, &mut buf)?;
        let header: DatalogHeader = codec::decode(&buf)?;
        header.validate()?;

        debug!(
            "Opened datalog: {} frames, {} ms",
            header.number_of_frames, header.duration_ms
        );
        Ok(Self {
            source,
            header,
            frames_read: 0,
            failed: false,
        })
    }

    pub fn header(&self) -> &DatalogHeader {
        &self.header
    }

    /// Frames not yet read
    pub fn remaining(&self) -> usize {
        self.header.number_of_frames as usize - self.frames_read
    }

    /// Next frame, or `None` once the declared frame count has been read
    pub fn next_frame(&mut self) -> Result<Option<DatalogFrame>, StoreError> {
        if self.failed || self.remaining() == 0 {
            return Ok(None);
        }

        let mut buf = [0u8; FRAME_SIZE];
        let frame = read_record(&mut self.source, &mut buf)
            .and_then(|_| codec::decode::<DatalogFrame>(&buf).map_err(StoreError::from));
        match frame {
            Ok(frame) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

impl<R: Read> Iterator for FrameStoreReader<R> {
    type Item = Result<DatalogFrame, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Read a whole datalog into memory
pub fn read_frame_store<R: Read>(source: R) -> Result<(DatalogHeader, Vec<DatalogFrame>), StoreError> {
    let mut reader = FrameStoreReader::open(source)?;
    let mut frames = Vec::with_capacity(reader.remaining().min(4096));
    while let Some(frame) = reader.next_frame()? {
        frames.push(frame);
    }
    Ok((reader.header, frames))
}

/// Fill `buf` completely, reporting how far a short source got
fn read_record<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), StoreError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(StoreError::Truncated {
                    expected: buf.len(),
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
