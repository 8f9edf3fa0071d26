//! Datalog2 message (0x61): temperatures, supply voltage, long term trim

use crate::codec::{Field, FieldType, Record, RecordReader, RecordWriter, SchemaError};
use crate::conversion::{
    ect_from_raw, ect_to_raw, iat_from_raw, iat_to_raw, raw_u8, round, trim_from_raw, trim_to_raw,
};
use crate::frame::DatalogFrame;

use super::{MessageType, WireMessage};

const VLT_SCALE: f64 = 0.1;
const ELD_SCALE: f64 = 0.390625;
const ELD_OFFSET: f64 = 196.0;
const AAP_SCALE: f64 = 0.01;
const RTP_SCALE: f64 = 0.0006529;
const RTP_OFFSET: f64 = 128.0;

/// Raw Datalog2 payload, 9 bytes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Datalog2Message {
    /// Coolant temperature curve → °C
    pub ect: u8,
    /// Intake air temperature curve → °C
    pub iat: u8,
    /// × 0.1 → V
    pub vlt: u8,
    /// −(raw − 196) × 0.390625 → A
    pub eld: u8,
    /// × 0.01 → kPa
    pub aap: u8,
    /// (raw − 128) × 0.0006529
    pub rtp: u8,
    /// Long term trim, (raw − 128) × 0.78125 → %
    pub ltt: u8,
    /// Fuel system status
    pub fst: u8,
    pub reserved: u8,
}

impl Record for Datalog2Message {
    const SCHEMA: &'static [Field] = &[
        Field::new("ect", FieldType::U8),
        Field::new("iat", FieldType::U8),
        Field::new("vlt", FieldType::U8),
        Field::new("eld", FieldType::U8),
        Field::new("aap", FieldType::U8),
        Field::new("rtp", FieldType::U8),
        Field::new("ltt", FieldType::U8),
        Field::new("fst", FieldType::U8),
        Field::new("reserved", FieldType::U8),
    ];

    fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
        w.put_u8(self.ect)?;
        w.put_u8(self.iat)?;
        w.put_u8(self.vlt)?;
        w.put_u8(self.eld)?;
        w.put_u8(self.aap)?;
        w.put_u8(self.rtp)?;
        w.put_u8(self.ltt)?;
        w.put_u8(self.fst)?;
        w.put_u8(self.reserved)
    }

    fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
        Ok(Self {
            ect: r.get_u8()?,
            iat: r.get_u8()?,
            vlt: r.get_u8()?,
            eld: r.get_u8()?,
            aap: r.get_u8()?,
            rtp: r.get_u8()?,
            ltt: r.get_u8()?,
            fst: r.get_u8()?,
            reserved: r.get_u8()?,
        })
    }
}

impl WireMessage for Datalog2Message {
    const TYPE: MessageType = MessageType::Datalog2;

    fn from_frame(frame: &DatalogFrame) -> Self {
        Self {
            ect: ect_to_raw(frame.ect),
            iat: iat_to_raw(frame.iat),
            vlt: raw_u8(frame.battery_voltage / VLT_SCALE),
            eld: raw_u8(-frame.eld_amps / ELD_SCALE + ELD_OFFSET),
            aap: raw_u8(frame.aap / AAP_SCALE),
            rtp: raw_u8(frame.rtp / RTP_SCALE + RTP_OFFSET),
            ltt: trim_to_raw(frame.long_term_trim),
            fst: frame.fuel_status as u8,
            reserved: 0,
        }
    }

    fn apply_to(&self, frame: &DatalogFrame) -> DatalogFrame {
        DatalogFrame {
            ect: ect_from_raw(self.ect),
            iat: iat_from_raw(self.iat),
            battery_voltage: round(self.vlt as f64 * VLT_SCALE, 5),
            eld_amps: -(self.eld as f64 - ELD_OFFSET) * ELD_SCALE,
            aap: self.aap as f64 * AAP_SCALE,
            rtp: (self.rtp as f64 - RTP_OFFSET) * RTP_SCALE,
            long_term_trim: trim_from_raw(self.ltt),
            fuel_status: self.fst as i32,
            ..frame.clone()
        }
    }
}
