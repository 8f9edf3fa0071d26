//! Composite Datalog Frame
//!
//! The engineering-unit snapshot of ECU state that each wire message updates
//! in part, and the record stored back to back in a `.kdl` file.
//!
//! Layout (336 bytes, little-endian): 8-byte fields sit on 8-byte
//! boundaries, with four zero `i32` padding slots filling the gaps. Padding
//! is not held in the struct; it is always written as zero and discarded on
//! read. The seven bytes after the datalogging flag are kept verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Field, FieldType, Record, RecordReader, RecordWriter, SchemaError};

/// Size of a serialized frame
pub const FRAME_SIZE: usize = 336;

/// Width of the diagnostic code block
pub const DIAGNOSTIC_CODES_LEN: usize = 20;

/// Width of the reserved tail after the last named field
pub const FRAME_TAIL_LEN: usize = 7;

/// One composite snapshot of ECU state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatalogFrame {
    /// Sequential frame number within a capture
    pub frame_number: i32,
    /// Milliseconds since capture start
    pub time_offset: i32,
    /// Crank speed (RPM)
    pub rpm: i32,
    /// Vehicle speed (km/h)
    pub speed: f64,
    /// Manifold absolute pressure (kPa)
    pub map: f64,
    /// Calculated load value (%)
    pub clv: f64,
    /// Throttle position (%)
    pub tps: f64,
    /// Cam angle (degrees)
    pub cam_angle: f64,
    /// Target cam angle (degrees)
    pub target_cam_angle: f64,
    /// Injector pulse width (ms)
    pub injector_duration: f64,
    /// Ignition advance (degrees BTDC)
    pub ignition: f64,
    /// Intake air temperature (°C)
    pub iat: f64,
    /// Engine coolant temperature (°C)
    pub ect: f64,
    pub unknown1: i32,
    pub unknown2: i32,
    pub unknown3: i32,
    pub unknown4: i32,
    pub unknown5: i32,
    /// Reverse lockout
    pub rvslck: u8,
    /// Brake switch
    pub bksw: u8,
    /// A/C switch
    pub acsw: u8,
    /// A/C clutch
    pub accl: u8,
    /// Starter cut
    pub scs: u8,
    /// Power steering pressure switch
    pub eps: u8,
    /// Fuel relay
    pub flr: u8,
    /// VTEC pressure switch
    pub vtp: u8,
    /// VTEC solenoid
    pub vtc: u8,
    /// Radiator fan
    pub fanc: u8,
    /// Check engine lamp
    pub mil: u8,
    pub blank_flag: u8,
    /// Primary O2 sensor (V)
    pub o2_voltage: f64,
    /// Primary O2 sensor current (mA)
    pub o2_ma: f64,
    /// Secondary O2 sensor (V)
    pub so2: f64,
    pub lambda: f64,
    pub target_lambda: f64,
    /// Short term fuel trim (%)
    pub short_term_trim: f64,
    /// Long term fuel trim (%)
    pub long_term_trim: f64,
    /// 1 = open loop cold, 2 = closed loop, 4 = open loop driving
    pub fuel_status: i32,
    /// Knock retard (degrees)
    pub knock_retard: f64,
    pub knock_level_volts: f64,
    pub knock_threshold_volts: f64,
    pub knock_count: i32,
    /// Atmospheric pressure (kPa)
    pub aap: f64,
    /// Relative tank pressure (kPa)
    pub rtp: f64,
    pub battery_voltage: f64,
    /// Electrical load detector (A)
    pub eld_amps: f64,
    pub n2o_arm1: u8,
    pub n2o_on1: u8,
    pub n2o_arm2: u8,
    pub n2o_on2: u8,
    pub n2o_arm3: u8,
    pub n2o_on3: u8,
    pub diagnostics1: u8,
    pub diagnostics2: u8,
    pub diagnostic_codes: [u8; DIAGNOSTIC_CODES_LEN],
    pub gear: i32,
    /// Boost controller duty (%)
    pub boost_controller_duty: f64,
    pub unknown7: i32,
    pub unknown8: f64,
    /// Secondary throttle position (%)
    pub tps2: f64,
    /// Electrical load detector (V)
    pub eld_voltage: f64,
    /// Onboard datalogging active
    pub datalogging: u8,
    pub reserved: [u8; FRAME_TAIL_LEN],
}

impl DatalogFrame {
    /// Serialized size in bytes
    pub const SIZE: usize = FRAME_SIZE;

    /// Stamp the frame with its sequence number and capture time offset
    pub fn with_sequence(mut self, frame_number: i32, time_offset: i32) -> Self {
        self.frame_number = frame_number;
        self.time_offset = time_offset;
        self
    }

    /// Single-line console summary
    pub fn summary(&self) -> FrameSummary<'_> {
        FrameSummary(self)
    }
}

impl Record for DatalogFrame {
    const SCHEMA: &'static [Field] = &[
        Field::new("frame_number", FieldType::I32),
        Field::new("time_offset", FieldType::I32),
        Field::new("rpm", FieldType::I32),
        Field::new("padding0", FieldType::I32),
        Field::new("speed", FieldType::F64),
        Field::new("map", FieldType::F64),
        Field::new("clv", FieldType::F64),
        Field::new("tps", FieldType::F64),
        Field::new("cam_angle", FieldType::F64),
        Field::new("target_cam_angle", FieldType::F64),
        Field::new("injector_duration", FieldType::F64),
        Field::new("ignition", FieldType::F64),
        Field::new("iat", FieldType::F64),
        Field::new("ect", FieldType::F64),
        Field::new("unknown1", FieldType::I32),
        Field::new("unknown2", FieldType::I32),
        Field::new("unknown3", FieldType::I32),
        Field::new("unknown4", FieldType::I32),
        Field::new("unknown5", FieldType::I32),
        Field::new("rvslck", FieldType::U8),
        Field::new("bksw", FieldType::U8),
        Field::new("acsw", FieldType::U8),
        Field::new("accl", FieldType::U8),
        Field::new("scs", FieldType::U8),
        Field::new("eps", FieldType::U8),
        Field::new("flr", FieldType::U8),
        Field::new("vtp", FieldType::U8),
        Field::new("vtc", FieldType::U8),
        Field::new("fanc", FieldType::U8),
        Field::new("mil", FieldType::U8),
        Field::new("blank_flag", FieldType::U8),
        Field::new("o2_voltage", FieldType::F64),
        Field::new("o2_ma", FieldType::F64),
        Field::new("so2", FieldType::F64),
        Field::new("lambda", FieldType::F64),
        Field::new("target_lambda", FieldType::F64),
        Field::new("short_term_trim", FieldType::F64),
        Field::new("long_term_trim", FieldType::F64),
        Field::new("fuel_status", FieldType::I32),
        Field::new("padding1", FieldType::I32),
        Field::new("knock_retard", FieldType::F64),
        Field::new("knock_level_volts", FieldType::F64),
        Field::new("knock_threshold_volts", FieldType::F64),
        Field::new("knock_count", FieldType::I32),
        Field::new("padding2", FieldType::I32),
        Field::new("aap", FieldType::F64),
        Field::new("rtp", FieldType::F64),
        Field::new("battery_voltage", FieldType::F64),
        Field::new("eld_amps", FieldType::F64),
        Field::new("n2o_arm1", FieldType::U8),
        Field::new("n2o_on1", FieldType::U8),
        Field::new("n2o_arm2", FieldType::U8),
        Field::new("n2o_on2", FieldType::U8),
        Field::new("n2o_arm3", FieldType::U8),
        Field::new("n2o_on3", FieldType::U8),
        Field::new("diagnostics1", FieldType::U8),
        Field::new("diagnostics2", FieldType::U8),
        Field::new("diagnostic_codes", FieldType::Bytes(DIAGNOSTIC_CODES_LEN)),
        Field::new("gear", FieldType::I32),
        Field::new("boost_controller_duty", FieldType::F64),
        Field::new("unknown7", FieldType::I32),
        Field::new("padding3", FieldType::I32),
        Field::new("unknown8", FieldType::F64),
        Field::new("tps2", FieldType::F64),
        Field::new("eld_voltage", FieldType::F64),
        Field::new("datalogging", FieldType::U8),
        Field::new("reserved", FieldType::Bytes(FRAME_TAIL_LEN)),
    ];

    fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
        w.put_i32(self.frame_number)?;
        w.put_i32(self.time_offset)?;
        w.put_i32(self.rpm)?;
        w.put_i32(0)?;
        w.put_f64(self.speed)?;
        w.put_f64(self.map)?;
        w.put_f64(self.clv)?;
        w.put_f64(self.tps)?;
        w.put_f64(self.cam_angle)?;
        w.put_f64(self.target_cam_angle)?;
        w.put_f64(self.injector_duration)?;
        w.put_f64(self.ignition)?;
        w.put_f64(self.iat)?;
        w.put_f64(self.ect)?;
        w.put_i32(self.unknown1)?;
        w.put_i32(self.unknown2)?;
        w.put_i32(self.unknown3)?;
        w.put_i32(self.unknown4)?;
        w.put_i32(self.unknown5)?;
        w.put_u8(self.rvslck)?;
        w.put_u8(self.bksw)?;
        w.put_u8(self.acsw)?;
        w.put_u8(self.accl)?;
        w.put_u8(self.scs)?;
        w.put_u8(self.eps)?;
        w.put_u8(self.flr)?;
        w.put_u8(self.vtp)?;
        w.put_u8(self.vtc)?;
        w.put_u8(self.fanc)?;
        w.put_u8(self.mil)?;
        w.put_u8(self.blank_flag)?;
        w.put_f64(self.o2_voltage)?;
        w.put_f64(self.o2_ma)?;
        w.put_f64(self.so2)?;
        w.put_f64(self.lambda)?;
        w.put_f64(self.target_lambda)?;
        w.put_f64(self.short_term_trim)?;
        w.put_f64(self.long_term_trim)?;
        w.put_i32(self.fuel_status)?;
        w.put_i32(0)?;
        w.put_f64(self.knock_retard)?;
        w.put_f64(self.knock_level_volts)?;
        w.put_f64(self.knock_threshold_volts)?;
        w.put_i32(self.knock_count)?;
        w.put_i32(0)?;
        w.put_f64(self.aap)?;
        w.put_f64(self.rtp)?;
        w.put_f64(self.battery_voltage)?;
        w.put_f64(self.eld_amps)?;
        w.put_u8(self.n2o_arm1)?;
        w.put_u8(self.n2o_on1)?;
        w.put_u8(self.n2o_arm2)?;
        w.put_u8(self.n2o_on2)?;
        w.put_u8(self.n2o_arm3)?;
        w.put_u8(self.n2o_on3)?;
        w.put_u8(self.diagnostics1)?;
        w.put_u8(self.diagnostics2)?;
        w.put_bytes(&self.diagnostic_codes)?;
        w.put_i32(self.gear)?;
        w.put_f64(self.boost_controller_duty)?;
        w.put_i32(self.unknown7)?;
        w.put_i32(0)?;
        w.put_f64(self.unknown8)?;
        w.put_f64(self.tps2)?;
        w.put_f64(self.eld_voltage)?;
        w.put_u8(self.datalogging)?;
        w.put_bytes(&self.reserved)
    }

    fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
        let frame_number = r.get_i32()?;
        let time_offset = r.get_i32()?;
        let rpm = r.get_i32()?;
        r.get_i32()?; // padding0
        let speed = r.get_f64()?;
        let map = r.get_f64()?;
        let clv = r.get_f64()?;
        let tps = r.get_f64()?;
        let cam_angle = r.get_f64()?;
        let target_cam_angle = r.get_f64()?;
        let injector_duration = r.get_f64()?;
        let ignition = r.get_f64()?;
        let iat = r.get_f64()?;
        let ect = r.get_f64()?;
        let unknown1 = r.get_i32()?;
        let unknown2 = r.get_i32()?;
        let unknown3 = r.get_i32()?;
        let unknown4 = r.get_i32()?;
        let unknown5 = r.get_i32()?;
        let rvslck = r.get_u8()?;
        let bksw = r.get_u8()?;
        let acsw = r.get_u8()?;
        let accl = r.get_u8()?;
        let scs = r.get_u8()?;
        let eps = r.get_u8()?;
        let flr = r.get_u8()?;
        let vtp = r.get_u8()?;
        let vtc = r.get_u8()?;
        let fanc = r.get_u8()?;
        let mil = r.get_u8()?;
        let blank_flag = r.get_u8()?;
        let o2_voltage = r.get_f64()?;
        let o2_ma = r.get_f64()?;
        let so2 = r.get_f64()?;
        let lambda = r.get_f64()?;
        let target_lambda = r.get_f64()?;
        let short_term_trim = r.get_f64()?;
        let long_term_trim = r.get_f64()?;
        let fuel_status = r.get_i32()?;
        r.get_i32()?; // padding1
        let knock_retard = r.get_f64()?;
        let knock_level_volts = r.get_f64()?;
        let knock_threshold_volts = r.get_f64()?;
        let knock_count = r.get_i32()?;
        r.get_i32()?; // padding2
        let aap = r.get_f64()?;
        let rtp = r.get_f64()?;
        let battery_voltage = r.get_f64()?;
        let eld_amps = r.get_f64()?;
        let n2o_arm1 = r.get_u8()?;
        let n2o_on1 = r.get_u8()?;
        let n2o_arm2 = r.get_u8()?;
        let n2o_on2 = r.get_u8()?;
        let n2o_arm3 = r.get_u8()?;
        let n2o_on3 = r.get_u8()?;
        let diagnostics1 = r.get_u8()?;
        let diagnostics2 = r.get_u8()?;
        let diagnostic_codes = r.get_bytes()?;
        let gear = r.get_i32()?;
        let boost_controller_duty = r.get_f64()?;
        let unknown7 = r.get_i32()?;
        r.get_i32()?; // padding3
        let unknown8 = r.get_f64()?;
        let tps2 = r.get_f64()?;
        let eld_voltage = r.get_f64()?;
        let datalogging = r.get_u8()?;
        let reserved = r.get_bytes()?;

        Ok(Self {
            frame_number,
            time_offset,
            rpm,
            speed,
            map,
            clv,
            tps,
            cam_angle,
            target_cam_angle,
            injector_duration,
            ignition,
            iat,
            ect,
            unknown1,
            unknown2,
            unknown3,
            unknown4,
            unknown5,
            rvslck,
            bksw,
            acsw,
            accl,
            scs,
            eps,
            flr,
            vtp,
            vtc,
            fanc,
            mil,
            blank_flag,
            o2_voltage,
            o2_ma,
            so2,
            lambda,
            target_lambda,
            short_term_trim,
            long_term_trim,
            fuel_status,
            knock_retard,
            knock_level_volts,
            knock_threshold_volts,
            knock_count,
            aap,
            rtp,
            battery_voltage,
            eld_amps,
            n2o_arm1,
            n2o_on1,
            n2o_arm2,
            n2o_on2,
            n2o_arm3,
            n2o_on3,
            diagnostics1,
            diagnostics2,
            diagnostic_codes,
            gear,
            boost_controller_duty,
            unknown7,
            unknown8,
            tps2,
            eld_voltage,
            datalogging,
            reserved,
        })
    }
}

/// Console rendering of a frame's headline values
pub struct FrameSummary<'a>(&'a DatalogFrame);

impl fmt::Display for FrameSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0;
        write!(
            f,
            "#{:08}  {:08}ms RPM: {:4}  VSS: {:5.1}  GEAR: {} MAP: {:6.2} IGN: {:5.1} INJ: {:6.3} ",
            frame.frame_number,
            frame.time_offset,
            frame.rpm,
            frame.speed,
            frame.gear,
            frame.map,
            frame.ignition,
            frame.injector_duration,
        )?;
        write!(
            f,
            "IAT: {:6.2}\u{00B0}C ECT: {:6.2}\u{00B0}C BAT: {:4.1}",
            frame.iat, frame.ect, frame.battery_voltage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    #[test]
    fn test_schema_is_336_bytes() {
        assert_eq!(<DatalogFrame as Record>::SIZE, FRAME_SIZE);
        assert_eq!(DatalogFrame::SIZE, FRAME_SIZE);
    }

    #[test]
    fn test_eight_byte_fields_are_aligned() {
        let mut offset = 0;
        for field in DatalogFrame::SCHEMA {
            if field.ty == FieldType::F64 {
                assert_eq!(offset % 8, 0, "{} is misaligned at {}", field.name, offset);
            }
            offset += field.ty.size_bytes();
        }
    }

    #[test]
    fn test_padding_is_zero() {
        let frame = DatalogFrame {
            rpm: -1,
            fuel_status: -1,
            knock_count: -1,
            unknown7: -1,
            ..Default::default()
        };
        let bytes = encode(&frame).unwrap();
        for offset in [12, 188, 220, 300] {
            assert_eq!(&bytes[offset..offset + 4], &[0, 0, 0, 0]);
        }
    }

    #[test]
    fn test_known_offsets() {
        let frame = DatalogFrame {
            frame_number: 7,
            gear: 3,
            datalogging: 1,
            diagnostic_codes: [0xAA; DIAGNOSTIC_CODES_LEN],
            ..Default::default()
        };
        let bytes = encode(&frame).unwrap();

        assert_eq!(bytes[0], 7);
        assert_eq!(&bytes[264..284], &[0xAA; DIAGNOSTIC_CODES_LEN]);
        assert_eq!(bytes[284], 3);
        assert_eq!(bytes[328], 1);
        assert_eq!(decode::<DatalogFrame>(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_with_sequence() {
        let frame = DatalogFrame {
            rpm: 900,
            ..Default::default()
        }
        .with_sequence(4, 1200);
        assert_eq!(frame.frame_number, 4);
        assert_eq!(frame.time_offset, 1200);
        assert_eq!(frame.rpm, 900);
    }

    #[test]
    fn test_summary_line() {
        let frame = DatalogFrame {
            frame_number: 12,
            rpm: 3000,
            ..Default::default()
        };
        let line = frame.summary().to_string();
        assert!(line.starts_with("#00000012"));
        assert!(line.contains("RPM: 3000"));
        assert!(!line.contains('\n'));
    }
}
