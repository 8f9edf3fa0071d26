//! Datalog1 message (0x60): the high-rate engine parameters

use crate::codec::{Field, FieldType, Record, RecordReader, RecordWriter, SchemaError};
use crate::conversion::{
    flag, lambda_from_raw, lambda_to_raw, pack_flags, raw_u16, raw_u8, round, trim_from_raw,
    trim_to_raw, volts_from_raw, volts_to_raw, CAMDEG, O2VOLTS, PERCENT, VOLTS,
};
use crate::frame::DatalogFrame;

use super::{MessageType, WireMessage};

// SWT bits
pub const SW_RVSLCK: u8 = 0x01;
pub const SW_BKSW: u8 = 0x02;
pub const SW_ACSW: u8 = 0x04;
pub const SW_ACCL: u8 = 0x08;
pub const SW_SCS: u8 = 0x10;
pub const SW_EPS: u8 = 0x20;
pub const SW_FLR: u8 = 0x40;
pub const SW_FANC: u8 = 0x80;

// VTC bits
pub const SW_VTP: u8 = 0x01;
pub const SW_VTS: u8 = 0x02;
pub const N2O_1_ARM: u8 = 0x10;
pub const N2O_1_ON: u8 = 0x20;
pub const N2O_2_ARM: u8 = 0x40;
pub const N2O_2_ON: u8 = 0x80;

// Other flag bits
pub const N2O_3_ARM: u8 = 0x01;
pub const N2O_3_ON: u8 = 0x02;
pub const DATALOGGING_ACTIVE: u8 = 0x04;

const RPM_SCALE: f64 = 0.25;
const MAP1_SCALE: f64 = 0.01;
const MAP2_SCALE: f64 = 0.001;
const INJ_SCALE: f64 = 0.004;
const BCD_SCALE: f64 = 0.00244140625;
const TPS2_SCALE: f64 = 100.0 * 0.000019;
const TPS2_OFFSET: f64 = 5760.0;
const ELDV_SCALE: f64 = 0.000015258789 * 5.0;

/// Raw Datalog1 payload, 45 bytes.
///
/// Field comments give the conversion to engineering units.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Datalog1Message {
    /// × 0.25 → RPM
    pub rpm: u16,
    /// km/h
    pub vss: u8,
    /// ((raw × 5/256) − 0.45) × 25 + 0.5 → %, truncated
    pub tps: u8,
    /// × 0.01 → kPa, used only when `map2` is zero
    pub map1: u8,
    /// × 100/256 → % load
    pub clv: u8,
    /// × 0.5 − 20 → degrees
    pub cam: u8,
    /// × 60/256 → degrees, clamped at 0
    pub tcm: u8,
    /// Not used for datalogging
    pub inner_checksum: u8,
    /// × 0.004 → ms
    pub inj: u16,
    /// × 0.5 − 64 → degrees
    pub ign: u8,
    /// × 1.25/256 → V
    pub o2v: u8,
    /// × 5/256 → V
    pub so2: u8,
    /// 32768 / raw → lambda
    pub po2: u16,
    /// 32768 / raw → lambda
    pub tgt: u16,
    /// Short term trim, (raw − 128) × 0.78125 → %
    pub stt: u8,
    /// × 0.25 → degrees
    pub knr: u8,
    /// × 5/256 → V
    pub knl: u8,
    /// × 5/256 → V
    pub knt: u8,
    /// Knock count
    pub knc: u16,
    pub unknown1: u8,
    pub unknown2: u8,
    pub unknown3: u8,
    pub unknown4: u8,
    pub unknown5: u8,
    /// Switch status bits (`SW_*`)
    pub swt: u8,
    /// VTEC and N2O 1/2 bits
    pub vtc: u8,
    /// × 0.001 → kPa
    pub map2: u16,
    pub gear: u8,
    /// × 0.00244140625 + 0.5 → %
    pub bcd: u16,
    pub unknown7: u8,
    /// × 0.25 − 27
    pub unknown8: u16,
    /// (raw − 5760) × 0.0019 → %
    pub tps2: u16,
    /// × 0.000015258789 × 5 → V
    pub eldv: u16,
    /// N2O 3 and onboard datalogging bits
    pub other_flags: u8,
    pub reserved: u8,
}

impl Record for Datalog1Message {
    const SCHEMA: &'static [Field] = &[
        Field::new("rpm", FieldType::U16),
        Field::new("vss", FieldType::U8),
        Field::new("tps", FieldType::U8),
        Field::new("map1", FieldType::U8),
        Field::new("clv", FieldType::U8),
        Field::new("cam", FieldType::U8),
        Field::new("tcm", FieldType::U8),
        Field::new("inner_checksum", FieldType::U8),
        Field::new("inj", FieldType::U16),
        Field::new("ign", FieldType::U8),
        Field::new("o2v", FieldType::U8),
        Field::new("so2", FieldType::U8),
        Field::new("po2", FieldType::U16),
        Field::new("tgt", FieldType::U16),
        Field::new("stt", FieldType::U8),
        Field::new("knr", FieldType::U8),
        Field::new("knl", FieldType::U8),
        Field::new("knt", FieldType::U8),
        Field::new("knc", FieldType::U16),
        Field::new("unknown1", FieldType::U8),
        Field::new("unknown2", FieldType::U8),
        Field::new("unknown3", FieldType::U8),
        Field::new("unknown4", FieldType::U8),
        Field::new("unknown5", FieldType::U8),
        Field::new("swt", FieldType::U8),
        Field::new("vtc", FieldType::U8),
        Field::new("map2", FieldType::U16),
        Field::new("gear", FieldType::U8),
        Field::new("bcd", FieldType::U16),
        Field::new("unknown7", FieldType::U8),
        Field::new("unknown8", FieldType::U16),
        Field::new("tps2", FieldType::U16),
        Field::new("eldv", FieldType::U16),
        Field::new("other_flags", FieldType::U8),
        Field::new("reserved", FieldType::U8),
    ];

    fn encode_fields(&self, w: &mut RecordWriter<'_>) -> Result<(), SchemaError> {
        w.put_u16(self.rpm)?;
        w.put_u8(self.vss)?;
        w.put_u8(self.tps)?;
        w.put_u8(self.map1)?;
        w.put_u8(self.clv)?;
        w.put_u8(self.cam)?;
        w.put_u8(self.tcm)?;
        w.put_u8(self.inner_checksum)?;
        w.put_u16(self.inj)?;
        w.put_u8(self.ign)?;
        w.put_u8(self.o2v)?;
        w.put_u8(self.so2)?;
        w.put_u16(self.po2)?;
        w.put_u16(self.tgt)?;
        w.put_u8(self.stt)?;
        w.put_u8(self.knr)?;
        w.put_u8(self.knl)?;
        w.put_u8(self.knt)?;
        w.put_u16(self.knc)?;
        w.put_u8(self.unknown1)?;
        w.put_u8(self.unknown2)?;
        w.put_u8(self.unknown3)?;
        w.put_u8(self.unknown4)?;
        w.put_u8(self.unknown5)?;
        w.put_u8(self.swt)?;
        w.put_u8(self.vtc)?;
        w.put_u16(self.map2)?;
        w.put_u8(self.gear)?;
        w.put_u16(self.bcd)?;
        w.put_u8(self.unknown7)?;
        w.put_u16(self.unknown8)?;
        w.put_u16(self.tps2)?;
        w.put_u16(self.eldv)?;
        w.put_u8(self.other_flags)?;
        w.put_u8(self.reserved)
    }

    fn decode_fields(r: &mut RecordReader<'_>) -> Result<Self, SchemaError> {
        Ok(Self {
            rpm: r.get_u16()?,
            vss: r.get_u8()?,
            tps: r.get_u8()?,
            map1: r.get_u8()?,
            clv: r.get_u8()?,
            cam: r.get_u8()?,
            tcm: r.get_u8()?,
            inner_checksum: r.get_u8()?,
            inj: r.get_u16()?,
            ign: r.get_u8()?,
            o2v: r.get_u8()?,
            so2: r.get_u8()?,
            po2: r.get_u16()?,
            tgt: r.get_u16()?,
            stt: r.get_u8()?,
            knr: r.get_u8()?,
            knl: r.get_u8()?,
            knt: r.get_u8()?,
            knc: r.get_u16()?,
            unknown1: r.get_u8()?,
            unknown2: r.get_u8()?,
            unknown3: r.get_u8()?,
            unknown4: r.get_u8()?,
            unknown5: r.get_u8()?,
            swt: r.get_u8()?,
            vtc: r.get_u8()?,
            map2: r.get_u16()?,
            gear: r.get_u8()?,
            bcd: r.get_u16()?,
            unknown7: r.get_u8()?,
            unknown8: r.get_u16()?,
            tps2: r.get_u16()?,
            eldv: r.get_u16()?,
            other_flags: r.get_u8()?,
            reserved: r.get_u8()?,
        })
    }
}

/// Manifold pressure: the 16-bit MAP2 reading wins whenever it is nonzero
fn manifold_pressure(map1: u8, map2: u16) -> f64 {
    if map2 == 0 {
        map1 as f64 * MAP1_SCALE
    } else {
        round(map2 as f64 * MAP2_SCALE, 4)
    }
}

impl WireMessage for Datalog1Message {
    const TYPE: MessageType = MessageType::Datalog1;

    fn from_frame(frame: &DatalogFrame) -> Self {
        Self {
            rpm: raw_u16(frame.rpm as f64 / RPM_SCALE),
            vss: raw_u8(frame.speed),
            tps: raw_u8((((frame.tps - 0.5) / 25.0) + 0.45) / VOLTS),
            // MAP2 carries the finer resolution, so MAP1 stays empty
            map1: 0,
            clv: raw_u8(frame.clv / PERCENT),
            cam: raw_u8((frame.cam_angle + 20.0) / 0.5),
            tcm: raw_u8(frame.target_cam_angle / CAMDEG),
            inner_checksum: 0,
            inj: raw_u16(frame.injector_duration / INJ_SCALE),
            ign: raw_u8((frame.ignition + 64.0) / 0.5),
            o2v: raw_u8(frame.o2_voltage / O2VOLTS),
            so2: volts_to_raw(frame.so2),
            po2: lambda_to_raw(frame.lambda),
            tgt: lambda_to_raw(frame.target_lambda),
            stt: trim_to_raw(frame.short_term_trim),
            knr: raw_u8(frame.knock_retard / 0.25),
            knl: volts_to_raw(frame.knock_level_volts),
            knt: volts_to_raw(frame.knock_threshold_volts),
            knc: frame.knock_count as u16,
            unknown1: frame.unknown1 as u8,
            unknown2: frame.unknown2 as u8,
            unknown3: frame.unknown3 as u8,
            unknown4: frame.unknown4 as u8,
            unknown5: frame.unknown5 as u8,
            swt: pack_flags(&[
                (frame.rvslck, SW_RVSLCK),
                (frame.bksw, SW_BKSW),
                (frame.acsw, SW_ACSW),
                (frame.accl, SW_ACCL),
                (frame.scs, SW_SCS),
                (frame.eps, SW_EPS),
                (frame.flr, SW_FLR),
                (frame.fanc, SW_FANC),
            ]),
            vtc: pack_flags(&[
                (frame.vtp, SW_VTP),
                (frame.vtc, SW_VTS),
                (frame.n2o_arm1, N2O_1_ARM),
                (frame.n2o_on1, N2O_1_ON),
                (frame.n2o_arm2, N2O_2_ARM),
                (frame.n2o_on2, N2O_2_ON),
            ]),
            map2: raw_u16(frame.map / MAP2_SCALE),
            gear: frame.gear as u8,
            bcd: raw_u16((frame.boost_controller_duty - 0.5) / BCD_SCALE),
            unknown7: frame.unknown7 as u8,
            unknown8: raw_u16((frame.unknown8 + 27.0) / 0.25),
            tps2: raw_u16(frame.tps2 / TPS2_SCALE + TPS2_OFFSET),
            eldv: raw_u16(frame.eld_voltage / ELDV_SCALE),
            other_flags: pack_flags(&[
                (frame.n2o_arm3, N2O_3_ARM),
                (frame.n2o_on3, N2O_3_ON),
                (frame.datalogging, DATALOGGING_ACTIVE),
            ]),
            reserved: 0,
        }
    }

    fn apply_to(&self, frame: &DatalogFrame) -> DatalogFrame {
        let o2_voltage = self.o2v as f64 * O2VOLTS;

        DatalogFrame {
            rpm: (self.rpm as f64 * RPM_SCALE) as i32,
            speed: self.vss as f64,
            tps: ((volts_from_raw(self.tps) - 0.45) * 25.0 + 0.5).trunc(),
            map: manifold_pressure(self.map1, self.map2),
            clv: self.clv as f64 * PERCENT,
            cam_angle: self.cam as f64 * 0.5 - 20.0,
            target_cam_angle: (self.tcm as f64 * CAMDEG).max(0.0),
            injector_duration: round(self.inj as f64 * INJ_SCALE, 4),
            ignition: round(self.ign as f64 * 0.5 - 64.0, 4),
            o2_voltage,
            o2_ma: o2_voltage * 0.05 - 0.037,
            so2: volts_from_raw(self.so2),
            lambda: lambda_from_raw(self.po2),
            target_lambda: lambda_from_raw(self.tgt),
            short_term_trim: trim_from_raw(self.stt),
            knock_retard: self.knr as f64 * 0.25,
            knock_level_volts: volts_from_raw(self.knl),
            knock_threshold_volts: volts_from_raw(self.knt),
            knock_count: self.knc as i32,
            unknown1: self.unknown1 as i32,
            unknown2: self.unknown2 as i32,
            unknown3: self.unknown3 as i32,
            unknown4: self.unknown4 as i32,
            unknown5: self.unknown5 as i32,
            rvslck: flag(self.swt, SW_RVSLCK),
            bksw: flag(self.swt, SW_BKSW),
            acsw: flag(self.swt, SW_ACSW),
            accl: flag(self.swt, SW_ACCL),
            scs: flag(self.swt, SW_SCS),
            eps: flag(self.swt, SW_EPS),
            flr: flag(self.swt, SW_FLR),
            fanc: flag(self.swt, SW_FANC),
            vtp: flag(self.vtc, SW_VTP),
            vtc: flag(self.vtc, SW_VTS),
            n2o_arm1: flag(self.vtc, N2O_1_ARM),
            n2o_on1: flag(self.vtc, N2O_1_ON),
            n2o_arm2: flag(self.vtc, N2O_2_ARM),
            n2o_on2: flag(self.vtc, N2O_2_ON),
            gear: self.gear as i32,
            boost_controller_duty: self.bcd as f64 * BCD_SCALE + 0.5,
            unknown7: self.unknown7 as i32,
            unknown8: self.unknown8 as f64 * 0.25 - 27.0,
            tps2: (self.tps2 as f64 - TPS2_OFFSET) * TPS2_SCALE,
            eld_voltage: self.eldv as f64 * ELDV_SCALE,
            n2o_arm3: flag(self.other_flags, N2O_3_ARM),
            n2o_on3: flag(self.other_flags, N2O_3_ON),
            datalogging: flag(self.other_flags, DATALOGGING_ACTIVE),
            ..frame.clone()
        }
    }
}
