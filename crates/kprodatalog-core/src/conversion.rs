//! Raw Value Conversions
//!
//! Scale/offset constants, calibration curves and bit packing used to move
//! between raw ECU values and engineering units:
//! - Linear byte scales: volts, percent, cam degrees
//! - Lambda: reciprocal of a 16-bit raw value (zero-guarded)
//! - Fuel trims: signed offset around 128
//! - Temperatures: fitted polynomials, separate forward and inverse curves
//! - Status bytes: one flag per bit

/// 1/256th
pub const NORMAL: f64 = 0.00390625;

/// 1/256 of 5.0 volts
pub const VOLTS: f64 = NORMAL * 5.0;

/// 1/256 of 100 percent
pub const PERCENT: f64 = NORMAL * 100.0;

/// 1/256 of 1.25 volts
pub const O2VOLTS: f64 = NORMAL * 1.25;

/// 1/256 of 60 degrees
pub const CAMDEG: f64 = NORMAL * 60.0;

/// Half of a 16-bit short
pub const HALF_SHORT: f64 = 32768.0;

/// Percent per count of a fuel trim byte (100 / 128)
pub const TRIM_PERCENT: f64 = 0.78125;

/// Intake air temperature, raw → °C
const IAT_TERMS: [f64; 2] = [8.7484375000000000e+001, -4.2187500000000000e-001];

/// Intake air temperature, °C → raw
const IAT_INVERSE_TERMS: [f64; 2] = [2.0737037037037038e+002, -2.3703703703703702e+000];

/// Coolant temperature, raw → °C
const ECT_TERMS: [f64; 4] = [
    1.2012932677355192e+002,
    -1.1912497349228761e+000,
    5.1833341961054673e-003,
    -1.0640590426890055e-005,
];

/// Coolant temperature, °C → raw
const ECT_INVERSE_TERMS: [f64; 5] = [
    2.0996060570938579e+002,
    -2.4532086905728314e+000,
    -1.4632564149589432e-002,
    3.6449222676847640e-004,
    -1.6141195870796833e-006,
];

/// Round to a fixed number of decimal places, ties towards positive infinity
pub fn round(value: f64, decimals: u32) -> f64 {
    let multiplier = 10f64.powi(decimals as i32);
    (value * multiplier + 0.5).floor() / multiplier
}

/// Evaluate `terms[0] + terms[1]*x + terms[2]*x^2 + ...`
pub fn poly_eval(x: f64, terms: &[f64]) -> f64 {
    terms.iter().rev().fold(0.0, |acc, term| acc * x + term)
}

/// Truncate an engineering-side value to an unsigned byte.
///
/// The float is first saturated to `i32` (NaN becomes 0), then wrapped to
/// eight bits. Out-of-range values are not clamped.
pub fn raw_u8(value: f64) -> u8 {
    value as i32 as u8
}

/// Truncate an engineering-side value to an unsigned 16-bit word.
///
/// Same saturate-then-wrap rule as [`raw_u8`].
pub fn raw_u16(value: f64) -> u16 {
    value as i32 as u16
}

/// Intake air temperature in °C
pub fn iat_from_raw(raw: u8) -> f64 {
    poly_eval(raw as f64, &IAT_TERMS)
}

/// Raw intake air temperature byte for a temperature in °C
pub fn iat_to_raw(celsius: f64) -> u8 {
    raw_u8(poly_eval(celsius, &IAT_INVERSE_TERMS))
}

/// Coolant temperature in °C
pub fn ect_from_raw(raw: u8) -> f64 {
    poly_eval(raw as f64, &ECT_TERMS)
}

/// Raw coolant temperature byte for a temperature in °C.
///
/// The inverse curve is fitted separately. A raw → °C → raw round trip is
/// exact only in some bands (e.g. raw 35-46 and 62-77); elsewhere it can
/// land a few counts away.
pub fn ect_to_raw(celsius: f64) -> u8 {
    raw_u8(poly_eval(celsius, &ECT_INVERSE_TERMS))
}

/// Lambda from a raw 16-bit reading; a zero reading yields 0.0
pub fn lambda_from_raw(raw: u16) -> f64 {
    if raw == 0 {
        0.0
    } else {
        HALF_SHORT / raw as f64
    }
}

/// Raw 16-bit reading for a lambda value; a zero lambda yields 0
pub fn lambda_to_raw(lambda: f64) -> u16 {
    if lambda == 0.0 {
        0
    } else {
        raw_u16(HALF_SHORT / lambda)
    }
}

/// Fuel trim percentage from a raw byte centred on 128
pub fn trim_from_raw(raw: u8) -> f64 {
    (raw as f64 - 128.0) * TRIM_PERCENT
}

/// Raw fuel trim byte for a percentage
pub fn trim_to_raw(percent: f64) -> u8 {
    raw_u8(percent / TRIM_PERCENT + 128.0)
}

/// Byte-volts (0-5 V in 256 steps)
pub fn volts_from_raw(raw: u8) -> f64 {
    raw as f64 * VOLTS
}

/// Raw byte for a 0-5 V reading
pub fn volts_to_raw(volts: f64) -> u8 {
    raw_u8(volts / VOLTS)
}

/// Flag value (0 or 1) of `mask` within `bits`
pub fn flag(bits: u8, mask: u8) -> u8 {
    u8::from(bits & mask != 0)
}

/// OR together the masks of every set flag
pub fn pack_flags(flags: &[(u8, u8)]) -> u8 {
    flags
        .iter()
        .filter(|(value, _)| *value != 0)
        .fold(0u8, |bits, (_, mask)| bits | mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_constants() {
        assert_eq!(NORMAL, 1.0 / 256.0);
        assert_eq!(VOLTS, 5.0 / 256.0);
        assert_eq!(PERCENT, 100.0 / 256.0);
        assert_eq!(CAMDEG, 60.0 / 256.0);
    }

    #[test]
    fn test_round() {
        assert_eq!(round(1.23456, 2), 1.23);
        assert_eq!(round(1.235, 1), 1.2);
        assert_eq!(round(2.5, 0), 3.0);
        assert_eq!(round(-2.5, 0), -2.0);
    }

    #[test]
    fn test_poly_eval() {
        // 1 + 2x + 3x^2 at x = 2
        assert_eq!(poly_eval(2.0, &[1.0, 2.0, 3.0]), 17.0);
        assert_eq!(poly_eval(5.0, &[]), 0.0);
    }

    #[test]
    fn test_raw_truncation_wraps() {
        assert_eq!(raw_u8(255.9), 255);
        assert_eq!(raw_u8(256.0), 0);
        assert_eq!(raw_u8(-1.0), 255);
        assert_eq!(raw_u8(f64::NAN), 0);
        assert_eq!(raw_u16(65536.0 + 7.0), 7);
        assert_eq!(raw_u16(f64::INFINITY), 0xFFFF);
    }

    #[test]
    fn test_lambda_zero_guard() {
        assert_eq!(lambda_from_raw(0), 0.0);
        assert_eq!(lambda_to_raw(0.0), 0);
        assert_eq!(lambda_from_raw(32768), 1.0);
        assert_eq!(lambda_to_raw(1.0), 32768);
    }

    #[test]
    fn test_trim() {
        assert_eq!(trim_from_raw(128), 0.0);
        assert_eq!(trim_from_raw(0), -100.0);
        assert_eq!(trim_to_raw(0.0), 128);
        assert_eq!(trim_to_raw(trim_from_raw(200)), 200);
    }

    #[test]
    fn test_flags() {
        assert_eq!(flag(0b1010, 0b0010), 1);
        assert_eq!(flag(0b1010, 0b0100), 0);
        assert_eq!(pack_flags(&[(1, 0x01), (0, 0x02), (1, 0x80)]), 0x81);
    }
}
