//! Conversion curve and scaling tests

use kprodatalog_core::conversion::*;

#[test]
fn test_iat_curve_is_linear() {
    assert_eq!(iat_from_raw(0), 87.484375);
    assert!((iat_from_raw(100) - 45.296875).abs() < 1e-9);
    // Hotter air reads lower
    assert!(iat_from_raw(200) < iat_from_raw(100));
}

#[test]
fn test_iat_inverse_recovers_every_raw_value() {
    for raw in 0..=255u8 {
        assert_eq!(iat_to_raw(iat_from_raw(raw)), raw, "raw {}", raw);
    }
}

#[test]
fn test_ect_known_points() {
    assert!((ect_from_raw(0) - 120.129).abs() < 0.001);
    assert!((ect_from_raw(40) - 80.092).abs() < 0.001);
    assert!((ect_from_raw(170) - 15.138).abs() < 0.001);
}

#[test]
fn test_ect_inverse_in_fitted_bands() {
    for raw in [0u8, 1, 2, 35, 40, 46, 62, 70, 77, 165, 170, 182, 212, 220, 249] {
        assert_eq!(ect_to_raw(ect_from_raw(raw)), raw, "raw {}", raw);
    }
}

#[test]
fn test_ect_inverse_stays_close_everywhere() {
    for raw in 0..=255u8 {
        let back = ect_to_raw(ect_from_raw(raw));
        let celsius_error = (ect_from_raw(back) - ect_from_raw(raw)).abs();
        assert!(celsius_error < 4.0, "raw {} came back as {}", raw, back);
    }
}

#[test]
fn test_lambda_is_reciprocal() {
    assert_eq!(lambda_from_raw(16384), 2.0);
    assert_eq!(lambda_from_raw(65535), HALF_SHORT / 65535.0);
    assert_eq!(lambda_to_raw(lambda_from_raw(33000)), 33000);
    assert!(lambda_from_raw(0).is_finite());
}

#[test]
fn test_volts_scale() {
    assert_eq!(volts_from_raw(0), 0.0);
    assert_eq!(volts_from_raw(128), 2.5);
    assert_eq!(volts_to_raw(2.5), 128);
}

#[test]
fn test_switch_byte_decompose_recompose() {
    let masks = [0x01u8, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80];
    for bits in 0..=255u8 {
        let flags: Vec<(u8, u8)> = masks.iter().map(|&mask| (flag(bits, mask), mask)).collect();
        assert_eq!(pack_flags(&flags), bits);
    }
}
