//! Message catalog mapping tests

use kprodatalog_core::codec::{decode, encode};
use kprodatalog_core::frame::DatalogFrame;
use kprodatalog_core::message::flags::*;
use kprodatalog_core::message::{
    Datalog1Message, Datalog2Message, Datalog3Message, Message, MessageType, WireMessage,
};
use pretty_assertions::assert_eq;

fn busy_frame() -> DatalogFrame {
    DatalogFrame {
        frame_number: 41,
        time_offset: 4100,
        rpm: 6200,
        speed: 142.0,
        map: 180.5,
        gear: 4,
        ignition: 22.5,
        lambda: 0.85,
        diagnostics1: 0x80,
        mil: 1,
        ..Default::default()
    }
}

#[test]
fn test_datalog2_only_touches_its_fields() {
    let before = busy_frame();
    let message = Datalog2Message {
        ect: 40,
        iat: 150,
        vlt: 138,
        eld: 150,
        aap: 100,
        rtp: 130,
        ltt: 120,
        fst: 1,
        reserved: 0,
    };
    let after = message.apply_to(&before);

    let expected = DatalogFrame {
        ect: after.ect,
        iat: after.iat,
        battery_voltage: after.battery_voltage,
        eld_amps: after.eld_amps,
        aap: after.aap,
        rtp: after.rtp,
        long_term_trim: after.long_term_trim,
        fuel_status: after.fuel_status,
        ..before.clone()
    };
    assert_eq!(after, expected);
    assert_eq!(after.rpm, 6200);
    assert_eq!(after.gear, 4);
    assert_eq!(after.battery_voltage, 13.8);
    assert_eq!(after.aap, 1.0);
    assert_eq!(after.long_term_trim, -6.25);
}

#[test]
fn test_datalog1_conversions() {
    let message = Datalog1Message {
        rpm: 12000,
        vss: 60,
        tps: 128,
        clv: 64,
        cam: 80,
        tcm: 128,
        inj: 1000,
        ign: 160,
        o2v: 128,
        po2: 32768,
        tgt: 0,
        stt: 136,
        knr: 8,
        knc: 3,
        gear: 3,
        bcd: 4096,
        unknown7: 9,
        unknown8: 108,
        tps2: 5760,
        ..Default::default()
    };
    let frame = message.apply_to(&DatalogFrame::default());

    assert_eq!(frame.rpm, 3000);
    assert_eq!(frame.speed, 60.0);
    // ((2.5 - 0.45) * 25 + 0.5) truncated
    assert_eq!(frame.tps, 51.0);
    assert_eq!(frame.clv, 25.0);
    assert_eq!(frame.cam_angle, 20.0);
    assert_eq!(frame.target_cam_angle, 30.0);
    assert_eq!(frame.injector_duration, 4.0);
    assert_eq!(frame.ignition, 16.0);
    assert_eq!(frame.o2_voltage, 0.625);
    assert_eq!(frame.lambda, 1.0);
    assert_eq!(frame.target_lambda, 0.0);
    assert_eq!(frame.short_term_trim, 6.25);
    assert_eq!(frame.knock_retard, 2.0);
    assert_eq!(frame.knock_count, 3);
    assert_eq!(frame.gear, 3);
    assert_eq!(frame.boost_controller_duty, 10.5);
    assert_eq!(frame.unknown7, 9);
    assert_eq!(frame.unknown8, 0.0);
    assert_eq!(frame.tps2, 0.0);
}

#[test]
fn test_lambda_zero_guard() {
    let message = Datalog1Message {
        po2: 0,
        tgt: 0,
        ..Default::default()
    };
    let frame = message.apply_to(&busy_frame());
    assert_eq!(frame.lambda, 0.0);
    assert_eq!(frame.target_lambda, 0.0);
}

#[test]
fn test_manifold_pressure_fallback() {
    let primary_only = Datalog1Message {
        map1: 250,
        map2: 0,
        ..Default::default()
    };
    assert_eq!(primary_only.apply_to(&DatalogFrame::default()).map, 2.5);

    let both = Datalog1Message {
        map1: 250,
        map2: 40500,
        ..Default::default()
    };
    assert_eq!(both.apply_to(&DatalogFrame::default()).map, 40.5);
}

#[test]
fn test_switch_flags_round_trip_all_values() {
    for swt in 0..=255u8 {
        for vtc in [0u8, SW_VTP | N2O_1_ON, SW_VTS | N2O_2_ARM | N2O_2_ON, 0xF3] {
            let message = Datalog1Message {
                swt,
                vtc,
                other_flags: N2O_3_ARM | DATALOGGING_ACTIVE,
                ..Default::default()
            };
            let back = Datalog1Message::from_frame(&message.apply_to(&DatalogFrame::default()));
            assert_eq!((back.swt, back.vtc, back.other_flags), (swt, vtc, 0x05));
        }
    }
}

#[test]
fn test_datalog1_raw_round_trip() {
    let message = Datalog1Message {
        rpm: 3604,
        vss: 88,
        clv: 77,
        cam: 61,
        tcm: 90,
        inj: 812,
        ign: 150,
        o2v: 99,
        so2: 41,
        po2: 32000,
        tgt: 32768,
        stt: 131,
        knr: 4,
        knl: 20,
        knt: 200,
        knc: 12,
        unknown1: 1,
        unknown3: 2,
        unknown5: 3,
        swt: SW_BKSW | SW_EPS,
        vtc: SW_VTP,
        map2: 45000,
        gear: 2,
        bcd: 400,
        unknown7: 25,
        unknown8: 100,
        eldv: 40000,
        ..Default::default()
    };
    let frame = message.apply_to(&DatalogFrame::default());
    let back = Datalog1Message::from_frame(&frame);

    assert_eq!(back.rpm, message.rpm);
    assert_eq!(back.vss, message.vss);
    assert_eq!(back.cam, message.cam);
    assert_eq!(back.ign, message.ign);
    assert_eq!(back.o2v, message.o2v);
    assert_eq!(back.so2, message.so2);
    assert_eq!(back.po2, message.po2);
    assert_eq!(back.tgt, message.tgt);
    assert_eq!(back.stt, message.stt);
    assert_eq!(back.knr, message.knr);
    assert_eq!(back.knc, message.knc);
    assert_eq!(back.gear, message.gear);
    assert_eq!(back.unknown5, message.unknown5);
    // Scaled fields may lose one count to float truncation
    for (name, a, b) in [
        ("clv", back.clv as i32, message.clv as i32),
        ("tcm", back.tcm as i32, message.tcm as i32),
        ("inj", back.inj as i32, message.inj as i32),
        ("map2", back.map2 as i32, message.map2 as i32),
        ("bcd", back.bcd as i32, message.bcd as i32),
        ("unknown8", back.unknown8 as i32, message.unknown8 as i32),
        ("eldv", back.eldv as i32, message.eldv as i32),
    ] {
        assert!((a - b).abs() <= 1, "{}: {} vs {}", name, a, b);
    }
}

#[test]
fn test_datalog3_is_verbatim() {
    let mut codes = [0u8; 20];
    codes.iter_mut().enumerate().for_each(|(i, c)| *c = i as u8 * 3);
    let frame = DatalogFrame {
        diagnostics1: 0x12,
        diagnostics2: 0x34,
        diagnostic_codes: codes,
        ..busy_frame()
    };
    let message = Datalog3Message::from_frame(&frame);
    let bytes = encode(&message).unwrap();
    assert_eq!(decode::<Datalog3Message>(&bytes).unwrap(), message);
    assert_eq!(message.apply_to(&DatalogFrame::default()).diagnostic_codes, codes);
}

#[test]
fn test_message_dispatch_by_type() {
    let frame = busy_frame();
    for message_type in MessageType::POLL_ORDER {
        let message = Message::for_request(message_type, &frame);
        assert_eq!(message.message_type(), message_type);

        let payload = message.encode().unwrap();
        assert_eq!(payload.len(), message_type.payload_size());
        assert_eq!(Message::decode(message_type, &payload).unwrap(), message);
    }
}

#[test]
fn test_status_leaves_frame_alone() {
    let frame = busy_frame();
    let message = Message::for_request(MessageType::Status, &frame);
    assert_eq!(message.apply_to(&frame), frame);
}
