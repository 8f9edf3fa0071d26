//! Simulated KPro device
//!
//! An in-process [`Transport`] that answers poll bytes the way the device
//! does, with data from a small engine model: idle at ~850 RPM with random
//! throttle blips, coolant warming up over time. Used for `--demo` runs and
//! as the device in capture tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};
use tracing::warn;

use super::{Packet, ProtocolError, Transport};
use crate::frame::DatalogFrame;
use crate::message::{Message, MessageType, StatusMessage};

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlipState {
    /// Engine idling
    Idle,
    /// Throttle open, RPM rising
    RampUp { start_ms: u64 },
    /// Throttle closing, RPM falling
    RampDown { start_ms: u64 },
}

const IDLE_RPM: f64 = 850.0;
const RAMP_MS: u64 = 1500;

/// Simulated device behind a [`Transport`]
pub struct SimulatedEcu {
    rng: StdRng,
    start: Instant,
    output: VecDeque<u8>,
    blip_state: BlipState,
    next_blip_ms: u64,
    blip_target_rpm: f64,
    /// Status polls answered "offline" before going online
    offline_polls: usize,
    /// Upcoming writes that fail with a broken pipe
    failing_writes: usize,
    /// Bytes dropped from the end of every response
    truncate_by: usize,
    /// Reply type whose next checksum byte is flipped
    corrupt_next: Option<MessageType>,
    requests: usize,
    resets: usize,
}

impl SimulatedEcu {
    /// Device with a deterministic engine model
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let next_blip_ms = rng.gen_range(2000..5000);
        Self {
            rng,
            start: Instant::now(),
            output: VecDeque::new(),
            blip_state: BlipState::Idle,
            next_blip_ms,
            blip_target_rpm: IDLE_RPM,
            offline_polls: 0,
            failing_writes: 0,
            truncate_by: 0,
            corrupt_next: None,
            requests: 0,
            resets: 0,
        }
    }

    /// Report offline for the first `polls` status requests
    pub fn with_offline_polls(mut self, polls: usize) -> Self {
        self.offline_polls = polls;
        self
    }

    /// Make the next `count` writes fail
    pub fn fail_writes(&mut self, count: usize) {
        self.failing_writes = count;
    }

    /// Drop `bytes` from the end of every response
    pub fn truncate_responses(&mut self, bytes: usize) {
        self.truncate_by = bytes;
    }

    /// Send the next `message_type` reply with a bad checksum
    pub fn corrupt_next_checksum(&mut self, message_type: MessageType) {
        self.corrupt_next = Some(message_type);
    }

    /// Poll bytes received
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Times the link was reset
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Engine state at `elapsed_ms` since the device started
    pub fn sample(&mut self, elapsed_ms: u64) -> DatalogFrame {
        self.update_blip_state(elapsed_ms);

        let t = elapsed_ms as f64 / 1000.0;
        let rpm = match self.blip_state {
            BlipState::Idle => IDLE_RPM + 20.0 * (t * 2.5).sin() + self.rng.gen_range(-10.0..10.0),
            BlipState::RampUp { start_ms } => {
                let progress = (elapsed_ms - start_ms) as f64 / RAMP_MS as f64;
                IDLE_RPM + (self.blip_target_rpm - IDLE_RPM) * progress.min(1.0)
            }
            BlipState::RampDown { start_ms } => {
                let progress = (elapsed_ms - start_ms) as f64 / RAMP_MS as f64;
                self.blip_target_rpm - (self.blip_target_rpm - IDLE_RPM) * progress.min(1.0)
            }
        };
        let load = ((rpm - IDLE_RPM) / (7000.0 - IDLE_RPM)).clamp(0.0, 1.0);
        let lambda = 1.0 + 0.03 * (t * 1.5).sin();

        DatalogFrame {
            rpm: rpm as i32,
            speed: 0.0,
            tps: (2.0 + load * 60.0).round(),
            map: 30.0 + load * 70.0,
            clv: 15.0 + load * 60.0,
            cam_angle: 10.0 + load * 25.0,
            target_cam_angle: 10.0 + load * 25.0,
            injector_duration: 2.5 + load * 8.0,
            ignition: 12.0 + load * 20.0,
            iat: 25.0 + 5.0 * (t * 0.1).sin(),
            ect: 20.0 + 70.0 * (1.0 - (-t / 120.0).exp()),
            o2_voltage: 0.45 + 0.4 * (t * 4.0).sin(),
            lambda,
            target_lambda: 1.0,
            short_term_trim: 2.0 * (t * 0.8).sin(),
            long_term_trim: 1.5,
            fuel_status: 2,
            battery_voltage: 13.8 + 0.2 * (t * 0.5).sin(),
            aap: 101.0,
            gear: 0,
            eps: 1,
            vtp: u8::from(rpm > 5500.0),
            vtc: u8::from(rpm > 5500.0),
            ..Default::default()
        }
    }

    fn update_blip_state(&mut self, elapsed_ms: u64) {
        self.blip_state = match self.blip_state {
            BlipState::Idle if elapsed_ms >= self.next_blip_ms => {
                self.blip_target_rpm = self.rng.gen_range(3000.0..7000.0);
                BlipState::RampUp { start_ms: elapsed_ms }
            }
            BlipState::RampUp { start_ms } if elapsed_ms >= start_ms + RAMP_MS => {
                BlipState::RampDown { start_ms: elapsed_ms }
            }
            BlipState::RampDown { start_ms } if elapsed_ms >= start_ms + RAMP_MS => {
                self.next_blip_ms = elapsed_ms + self.rng.gen_range(3000..8000);
                BlipState::Idle
            }
            state => state,
        };
    }

    fn respond(&mut self, request: u8) -> Result<(), ProtocolError> {
        self.requests += 1;
        let Some(message_type) = MessageType::from_id(request) else {
            warn!("Simulated device ignoring request 0x{:02X}", request);
            return Ok(());
        };

        let message = match message_type {
            MessageType::Status => {
                let online = self.offline_polls == 0;
                self.offline_polls = self.offline_polls.saturating_sub(1);
                Message::Status(StatusMessage {
                    online,
                    identity: *b"KPRO4 SIM 1.0",
                    ..Default::default()
                })
            }
            _ => {
                let elapsed_ms = self.start.elapsed().as_millis() as u64;
                let frame = self.sample(elapsed_ms);
                Message::for_request(message_type, &frame)
            }
        };

        let mut bytes = Packet::from_message(&message)?.to_bytes();
        if self.corrupt_next == Some(message_type) {
            self.corrupt_next = None;
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
        }
        bytes.truncate(bytes.len().saturating_sub(self.truncate_by));
        self.output.extend(bytes);
        Ok(())
    }
}

impl Default for SimulatedEcu {
    fn default() -> Self {
        Self::new(0x4B50_524F)
    }
}

impl Transport for SimulatedEcu {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated link failure").into());
        }
        for &request in bytes {
            self.respond(request)?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, ProtocolError> {
        let count = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn purge(&mut self) -> Result<(), ProtocolError> {
        self.output.clear();
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ProtocolError> {
        self.resets += 1;
        self.purge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum;

    #[test]
    fn test_answers_with_valid_frames() {
        let mut ecu = SimulatedEcu::new(7);
        ecu.write_all(&[0x60]).unwrap();

        let mut buf = [0u8; 64];
        let read = ecu.read(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(read, MessageType::Datalog1.frame_size());
        assert_eq!(buf[0], 0x60);
        assert_eq!(checksum(&buf[..read]), 0);
    }

    #[test]
    fn test_offline_then_online() {
        let mut ecu = SimulatedEcu::new(7).with_offline_polls(1);
        let mut buf = [0u8; 33];

        ecu.write_all(&[0x40]).unwrap();
        ecu.read(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(buf[2 + 13], 0);

        ecu.write_all(&[0x40]).unwrap();
        ecu.read(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(buf[2 + 13], 1);
    }

    #[test]
    fn test_engine_model_is_seeded() {
        let a: Vec<i32> = {
            let mut ecu = SimulatedEcu::new(42);
            (0..50).map(|i| ecu.sample(i * 200).rpm).collect()
        };
        let b: Vec<i32> = {
            let mut ecu = SimulatedEcu::new(42);
            (0..50).map(|i| ecu.sample(i * 200).rpm).collect()
        };
        assert_eq!(a, b);
        assert!(a.iter().all(|&rpm| rpm > 700 && rpm < 7100));
    }

    #[test]
    fn test_corrupts_only_the_next_matching_reply() {
        let mut ecu = SimulatedEcu::new(7);
        ecu.corrupt_next_checksum(MessageType::Datalog2);
        let mut buf = [0u8; 64];

        ecu.write_all(&[0x60]).unwrap();
        let read = ecu.read(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(checksum(&buf[..read]), 0);

        ecu.write_all(&[0x61]).unwrap();
        let read = ecu.read(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(read, MessageType::Datalog2.frame_size());
        assert_ne!(checksum(&buf[..read]), 0);

        ecu.write_all(&[0x61]).unwrap();
        let read = ecu.read(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(checksum(&buf[..read]), 0);
    }

    #[test]
    fn test_unknown_request_gets_no_answer() {
        let mut ecu = SimulatedEcu::default();
        ecu.write_all(&[0x41]).unwrap();
        assert_eq!(ecu.read(&mut [0u8; 8], Duration::ZERO).unwrap(), 0);
        assert_eq!(ecu.requests(), 1);
    }
}
