//! KPro Wire Protocol
//!
//! Implements the poll/response protocol spoken by the KPro datalogging
//! device, in both directions:
//! - Framing: `[type][length][payload][checksum]`, byte sum zero mod 256
//! - Capture: host polls the device and accumulates composite frames
//! - Replay: host plays stored frames back to a poller
//!
//! The transport is abstracted by [`Transport`]; the serial implementation
//! lives in [`serial`] and an in-process device in [`simulator`].

pub mod capture;
mod error;
mod packet;
pub mod replay;
pub mod serial;
pub mod simulator;
mod transport;

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub use capture::{capture, CaptureReport, CaptureSession, PollSchedule};
pub use error::ProtocolError;
pub use packet::{checksum, frame_checksum, Packet};
pub use replay::{replay, ReplayReport, ReplaySession};
pub use serial::{find_device, list_ports, open_port, PortInfo};
pub use simulator::SimulatedEcu;
pub use transport::{SerialTransport, Transport};

/// Type, length and checksum bytes around every payload
pub const FRAME_OVERHEAD: usize = 3;

/// Device baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default serial read/write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// FTDI vendor id used by the KPro USB interface
pub const KPRO_VID: u16 = 0x0403;

/// KPro product id
pub const KPRO_PID: u16 = 0xF5F8;

/// Longest single sleep between cancellation checks
const PAUSE_SLICE: Duration = Duration::from_millis(10);

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` if the pause was cut short by cancellation.
pub(crate) fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(PAUSE_SLICE));
    }
}
