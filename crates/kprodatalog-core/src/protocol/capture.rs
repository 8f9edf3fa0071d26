//! Capture: poll a live device and record composite frames
//!
//! Each pass walks the message types in [`MessageType::POLL_ORDER`]. A type
//! is polled when its schedule is due and, for the datalog messages, once
//! the device has reported itself online. Every datalog response is merged
//! into the running frame, which is then numbered, timestamped and
//! recorded.
//!
//! Transport failures reset the device and hold off the failing message
//! type for the configured backoff; short reads, timeouts and mismatched
//! responses abandon just that poll. Schema errors end the session.

use std::io::Write;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{pause, Packet, ProtocolError, Transport};
use crate::config::CaptureConfig;
use crate::frame::DatalogFrame;
use crate::message::{Message, MessageType};
use crate::store::write_frame_store;

/// Upper bound on an idle sleep between passes
const IDLE_SLICE: Duration = Duration::from_millis(5);

/// When a message type is next due, relative to the session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub message_type: MessageType,
    pub interval: Duration,
    pub next_poll: Duration,
}

impl PollSchedule {
    /// Schedule that is due immediately
    pub fn new(message_type: MessageType, interval: Duration) -> Self {
        Self {
            message_type,
            interval,
            next_poll: Duration::ZERO,
        }
    }

    pub fn is_due(&self, elapsed: Duration) -> bool {
        elapsed >= self.next_poll
    }

    /// Push the next poll one interval past `elapsed`
    pub fn reschedule(&mut self, elapsed: Duration) {
        self.next_poll = elapsed + self.interval;
    }

    /// Next poll at `elapsed + backoff`, replacing the regular interval
    pub fn defer(&mut self, elapsed: Duration, backoff: Duration) {
        self.next_poll = elapsed + backoff;
    }
}

/// Outcome of a capture session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Frames recorded
    pub frames: usize,
    /// Session length
    pub duration: Duration,
    /// Poll requests written
    pub polls: usize,
    /// Polls abandoned on a recoverable error
    pub failed_polls: usize,
    /// Device resets after transport failures
    pub resets: usize,
    /// Responses whose bytes did not sum to zero
    pub checksum_errors: usize,
    /// Session ended by cancellation rather than by duration
    pub cancelled: bool,
}

type FrameObserver = Box<dyn FnMut(&DatalogFrame) + Send>;

/// State of one capture session
pub struct CaptureSession<T: Transport> {
    transport: T,
    config: CaptureConfig,
    schedules: Vec<PollSchedule>,
    online: bool,
    frame: DatalogFrame,
    frames: Vec<DatalogFrame>,
    report: CaptureReport,
    cancel: CancellationToken,
    observer: Option<FrameObserver>,
}

impl<T: Transport> CaptureSession<T> {
    pub fn new(transport: T, config: CaptureConfig) -> Self {
        let schedules = MessageType::POLL_ORDER
            .iter()
            .map(|&message_type| PollSchedule::new(message_type, config.interval(message_type)))
            .collect();

        Self {
            transport,
            config,
            schedules,
            online: false,
            frame: DatalogFrame::default(),
            frames: Vec::new(),
            report: CaptureReport::default(),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    /// Use an external cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Call `observer` with every recorded frame
    pub fn on_frame<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&DatalogFrame) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Device has reported online
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// The running composite frame
    pub fn frame(&self) -> &DatalogFrame {
        &self.frame
    }

    /// Frames recorded so far, in capture order
    pub fn frames(&self) -> &[DatalogFrame] {
        &self.frames
    }

    /// Poll timing per message type, in poll order
    pub fn schedules(&self) -> &[PollSchedule] {
        &self.schedules
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Poll the device for one message and decode the response
    pub fn poll(&mut self, message_type: MessageType) -> Result<Message, ProtocolError> {
        self.transport.purge()?;
        self.transport.write_all(&[message_type.id()])?;
        self.report.polls += 1;

        let expected = message_type.frame_size();
        let mut buf = vec![0u8; expected];
        let read = self.transport.read(&mut buf, self.config.read_timeout())?;
        if read == 0 {
            return Err(ProtocolError::Timeout);
        }
        if read < expected {
            return Err(ProtocolError::ShortRead {
                expected,
                actual: read,
            });
        }

        let packet = Packet::from_bytes(&buf)?;
        if !packet.is_checksum_valid() {
            self.report.checksum_errors += 1;
        }
        if packet.message_type != message_type.id() {
            return Err(ProtocolError::UnexpectedResponse {
                expected: message_type.id(),
                actual: packet.message_type,
            });
        }
        if packet.payload.len() != message_type.payload_size() {
            return Err(ProtocolError::LengthMismatch {
                message_type: packet.message_type,
                expected: message_type.payload_size(),
                actual: packet.payload.len(),
            });
        }

        packet.decode()
    }

    /// Fold a decoded message into the session state.
    ///
    /// Status only moves the online flag. Datalog messages update the
    /// running frame, which is numbered, stamped with `elapsed` and
    /// recorded.
    pub fn apply(&mut self, message: &Message, elapsed: Duration) {
        if let Message::Status(status) = message {
            if status.online != self.online {
                info!("Device {}", if status.online { "online" } else { "offline" });
            }
            self.online = status.online;
            return;
        }

        let frame_number = self.frames.len() as i32;
        let time_offset = i32::try_from(elapsed.as_millis()).unwrap_or(i32::MAX);
        self.frame = message
            .apply_to(&self.frame)
            .with_sequence(frame_number, time_offset);
        self.frames.push(self.frame.clone());

        if let Some(observer) = self.observer.as_mut() {
            observer(&self.frame);
        }
    }

    /// One pass over every message type that is due at `elapsed`
    pub fn step(&mut self, elapsed: Duration) -> Result<(), ProtocolError> {
        for index in 0..self.schedules.len() {
            let schedule = self.schedules[index];
            let message_type = schedule.message_type;
            if !schedule.is_due(elapsed) || (message_type.requires_online() && !self.online) {
                continue;
            }
            self.schedules[index].reschedule(elapsed);

            debug!("Polling {}", message_type);
            match self.poll(message_type) {
                Ok(message) => self.apply(&message, elapsed),
                Err(e) if e.is_transport_failure() => {
                    error!("Transport failure polling {}: {}", message_type, e);
                    self.report.failed_polls += 1;
                    self.report.resets += 1;
                    if let Err(reset_err) = self.transport.reset() {
                        error!("Device reset failed: {}", reset_err);
                    }
                    self.schedules[index].defer(elapsed, self.config.reset_backoff());
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Poll for {} abandoned: {}", message_type, e);
                    self.report.failed_polls += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Time until the next poll that could run now
    fn next_due(&self, elapsed: Duration) -> Duration {
        self.schedules
            .iter()
            .filter(|s| self.online || !s.message_type.requires_online())
            .map(|s| s.next_poll.saturating_sub(elapsed))
            .min()
            .unwrap_or(IDLE_SLICE)
    }

    /// Poll until the configured duration elapses or the session is
    /// cancelled
    pub fn run(&mut self) -> Result<CaptureReport, ProtocolError> {
        let start = Instant::now();
        let max_duration = self.config.max_duration();
        info!("Capture started (max {} ms)", max_duration.as_millis());

        loop {
            if self.cancel.is_cancelled() {
                self.report.cancelled = true;
                break;
            }
            let elapsed = start.elapsed();
            if elapsed > max_duration {
                break;
            }

            self.step(elapsed)?;

            let idle = self
                .next_due(start.elapsed())
                .min(max_duration.saturating_sub(start.elapsed()));
            if !idle.is_zero() && !pause(idle.min(IDLE_SLICE), &self.cancel) {
                self.report.cancelled = true;
                break;
            }
        }

        self.report.duration = start.elapsed();
        self.report.frames = self.frames.len();
        info!(
            "Capture finished: {} frames in {} ms",
            self.report.frames,
            self.report.duration.as_millis()
        );
        Ok(self.report.clone())
    }

    /// Write the recorded frames as a datalog file
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<(), ProtocolError> {
        write_frame_store(sink, &self.frames, self.report.duration)?;
        Ok(())
    }
}

/// Capture for `max_duration`, then write the datalog to `sink`
pub fn capture<T: Transport, W: Write>(
    transport: T,
    sink: &mut W,
    max_duration: Duration,
) -> Result<CaptureReport, ProtocolError> {
    let config = CaptureConfig {
        max_duration_ms: max_duration.as_millis() as u64,
        ..Default::default()
    };
    let mut session = CaptureSession::new(transport, config);
    let report = session.run()?;
    session.write_to(sink)?;
    Ok(report)
}
