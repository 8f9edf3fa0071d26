//! Replay: present a stored datalog as if it were a live device
//!
//! Frames are played in file order, each becoming current at
//! `start + time_offset`. While waiting, incoming poll bytes are answered
//! from the current frame: Status always reports online, datalog requests
//! are built from the frame with [`Message::for_request`]. Unknown request
//! codes are logged and left unanswered.
//!
//! Transport errors end the replay; there is no device to recover.

use std::io::Read;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Packet, ProtocolError, Transport};
use crate::config::ReplayConfig;
use crate::frame::DatalogFrame;
use crate::message::{Message, MessageType};
use crate::store::FrameStoreReader;

/// Outcome of a replay session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Frames that became current
    pub frames_played: usize,
    /// Requests answered
    pub requests_served: usize,
    /// Requests with an unknown type code
    pub unknown_requests: usize,
    /// Time from the playback clock starting to the last frame
    pub duration: Duration,
    /// Session ended by cancellation
    pub cancelled: bool,
}

type FrameObserver = Box<dyn FnMut(&DatalogFrame) + Send>;

/// State of one replay session
pub struct ReplaySession<T: Transport> {
    transport: T,
    config: ReplayConfig,
    current: DatalogFrame,
    report: ReplayReport,
    cancel: CancellationToken,
    observer: Option<FrameObserver>,
}

impl<T: Transport> ReplaySession<T> {
    pub fn new(transport: T, config: ReplayConfig) -> Self {
        Self {
            transport,
            config,
            current: DatalogFrame::default(),
            report: ReplayReport::default(),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    /// Use an external cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Call `observer` each time a new frame becomes current
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

    /// Frame requests are currently answered from
    pub fn current_frame(&self) -> &DatalogFrame {
        &self.current
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Wait up to `timeout` for one request byte and answer it.
    ///
    /// Returns the type that was answered, if any.
    pub fn serve_request(&mut self, timeout: Duration) -> Result<Option<MessageType>, ProtocolError> {
        let mut request = [0u8; 1];
        if self.transport.read(&mut request, timeout)? == 0 {
            return Ok(None);
        }

        let Some(message_type) = MessageType::from_id(request[0]) else {
            warn!("Requested unknown message type 0x{:02X}", request[0]);
            self.report.unknown_requests += 1;
            return Ok(None);
        };

        let response = Packet::from_message(&Message::for_request(message_type, &self.current))?;
        self.transport.write_all(&response.to_bytes())?;
        self.report.requests_served += 1;
        debug!("Answered {}", message_type);
        Ok(Some(message_type))
    }

    /// Answer requests until `deadline`. Returns `false` if cancelled.
    fn serve_until(&mut self, deadline: Instant) -> Result<bool, ProtocolError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(true);
            }
            self.serve_request(remaining.min(self.config.request_timeout()))?;
        }
    }

    /// Answer requests from the empty frame until a datalog request
    /// arrives. Returns `false` if cancelled.
    fn wait_for_poller(&mut self) -> Result<bool, ProtocolError> {
        info!("Waiting for a datalog request");
        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            let timeout = self.config.request_timeout();
            if let Some(message_type) = self.serve_request(timeout)? {
                if message_type.requires_online() {
                    return Ok(true);
                }
            }
        }
    }

    /// Play a stored datalog to completion
    pub fn run<R: Read>(&mut self, source: R) -> Result<ReplayReport, ProtocolError> {
        let mut frames = FrameStoreReader::open(source)?;
        info!(
            "Replaying {} frames ({} ms)",
            frames.header().number_of_frames,
            frames.header().duration_ms
        );

        if self.config.start_on_request && !self.wait_for_poller()? {
            self.report.cancelled = true;
            return Ok(self.report.clone());
        }
        let start = Instant::now();

        while let Some(frame) = frames.next_frame()? {
            let offset = Duration::from_millis(frame.time_offset.max(0) as u64);
            if !self.serve_until(start + offset)? {
                self.report.cancelled = true;
                break;
            }

            self.current = frame;
            self.report.frames_played += 1;
            if let Some(observer) = self.observer.as_mut() {
                observer(&self.current);
            }

            let timeout = self.config.request_timeout();
            self.serve_request(timeout)?;
        }

        self.report.duration = start.elapsed();
        info!(
            "Replay finished: {} frames, {} requests answered",
            self.report.frames_played, self.report.requests_served
        );
        Ok(self.report.clone())
    }
}

/// Replay a stored datalog with default settings
pub fn replay<T: Transport, R: Read>(transport: T, source: R) -> Result<ReplayReport, ProtocolError> {
    ReplaySession::new(transport, ReplayConfig::default()).run(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedPoller {
        requests: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl Transport for ScriptedPoller {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, ProtocolError> {
            match self.requests.pop_front() {
                Some(b) if !buf.is_empty() => {
                    buf[0] = b;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }

        fn purge(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[test]
    fn test_status_request_answers_online() {
        let poller = ScriptedPoller {
            requests: VecDeque::from([0x40]),
            ..Default::default()
        };
        let mut session = ReplaySession::new(poller, ReplayConfig::default());

        let answered = session.serve_request(Duration::ZERO).unwrap();
        assert_eq!(answered, Some(MessageType::Status));

        let written = &session.transport_mut().written;
        assert_eq!(written.len(), 33);
        assert_eq!(&written[..2], &[0x40, 30]);
        assert_eq!(written[2 + 13], 1);
    }

    #[test]
    fn test_unknown_request_is_ignored() {
        let poller = ScriptedPoller {
            requests: VecDeque::from([0x41]),
            ..Default::default()
        };
        let mut session = ReplaySession::new(poller, ReplayConfig::default());

        assert_eq!(session.serve_request(Duration::ZERO).unwrap(), None);
        assert!(session.transport_mut().written.is_empty());
        assert_eq!(session.report.unknown_requests, 1);
    }
}
