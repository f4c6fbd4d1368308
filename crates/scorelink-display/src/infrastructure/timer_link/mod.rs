//! Serial timer peripheral link.
//!
//! The peripheral is optional: the display probes candidate ports, and when
//! no device answers the feature is silently unavailable — never an error the
//! user has to deal with.
//!
//! # Port seam
//!
//! All serial I/O goes through the [`TimerPort`] and [`PortScanner`] traits.
//! The native implementations in [`serial`] wrap the `serialport` crate; the
//! mocks in [`mock`] are always compiled so every piece of handshake and
//! dispatch logic is testable without a physical device.
//!
//! # Handshake
//!
//! For each candidate port (platform name pattern, already-open port
//! excluded): open at the fixed baud rate with 8 data bits, wait a fixed
//! settle delay (opening the port resets the peripheral), send a framed
//! AreYouThere, and give the device a bounded window to answer. No valid
//! reply → close the port, try the next candidate. All candidates exhausted
//! → `LinkEvent::Unavailable`.
//!
//! # Threading
//!
//! The link runs as one blocking thread (serial reads are synchronous) and
//! forwards events to the async world over an `mpsc` channel, mirroring the
//! discovery listener threads. There is no mid-flight cancellation: the
//! thread runs to handshake success, exhaustion, or explicit shutdown via
//! the shared running flag.

pub mod mock;
pub mod serial;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc as std_mpsc, Arc,
};
use std::time::{Duration, Instant};

use scorelink_core::timer::command::{format_clock, TimerCommand};
use scorelink_core::timer::frame::FrameBuffer;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Error type for link operations initiated from the application side.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    /// No port is open; the request was not queued.
    #[error("timer port is not open")]
    NotOpen,

    /// A candidate port could not be opened.
    #[error("failed to open port {port}: {message}")]
    Open { port: String, message: String },
}

/// Byte-stream port the peripheral is attached to.
pub trait TimerPort: Send {
    /// Reads available bytes, returning `Ok(0)` on a read timeout.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Writes the complete buffer.
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Flushes pending output.
    fn flush(&mut self) -> std::io::Result<()>;

    /// Discards any unread input (the pending-response buffer).
    fn clear_input(&mut self) -> std::io::Result<()>;
}

/// Enumerates and opens candidate ports.
pub trait PortScanner: Send {
    /// Candidate port names matching the platform pattern, excluding
    /// `exclude` (the port this link already holds or just abandoned).
    fn candidate_ports(&self, exclude: Option<&str>) -> Vec<String>;

    /// Opens `name` at `baud` with 8 data bits.
    fn open(&self, name: &str, baud: u32) -> Result<Box<dyn TimerPort>, LinkError>;
}

/// Fixed link timings. Only the settle delay is configurable; baud and the
/// response window are protocol constants surfaced for tests.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Serial speed; the peripheral always talks at 115200.
    pub baud: u32,
    /// Delay after opening a port: the device resets and must boot before it
    /// can answer.
    pub settle: Duration,
    /// Bounded window for the handshake reply.
    pub response_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            settle: Duration::from_millis(2000),
            response_timeout: Duration::from_millis(1000),
        }
    }
}

/// Events emitted by the link thread to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake succeeded on this port.
    Connected { port: String },
    /// A Time frame arrived; the payload is already formatted clock text.
    ClockText(String),
    /// Every candidate was exhausted; the timer feature is disabled.
    Unavailable,
    /// The link thread has shut the port down and exited.
    Closed,
}

/// Why the receive loop returned.
enum ExitReason {
    /// The running flag cleared; shut down and stop.
    Shutdown,
    /// The port failed mid-stream; a redial may be attempted.
    PortError,
}

/// Handle for talking to the link thread.
pub struct PeripheralLink {
    outbound: std_mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PeripheralLink {
    /// Starts the link thread: probes candidates, then pumps frames until
    /// `running` clears. Events arrive on `events`.
    pub fn start(
        scanner: Box<dyn PortScanner>,
        config: LinkConfig,
        events: mpsc::Sender<LinkEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = std_mpsc::channel::<Vec<u8>>();
        let connected = Arc::new(AtomicBool::new(false));
        let connected_clone = Arc::clone(&connected);

        let thread = std::thread::Builder::new()
            .name("timer-link".to_string())
            .spawn(move || {
                link_thread(scanner, config, events, running, connected_clone, outbound_rx);
            })
            .expect("failed to spawn timer link thread");

        Self {
            outbound: outbound_tx,
            connected,
            thread: Some(thread),
        }
    }

    /// True once the handshake has succeeded and until the link closes.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Queues a raw frame for the peripheral. The link thread clears the
    /// pending-response buffer before writing; completion is asynchronous.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotOpen`] when no port is open.
    pub fn write_request(&self, frame: Vec<u8>) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotOpen);
        }
        self.outbound.send(frame).map_err(|_| LinkError::NotOpen)
    }

    /// Waits for the link thread to finish (after the running flag clears).
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Top-level flow on the link thread: handshake, pump, redial once on a port
/// error, shut down.
fn link_thread(
    scanner: Box<dyn PortScanner>,
    config: LinkConfig,
    events: mpsc::Sender<LinkEvent>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    outbound: std_mpsc::Receiver<Vec<u8>>,
) {
    let mut exclude: Option<String> = None;

    while running.load(Ordering::Relaxed) {
        let Some((name, mut port)) = handshake(scanner.as_ref(), &config, &running, exclude.as_deref())
        else {
            debug!("no timer peripheral found; feature unavailable");
            let _ = events.blocking_send(LinkEvent::Unavailable);
            return;
        };

        info!("timer peripheral connected on {name}");
        connected.store(true, Ordering::Relaxed);
        let _ = events.blocking_send(LinkEvent::Connected { port: name.clone() });

        let reason = receive_loop(port.as_mut(), &events, &running, &outbound);
        connected.store(false, Ordering::Relaxed);

        match reason {
            ExitReason::Shutdown => {
                shutdown(port.as_mut(), &config);
                let _ = events.blocking_send(LinkEvent::Closed);
                return;
            }
            ExitReason::PortError => {
                // Redial, skipping the port that just died.
                warn!("timer port {name} failed; redialing");
                exclude = Some(name);
            }
        }
    }
}

/// Probes each candidate port in turn until one answers AreYouThere.
fn handshake(
    scanner: &dyn PortScanner,
    config: &LinkConfig,
    running: &Arc<AtomicBool>,
    exclude: Option<&str>,
) -> Option<(String, Box<dyn TimerPort>)> {
    for name in scanner.candidate_ports(exclude) {
        if !running.load(Ordering::Relaxed) {
            return None;
        }

        let mut port = match scanner.open(&name, config.baud) {
            Ok(port) => port,
            Err(e) => {
                debug!("cannot open candidate {name}: {e}");
                continue;
            }
        };

        // Opening the port resets the device; give it time to boot.
        std::thread::sleep(config.settle);
        let _ = port.clear_input();

        if let Err(e) = port.write_all(&TimerCommand::AreYouThere.encode()) {
            debug!("probe write failed on {name}: {e}");
            continue;
        }
        let _ = port.flush();

        if await_handshake_reply(port.as_mut(), config.response_timeout) {
            return Some((name, port));
        }
        debug!("no handshake reply on {name} within {:?}", config.response_timeout);
        // Port is dropped (closed) here before trying the next candidate.
    }
    None
}

/// Waits up to `timeout` for a valid AreYouThere reply.
fn await_handshake_reply(port: &mut dyn TimerPort, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut frames = FrameBuffer::new();
    let mut buf = [0u8; 256];

    while Instant::now() < deadline {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                frames.extend(&buf[..n]);
                while let Some(frame) = frames.next_frame() {
                    match TimerCommand::decode(&frame) {
                        Ok(TimerCommand::AreYouThere) => return true,
                        Ok(other) => debug!("ignoring {other:?} during handshake"),
                        Err(e) => debug!("undecodable frame during handshake: {e}"),
                    }
                }
            }
            Err(_) => return false,
        }
    }
    false
}

/// Pumps inbound frames and queued outbound requests until shutdown or a
/// port error.
fn receive_loop(
    port: &mut dyn TimerPort,
    events: &mpsc::Sender<LinkEvent>,
    running: &Arc<AtomicBool>,
    outbound: &std_mpsc::Receiver<Vec<u8>>,
) -> ExitReason {
    // Rolling frame buffer; lives as long as this port is open and is
    // cleared before each outbound request.
    let mut frames = FrameBuffer::new();
    let mut buf = [0u8; 512];

    loop {
        if !running.load(Ordering::Relaxed) {
            return ExitReason::Shutdown;
        }

        // Drain queued requests first: clear the pending-response buffer so
        // the reply is not mixed with stale frames.
        while let Ok(request) = outbound.try_recv() {
            let _ = port.clear_input();
            frames.clear();
            if let Err(e) = port.write_all(&request) {
                warn!("timer request write failed: {e}");
                return ExitReason::PortError;
            }
        }

        match port.read(&mut buf) {
            Ok(0) => continue, // read timeout tick
            Ok(n) => {
                frames.extend(&buf[..n]);
                while let Some(frame) = frames.next_frame() {
                    dispatch_frame(&frame, events);
                }
            }
            Err(e) => {
                warn!("timer port read error: {e}");
                return ExitReason::PortError;
            }
        }
    }
}

/// Routes one decoded frame to the application layer.
fn dispatch_frame(frame: &scorelink_core::timer::frame::RawFrame, events: &mpsc::Sender<LinkEvent>) {
    match TimerCommand::decode(frame) {
        Ok(TimerCommand::Time(hundredths)) => {
            let _ = events.blocking_send(LinkEvent::ClockText(format_clock(hundredths)));
        }
        Ok(TimerCommand::AreYouThere) => debug!("late handshake echo"),
        Ok(TimerCommand::Configure(bytes)) => debug!("peripheral configure: {bytes:02X?}"),
        Ok(TimerCommand::StopSending) => debug!("peripheral echoed stop-sending"),
        Err(e) => warn!("undecodable timer frame: {e}"),
    }
}

/// Orderly close: tell the peripheral to stop, let the write drain, let the
/// device settle, then clear and drop the port.
fn shutdown(port: &mut dyn TimerPort, config: &LinkConfig) {
    let _ = port.write_all(&TimerCommand::StopSending.encode());
    let _ = port.flush();
    std::thread::sleep(Duration::from_millis(100));
    std::thread::sleep(config.settle.min(Duration::from_millis(500)));
    let _ = port.clear_input();
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::{MockPortPlan, MockScanner};
    use super::*;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            baud: 115_200,
            settle: Duration::from_millis(1),
            response_timeout: Duration::from_millis(50),
        }
    }

    async fn drain_until(
        rx: &mut mpsc::Receiver<LinkEvent>,
        predicate: impl Fn(&LinkEvent) -> bool,
    ) -> LinkEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("event within deadline")
                .expect("channel open");
            if predicate(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_handshake_connects_to_replying_port() {
        // Arrange: one port that answers the probe
        let scanner = MockScanner::new(vec![(
            "mock0".to_string(),
            MockPortPlan::replies(vec![TimerCommand::AreYouThere.encode()]),
        )]);
        let (tx, mut rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        // Act
        let link = PeripheralLink::start(Box::new(scanner), fast_config(), tx, Arc::clone(&running));
        let event = drain_until(&mut rx, |e| matches!(e, LinkEvent::Connected { .. })).await;

        // Assert
        assert_eq!(
            event,
            LinkEvent::Connected {
                port: "mock0".to_string()
            }
        );
        assert!(link.is_connected());

        running.store(false, Ordering::Relaxed);
        link.join();
    }

    #[tokio::test]
    async fn test_silent_port_is_skipped_for_next_candidate() {
        // Arrange: first port never answers, second one does
        let scanner = MockScanner::new(vec![
            ("dead0".to_string(), MockPortPlan::silent()),
            (
                "mock1".to_string(),
                MockPortPlan::replies(vec![TimerCommand::AreYouThere.encode()]),
            ),
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        // Act
        let link = PeripheralLink::start(Box::new(scanner), fast_config(), tx, Arc::clone(&running));
        let event = drain_until(&mut rx, |e| matches!(e, LinkEvent::Connected { .. })).await;

        // Assert — the timeout on dead0 advanced the probe to mock1
        assert_eq!(
            event,
            LinkEvent::Connected {
                port: "mock1".to_string()
            }
        );

        running.store(false, Ordering::Relaxed);
        link.join();
    }

    #[tokio::test]
    async fn test_exhausted_candidates_report_unavailable() {
        // Arrange: every candidate is silent
        let scanner = MockScanner::new(vec![
            ("dead0".to_string(), MockPortPlan::silent()),
            ("dead1".to_string(), MockPortPlan::silent()),
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        // Act
        let link = PeripheralLink::start(Box::new(scanner), fast_config(), tx, running);
        let event = drain_until(&mut rx, |e| matches!(e, LinkEvent::Unavailable)).await;

        // Assert — non-fatal: the feature just is not there
        assert_eq!(event, LinkEvent::Unavailable);
        assert!(!link.is_connected());
        link.join();
    }

    #[tokio::test]
    async fn test_unopenable_port_advances_to_next_candidate() {
        let scanner = MockScanner::new(vec![
            ("broken".to_string(), MockPortPlan::unopenable()),
            (
                "mock1".to_string(),
                MockPortPlan::replies(vec![TimerCommand::AreYouThere.encode()]),
            ),
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        let link = PeripheralLink::start(Box::new(scanner), fast_config(), tx, Arc::clone(&running));
        let event = drain_until(&mut rx, |e| matches!(e, LinkEvent::Connected { .. })).await;

        assert_eq!(
            event,
            LinkEvent::Connected {
                port: "mock1".to_string()
            }
        );
        running.store(false, Ordering::Relaxed);
        link.join();
    }

    #[tokio::test]
    async fn test_time_frames_become_clock_text_events() {
        // Arrange: handshake reply followed by two Time frames
        let scanner = MockScanner::new(vec![(
            "mock0".to_string(),
            MockPortPlan::replies(vec![
                TimerCommand::AreYouThere.encode(),
                TimerCommand::Time(5999).encode(),
                TimerCommand::Time(6001).encode(),
            ]),
        )]);
        let (tx, mut rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        // Act
        let link = PeripheralLink::start(Box::new(scanner), fast_config(), tx, Arc::clone(&running));
        let first = drain_until(&mut rx, |e| matches!(e, LinkEvent::ClockText(_))).await;
        let second = drain_until(&mut rx, |e| matches!(e, LinkEvent::ClockText(_))).await;

        // Assert — SS:HH below a minute, biased MM:SS above
        assert_eq!(first, LinkEvent::ClockText("59:99".to_string()));
        assert_eq!(second, LinkEvent::ClockText("01:01".to_string()));

        running.store(false, Ordering::Relaxed);
        link.join();
    }

    #[tokio::test]
    async fn test_write_request_fails_when_not_connected() {
        // Arrange: no candidates at all
        let scanner = MockScanner::new(vec![]);
        let (tx, mut rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        let link = PeripheralLink::start(Box::new(scanner), fast_config(), tx, running);
        drain_until(&mut rx, |e| matches!(e, LinkEvent::Unavailable)).await;

        // Act / Assert
        assert_eq!(
            link.write_request(TimerCommand::Configure(vec![1]).encode()),
            Err(LinkError::NotOpen)
        );
        link.join();
    }

    #[tokio::test]
    async fn test_shutdown_sends_stop_sending() {
        // Arrange
        let plan = MockPortPlan::replies(vec![TimerCommand::AreYouThere.encode()]);
        let written = plan.written();
        let scanner = MockScanner::new(vec![("mock0".to_string(), plan)]);
        let (tx, mut rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        let link = PeripheralLink::start(Box::new(scanner), fast_config(), tx, Arc::clone(&running));
        drain_until(&mut rx, |e| matches!(e, LinkEvent::Connected { .. })).await;

        // Act
        running.store(false, Ordering::Relaxed);
        drain_until(&mut rx, |e| matches!(e, LinkEvent::Closed)).await;
        link.join();

        // Assert — the very last frame on the wire is StopSending
        let bytes = written.lock().unwrap();
        let stop = TimerCommand::StopSending.encode();
        assert!(
            bytes.ends_with(&stop),
            "stop-sending must be the final write, got {bytes:02X?}"
        );
    }
}
