//! Wired serial transport.
//!
//! Direct USB/RS-232 connection to the drawing device. The transport owns
//! the open port behind a mutex; a background receive thread polls for
//! device chatter while the streaming drain task writes paced command
//! lines. Supports port enumeration filtered to plausible controller
//! devices.

use crate::streamer::{stream_job, LineWriter, WriteError};
use crate::transport::{
    DeviceInfo, DeviceTransport, EventSender, StreamTiming, TransportEvent, RECEIVE_BUFFER_LINES,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use plotkit_core::{DeviceError, Result};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Baud rate used for all wired links.
const BAUD_RATE: u32 = 115_200;

/// How often the receive thread polls the port.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ordered emergency stop sequence for wired firmware: soft-reset control
/// byte, feed hold, emergency stop, pause, spindle off, firmware restart.
/// Individual failures are tolerated.
const SERIAL_STOP_SEQUENCE: [&[u8]; 6] = [&[0x18], b"!\n", b"M112\n", b"M0\n", b"M5\n", b"M999\n"];

/// Object-safety trait for the raw link, so tests and virtual ports can
/// substitute an in-memory implementation.
pub trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

type SharedLink = Arc<Mutex<Option<Box<dyn ReadWrite>>>>;

/// List serial ports that look like drawing-device controllers.
///
/// Patterns, per platform:
/// - Windows: `COM*`
/// - Linux: `/dev/ttyUSB*`, `/dev/ttyACM*`
/// - macOS: `/dev/cu.usbserial-*`, `/dev/cu.usbmodem*`
pub fn list_ports() -> Result<Vec<DeviceInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .filter(|port| is_plotter_port(&port.port_name))
            .map(|port| DeviceInfo {
                id: port.port_name.clone(),
                name: format!("{} - {}", port.port_name, describe_port(port)),
            })
            .collect()),
        Err(e) => {
            tracing::error!(error = %e, "failed to enumerate serial ports");
            Err(DeviceError::other(format!("failed to enumerate ports: {e}")).into())
        }
    }
}

fn is_plotter_port(port_name: &str) -> bool {
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }
    if port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }
    false
}

fn describe_port(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Wired serial transport.
pub struct SerialTransport {
    link: SharedLink,
    connected: Arc<AtomicBool>,
    sending: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    stop_receive: Arc<AtomicBool>,
    received: Arc<Mutex<VecDeque<String>>>,
    events: EventSender,
    timing: StreamTiming,
}

impl SerialTransport {
    /// Create a transport reporting on the given event channel.
    pub fn new(events: EventSender) -> Self {
        Self::with_timing(events, StreamTiming::serial())
    }

    /// Create a transport with explicit timing (tests, slow devices).
    pub fn with_timing(events: EventSender, timing: StreamTiming) -> Self {
        Self {
            link: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            sending: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            stop_receive: Arc::new(AtomicBool::new(false)),
            received: Arc::new(Mutex::new(VecDeque::new())),
            events,
            timing,
        }
    }

    /// Attach an already-open link and mark the transport connected.
    /// `connect` does this for real hardware; this entry point serves
    /// virtual ports and tests.
    pub fn attach_link(&self, link: Box<dyn ReadWrite>) {
        *self.link.lock() = Some(link);
        self.stop_receive.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        self.start_receive_loop();
    }

    /// Start the background receive thread: poll for bytes, decode
    /// tolerating errors, timestamp, retain the most recent lines, forward
    /// each on the event channel.
    fn start_receive_loop(&self) {
        let link = self.link.clone();
        let stop = self.stop_receive.clone();
        let received = self.received.clone();
        let events = self.events.clone();

        std::thread::spawn(move || {
            let mut pending = String::new();
            let mut buf = [0u8; 512];

            while !stop.load(Ordering::SeqCst) {
                let read = {
                    let mut guard = link.lock();
                    match guard.as_mut() {
                        Some(port) => port.read(&mut buf),
                        None => break,
                    }
                };

                match read {
                    Ok(0) => {}
                    Ok(n) => {
                        pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                        while let Some(pos) = pending.find('\n') {
                            let line = pending[..pos].trim().to_string();
                            pending.drain(..=pos);
                            if line.is_empty() {
                                continue;
                            }
                            let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
                            {
                                let mut lines = received.lock();
                                lines.push_back(format!("[{timestamp}] {line}"));
                                while lines.len() > RECEIVE_BUFFER_LINES {
                                    lines.pop_front();
                                }
                            }
                            tracing::debug!(%line, "received from device");
                            let _ = events.send(TransportEvent::LineReceived { timestamp, line });
                        }
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::TimedOut
                                | std::io::ErrorKind::WouldBlock
                                | std::io::ErrorKind::Interrupted
                        ) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "receive loop stopped: link error");
                        break;
                    }
                }

                std::thread::sleep(RECEIVE_POLL_INTERVAL);
            }
        });
    }

    /// Read and discard whatever the device has queued up.
    fn discard_unread_input(&self) {
        let mut guard = self.link.lock();
        if let Some(port) = guard.as_mut() {
            let mut buf = [0u8; 256];
            while let Ok(n) = port.read(&mut buf) {
                if n == 0 {
                    break;
                }
            }
        }
    }
}

struct SerialLineWriter {
    link: SharedLink,
}

#[async_trait]
impl LineWriter for SerialLineWriter {
    async fn write_line(&self, line: &str) -> std::result::Result<(), WriteError> {
        let mut guard = self.link.lock();
        let port = guard
            .as_mut()
            .ok_or_else(|| WriteError::Link("port closed".to_string()))?;
        let data = format!("{line}\n");
        port.write_all(data.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                    WriteError::Timeout(e.to_string())
                }
                _ => WriteError::Link(e.to_string()),
            })
    }
}

#[async_trait]
impl DeviceTransport for SerialTransport {
    async fn connect(&self, target: &str) -> Result<String> {
        let was_connected = self.connected.load(Ordering::SeqCst);
        if was_connected {
            let _ = self.disconnect().await;
        }

        let port = serialport::new(target, BAUD_RATE)
            .timeout(Duration::from_millis(50))
            .open_native()
            .map_err(|e| {
                tracing::warn!(port = target, error = %e, "failed to open serial port");
                DeviceError::ConnectionFailed {
                    target: target.to_string(),
                    reason: e.to_string(),
                }
            })?;

        self.attach_link(Box::new(port));
        tracing::info!(port = target, baud = BAUD_RATE, "serial connection established");
        Ok(format!("connected to {target}"))
    }

    async fn disconnect(&self) -> Result<String> {
        self.cancel.store(true, Ordering::SeqCst);
        self.stop_receive.store(true, Ordering::SeqCst);
        *self.link.lock() = None;

        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            tracing::info!("serial connection closed");
            Ok("disconnected".to_string())
        } else {
            Ok("already disconnected".to_string())
        }
    }

    async fn send(&self, lines: Vec<String>) -> Result<String> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected.into());
        }
        if self.sending.swap(true, Ordering::SeqCst) {
            tracing::warn!("send rejected: a job is already streaming");
            return Err(DeviceError::Busy.into());
        }
        self.cancel.store(false, Ordering::SeqCst);

        let writer: Arc<dyn LineWriter> = Arc::new(SerialLineWriter {
            link: self.link.clone(),
        });
        let cancel = self.cancel.clone();
        let sending = self.sending.clone();
        let events = self.events.clone();
        let timing = self.timing.clone();
        let total = lines.len();

        tokio::spawn(async move {
            stream_job(writer, lines, cancel, events, timing).await;
            sending.store(false, Ordering::SeqCst);
        });

        Ok(format!("streaming {total} lines"))
    }

    async fn emergency_stop(&self) -> Result<String> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected.into());
        }

        // The flag goes first so the drain loop stops feeding the device
        // before the stop commands race it to the wire.
        self.cancel.store(true, Ordering::SeqCst);

        let mut accepted = 0usize;
        for sequence in SERIAL_STOP_SEQUENCE {
            let ok = {
                let mut guard = self.link.lock();
                match guard.as_mut() {
                    Some(port) => port.write_all(sequence).and_then(|_| port.flush()).is_ok(),
                    None => false,
                }
            };
            if ok {
                accepted += 1;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.discard_unread_input();

        if accepted > 0 {
            tracing::warn!(
                accepted,
                total = SERIAL_STOP_SEQUENCE.len(),
                "emergency stop transmitted"
            );
            Ok(format!(
                "emergency stop sent ({accepted}/{} commands accepted)",
                SERIAL_STOP_SEQUENCE.len()
            ))
        } else {
            Err(DeviceError::StopFailed {
                reason: "no stop command was accepted".to_string(),
            }
            .into())
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn received_lines(&self) -> Vec<String> {
        self.received.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::time::timeout;

    /// In-memory link recording everything written; reads report no data.
    #[derive(Clone)]
    struct MockLink {
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl MockLink {
        fn new() -> Self {
            Self {
                written: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn written_text(&self) -> String {
            String::from_utf8_lossy(&self.written.lock()).to_string()
        }
    }

    impl Read for MockLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"))
        }
    }

    impl Write for MockLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Link whose writes always time out.
    struct TimeoutLink;

    impl Read for TimeoutLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"))
        }
    }

    impl Write for TimeoutLink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Link that fails hard on every write.
    struct BrokenLink;

    impl Read for BrokenLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"))
        }
    }

    impl Write for BrokenLink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Link that yields a canned burst of incoming data once.
    struct ChatterLink {
        incoming: Option<Vec<u8>>,
    }

    impl Read for ChatterLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.incoming.take() {
                Some(data) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no data")),
            }
        }
    }

    impl Write for ChatterLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn fast_timing() -> StreamTiming {
        StreamTiming {
            connect_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_millis(100),
            line_delay: Duration::from_millis(1),
            init_delay: Duration::from_millis(1),
        }
    }

    async fn wait_for_terminal(rx: &mut crate::transport::EventReceiver) -> TransportEvent {
        timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(
                        event @ (TransportEvent::Completed { .. }
                        | TransportEvent::Cancelled { .. }
                        | TransportEvent::Failed { .. }),
                    ) => return event,
                    Some(_) => {}
                    None => panic!("event channel closed before a terminal event"),
                }
            }
        })
        .await
        .expect("no terminal event within 10s")
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SerialTransport::with_timing(tx, fast_timing());
        let result = transport.send(vec!["G21".to_string()]).await;
        assert!(matches!(
            result,
            Err(plotkit_core::Error::Device(DeviceError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_send_streams_init_payload_trailer() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SerialTransport::with_timing(tx, fast_timing());
        let link = MockLink::new();
        transport.attach_link(Box::new(link.clone()));

        let lines = vec![
            "G1 X1 Y1 F800".to_string(),
            "".to_string(),
            "; a comment".to_string(),
            "(setup)".to_string(),
            "G1 X2 Y2 F800".to_string(),
        ];
        transport.send(lines).await.unwrap();

        match wait_for_terminal(&mut rx).await {
            TransportEvent::Completed { sent, errors } => {
                assert_eq!(sent, 2);
                assert_eq!(errors, 0);
            }
            other => panic!("expected Completed, got {other:?}"),
        }

        assert_eq!(
            link.written_text(),
            "M110 N0\nG90\nG21\nG1 X1 Y1 F800\nG1 X2 Y2 F800\nG0 X0 Y0 F1500\nM30\n"
        );

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_send_rejected_while_busy() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let timing = StreamTiming {
            line_delay: Duration::from_millis(20),
            ..fast_timing()
        };
        let transport = SerialTransport::with_timing(tx, timing);
        let link = MockLink::new();
        transport.attach_link(Box::new(link.clone()));

        let job: Vec<String> = (0..50).map(|i| format!("G1 X{i} Y0 F800")).collect();
        transport.send(job).await.unwrap();

        let second = transport.send(vec!["G21".to_string()]).await;
        assert!(second.err().expect("second send must fail").is_busy());

        // The first job is unaffected by the rejection.
        match wait_for_terminal(&mut rx).await {
            TransportEvent::Completed { sent, .. } => assert_eq!(sent, 50),
            other => panic!("expected Completed, got {other:?}"),
        }

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_emergency_stop_cancels_mid_stream() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let timing = StreamTiming {
            line_delay: Duration::from_millis(20),
            ..fast_timing()
        };
        let transport = SerialTransport::with_timing(tx, timing);
        let link = MockLink::new();
        transport.attach_link(Box::new(link.clone()));

        let job: Vec<String> = (0..100).map(|i| format!("G1 X{i} Y0 F800")).collect();
        transport.send(job).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let message = transport.emergency_stop().await.unwrap();
        assert!(message.contains("emergency stop"));

        match wait_for_terminal(&mut rx).await {
            TransportEvent::Cancelled { sent } => assert!(sent < 100, "sent {sent} of 100"),
            other => panic!("expected Cancelled, got {other:?}"),
        }

        let written = link.written_text();
        assert!(written.contains("M112"), "stop command missing:\n{written}");
        assert!(written.contains('\u{18}'), "control byte missing");
        assert!(!written.contains("M30"), "trailer must be skipped:\n{written}");
        assert!(!written.contains("G0 X0 Y0 F1500"));

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_timeouts_counted_but_not_fatal() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SerialTransport::with_timing(tx, fast_timing());
        transport.attach_link(Box::new(TimeoutLink));

        let job: Vec<String> = (0..3).map(|i| format!("G1 X{i} Y0 F800")).collect();
        transport.send(job).await.unwrap();

        match wait_for_terminal(&mut rx).await {
            TransportEvent::Completed { sent, errors } => {
                assert_eq!(sent, 3);
                assert_eq!(errors, 3);
            }
            other => panic!("expected Completed, got {other:?}"),
        }

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_hard_link_failure_aborts_stream() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SerialTransport::with_timing(tx, fast_timing());
        transport.attach_link(Box::new(BrokenLink));

        let job: Vec<String> = (0..10).map(|i| format!("G1 X{i} Y0 F800")).collect();
        transport.send(job).await.unwrap();

        match wait_for_terminal(&mut rx).await {
            TransportEvent::Failed { message } => {
                assert!(message.contains("link lost"), "{message}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SerialTransport::with_timing(tx, fast_timing());
        transport.attach_link(Box::new(MockLink::new()));

        assert_eq!(transport.disconnect().await.unwrap(), "disconnected");
        assert_eq!(
            transport.disconnect().await.unwrap(),
            "already disconnected"
        );
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_receive_loop_buffers_and_forwards_lines() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SerialTransport::with_timing(tx, fast_timing());

        // 25 incoming lines: the buffer keeps only the most recent 20.
        let burst: String = (0..25).map(|i| format!("ok {i}\n")).collect();
        transport.attach_link(Box::new(ChatterLink {
            incoming: Some(burst.into_bytes()),
        }));

        let first = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no received line within 5s")
            .unwrap();
        match first {
            TransportEvent::LineReceived { line, timestamp } => {
                assert_eq!(line, "ok 0");
                assert_eq!(timestamp.len(), "HH:MM:SS".len());
            }
            other => panic!("expected LineReceived, got {other:?}"),
        }

        // Drain the rest so the bounded buffer has settled.
        for _ in 0..24 {
            let _ = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        }

        let lines = transport.received_lines();
        assert_eq!(lines.len(), RECEIVE_BUFFER_LINES);
        assert!(lines[0].ends_with("ok 5"), "oldest kept line: {}", lines[0]);
        assert!(lines[19].ends_with("ok 24"));

        transport.disconnect().await.unwrap();
    }

    #[test]
    fn test_port_name_filter() {
        assert!(is_plotter_port("COM3"));
        assert!(is_plotter_port("/dev/ttyUSB0"));
        assert!(is_plotter_port("/dev/ttyACM1"));
        assert!(is_plotter_port("/dev/cu.usbmodem14101"));
        assert!(!is_plotter_port("/dev/ttyS0"));
        assert!(!is_plotter_port("COMX"));
    }
}
