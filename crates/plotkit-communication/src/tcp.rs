//! Wireless (TCP) transport.
//!
//! Network-attached devices expose the same line protocol over a TCP
//! socket. Connection establishment is bounded by a timeout; writes are
//! individually bounded so a stalled device surfaces as transmission
//! errors instead of a hung stream. There is no receive loop: these
//! devices do not chatter back.

use crate::streamer::{stream_job, LineWriter, WriteError};
use crate::transport::{DeviceTransport, EventSender, StreamTiming};
use async_trait::async_trait;
use plotkit_core::{DeviceError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Ordered emergency stop sequence for networked firmware: emergency stop,
/// feed hold, soft-reset control byte, spindle off.
const WIRELESS_STOP_SEQUENCE: [&[u8]; 4] = [b"M112\n", b"!\n", &[0x18], b"M5\n"];

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// Wireless TCP transport. `target` is `host:port`.
pub struct TcpTransport {
    writer: SharedWriter,
    connected: Arc<AtomicBool>,
    sending: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    events: EventSender,
    timing: StreamTiming,
}

impl TcpTransport {
    /// Create a transport reporting on the given event channel.
    pub fn new(events: EventSender) -> Self {
        Self::with_timing(events, StreamTiming::wireless())
    }

    /// Create a transport with explicit timing (tests, slow networks).
    pub fn with_timing(events: EventSender, timing: StreamTiming) -> Self {
        Self {
            writer: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            sending: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            events,
            timing,
        }
    }
}

struct TcpLineWriter {
    writer: SharedWriter,
    write_timeout: Duration,
}

#[async_trait]
impl LineWriter for TcpLineWriter {
    async fn write_line(&self, line: &str) -> std::result::Result<(), WriteError> {
        let mut guard = self.writer.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| WriteError::Link("socket closed".to_string()))?;
        let data = format!("{line}\n");
        match tokio::time::timeout(self.write_timeout, stream.write_all(data.as_bytes())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WriteError::Link(e.to_string())),
            Err(_) => Err(WriteError::Timeout(format!(
                "write exceeded {:?}",
                self.write_timeout
            ))),
        }
    }
}

#[async_trait]
impl DeviceTransport for TcpTransport {
    async fn connect(&self, target: &str) -> Result<String> {
        if self.connected.load(Ordering::SeqCst) {
            let _ = self.disconnect().await;
        }

        let stream = tokio::time::timeout(self.timing.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| {
                tracing::warn!(target, "connection attempt timed out");
                DeviceError::ConnectionTimeout {
                    target: target.to_string(),
                    timeout_ms: self.timing.connect_timeout.as_millis() as u64,
                }
            })?
            .map_err(|e| {
                tracing::warn!(target, error = %e, "connection refused");
                DeviceError::ConnectionFailed {
                    target: target.to_string(),
                    reason: e.to_string(),
                }
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not disable Nagle's algorithm");
        }

        // The read half is dropped: these devices send nothing back, and
        // closing it lets the peer detect our disconnect promptly.
        let (_read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(target, "network connection established");
        Ok(format!("connected to {target}"))
    }

    async fn disconnect(&self) -> Result<String> {
        self.cancel.store(true, Ordering::SeqCst);

        let stream = self.writer.lock().await.take();
        if let Some(mut write_half) = stream {
            let _ = write_half.shutdown().await;
        }

        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            tracing::info!("network connection closed");
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

        let writer: Arc<dyn LineWriter> = Arc::new(TcpLineWriter {
            writer: self.writer.clone(),
            write_timeout: self.timing.write_timeout,
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

        self.cancel.store(true, Ordering::SeqCst);

        let mut accepted = 0usize;
        for sequence in WIRELESS_STOP_SEQUENCE {
            let ok = {
                let mut guard = self.writer.lock().await;
                match guard.as_mut() {
                    Some(stream) => stream.write_all(sequence).await.is_ok(),
                    None => false,
                }
            };
            if ok {
                accepted += 1;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        if accepted > 0 {
            tracing::warn!(
                accepted,
                total = WIRELESS_STOP_SEQUENCE.len(),
                "emergency stop transmitted"
            );
            Ok(format!(
                "emergency stop sent ({accepted}/{} commands accepted)",
                WIRELESS_STOP_SEQUENCE.len()
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
        Vec::new()
    }
}
