//! Device transport contract and status events.
//!
//! A transport owns exactly one live link to a drawing device and streams
//! command lines to it on a background task. Progress, completion,
//! cancellation, and received device chatter are reported through an
//! unbounded event channel rather than callbacks, so the caller can consume
//! them from any execution context.

use async_trait::async_trait;
use plotkit_core::Result;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Fixed initialization commands sent before every payload: reset line
/// numbering, absolute positioning, millimeter units. Best-effort and not
/// subject to cancellation.
pub const INIT_COMMANDS: [&str; 3] = ["M110 N0", "G90", "G21"];

/// Fixed trailing commands sent after an un-cancelled payload: return to
/// origin, program end. Skipped when the job was cancelled.
pub const TRAILER_COMMANDS: [&str; 2] = ["G0 X0 Y0 F1500", "M30"];

/// How many received lines each transport retains, oldest dropped first.
pub const RECEIVE_BUFFER_LINES: usize = 20;

/// Status notifications from a transport's background tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransportEvent {
    /// Periodic streaming progress, reported every few lines.
    Progress {
        /// Lines handed to the link so far.
        sent: usize,
        /// Lines in the job.
        total: usize,
        /// Transmission errors so far.
        errors: usize,
    },
    /// A line arrived from the device.
    LineReceived {
        /// Local wall-clock time of arrival, `HH:MM:SS`.
        timestamp: String,
        /// The decoded, trimmed line.
        line: String,
    },
    /// The job finished without cancellation.
    Completed {
        /// Lines handed to the link.
        sent: usize,
        /// Transmission errors along the way.
        errors: usize,
    },
    /// The job was cancelled by an emergency stop. A terminal status, not an
    /// error.
    Cancelled {
        /// Lines handed to the link before the cancellation took effect.
        sent: usize,
    },
    /// The link failed hard; the remaining queue was discarded.
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Sender half of the transport event channel.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half of the transport event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// One discovered connection candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Machine-usable target: a port path or `host:port`.
    pub id: String,
    /// Human-readable label.
    pub name: String,
}

/// Timing knobs for connection establishment and streaming.
///
/// The defaults match a wired serial link; [`StreamTiming::wireless`] paces
/// slower for higher-latency links. Tests shrink these to keep runs fast.
#[derive(Debug, Clone)]
pub struct StreamTiming {
    /// Bound on connection establishment.
    pub connect_timeout: Duration,
    /// Bound on a single line write; expiry is a transmission error, not a
    /// fatal one.
    pub write_timeout: Duration,
    /// Pacing delay between payload lines.
    pub line_delay: Duration,
    /// Delay after each init/trailer command.
    pub init_delay: Duration,
}

impl StreamTiming {
    /// Timing for a wired serial link.
    pub fn serial() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            line_delay: Duration::from_millis(30),
            init_delay: Duration::from_millis(100),
        }
    }

    /// Timing for a wireless (TCP) link.
    pub fn wireless() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            line_delay: Duration::from_millis(50),
            ..Self::serial()
        }
    }
}

impl Default for StreamTiming {
    fn default() -> Self {
        Self::serial()
    }
}

/// Contract for a device transport. Owns exactly one live connection at a
/// time.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Establish the link within a bounded time. Implicitly disconnects a
    /// previous link on the same transport.
    async fn connect(&self, target: &str) -> Result<String>;

    /// Release the link. Idempotent.
    async fn disconnect(&self) -> Result<String>;

    /// Enqueue a full line list and start the asynchronous drain loop.
    /// Returns immediately; progress and completion arrive on the event
    /// channel. Rejects with [`plotkit_core::DeviceError::Busy`] while a
    /// job is in flight.
    async fn send(&self, lines: Vec<String>) -> Result<String>;

    /// Cancel any in-flight job, then best-effort transmit the transport's
    /// stop sequence and discard unread input. Succeeds if at least one
    /// stop command was accepted.
    async fn emergency_stop(&self) -> Result<String>;

    /// Whether a live link exists.
    fn is_connected(&self) -> bool;

    /// The most recent lines received from the device, oldest first.
    /// Empty for transports without a receive loop.
    fn received_lines(&self) -> Vec<String>;
}
