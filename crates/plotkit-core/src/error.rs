//! Error taxonomy for Plotkit.
//!
//! Two layers of errors exist:
//! - [`PipelineError`] for the pure optimize/map/emit pipeline, which
//!   performs no I/O and fails only on malformed input.
//! - [`DeviceError`] for everything device-facing. Transports report
//!   failures exclusively through result values and the status channel;
//!   cancellation by emergency stop is a status, not an error.
//!
//! All error types use `thiserror`.

use thiserror::Error;

/// Errors from the pure toolpath pipeline. Defensive, should-not-happen
/// conditions: upstream collaborators filter degenerate strokes before the
/// pipeline runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A polyline with zero points reached the pipeline.
    #[error("polyline must contain at least one point")]
    EmptyPolyline,
}

/// Errors from device transports and the connection manager.
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    /// No live connection exists.
    #[error("not connected to a device")]
    NotConnected,

    /// A send is already in progress; concurrent sends are rejected, not
    /// queued.
    #[error("transport busy: a send is already in progress")]
    Busy,

    /// The target could not be reached or the handshake failed.
    #[error("connection to {target} failed: {reason}")]
    ConnectionFailed {
        /// The port name or host:port that was dialed.
        target: String,
        /// Why the connection failed.
        reason: String,
    },

    /// Connection establishment exceeded its bounded timeout.
    #[error("connection to {target} timed out after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The port name or host:port that was dialed.
        target: String,
        /// The timeout that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The link failed hard mid-stream; the remaining queue was aborted.
    #[error("link lost: {reason}")]
    LinkLost {
        /// Why the link was considered lost.
        reason: String,
    },

    /// No emergency stop command was accepted by the device.
    #[error("emergency stop failed: {reason}")]
    StopFailed {
        /// Why the stop sequence failed.
        reason: String,
    },

    /// Generic transport error.
    #[error("{message}")]
    Other {
        /// The error message.
        message: String,
    },
}

impl DeviceError {
    /// Create a generic transport error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        DeviceError::Other {
            message: message.into(),
        }
    }
}

/// Unified error type for Plotkit public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Toolpath pipeline error.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Device transport error.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when this is a busy rejection.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Device(DeviceError::Busy))
    }

    /// True when this is any device-facing error.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Error::Device(_))
    }
}

/// Result type using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
