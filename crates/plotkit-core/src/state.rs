//! Connection state machine.

use serde::{Deserialize, Serialize};

/// The lifecycle state of the single system-wide device connection.
///
/// Owned and mutated exclusively by the connection manager; transports never
/// touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No live connection.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and idle.
    Connected,
    /// A send job is streaming.
    Sending,
    /// An emergency stop was issued; the connection is still open but the
    /// device is assumed halted.
    EmergencyStopped,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Sending => "sending",
            ConnectionState::EmergencyStopped => "emergency stopped",
        };
        write!(f, "{}", s)
    }
}
