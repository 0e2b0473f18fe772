//! Connection lifecycle management.
//!
//! [`ConnectionManager`] is the single owner of the connection state
//! machine. It holds at most one active transport, routes operations to
//! it, and derives state transitions from the transport's event stream
//! before forwarding each event to the caller.

use crate::serial::{self, SerialTransport};
use crate::tcp::TcpTransport;
use crate::transport::{DeviceInfo, DeviceTransport, EventReceiver, EventSender, TransportEvent};
use parking_lot::RwLock;
use plotkit_core::{ConnectionState, DeviceError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which transport family a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// Wired serial link.
    Serial,
    /// Wireless TCP link.
    Tcp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Serial => write!(f, "serial"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

struct ActiveConnection {
    kind: TransportKind,
    transport: Arc<dyn DeviceTransport>,
}

/// Owns the active transport and the connection state machine.
pub struct ConnectionManager {
    active: RwLock<Option<ActiveConnection>>,
    state: Arc<RwLock<ConnectionState>>,
    internal_tx: EventSender,
}

impl ConnectionManager {
    /// Create a manager and the event stream the caller consumes. Transport
    /// events pass through a forwarding task that applies their state
    /// transitions first.
    pub fn new() -> (Self, EventReceiver) {
        let (internal_tx, mut internal_rx) = tokio::sync::mpsc::unbounded_channel();
        let (public_tx, public_rx) = tokio::sync::mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let state_for_task = state.clone();
        tokio::spawn(async move {
            while let Some(event) = internal_rx.recv().await {
                apply_transition(&state_for_task, &event);
                if public_tx.send(event).is_err() {
                    break;
                }
            }
        });

        let manager = Self {
            active: RwLock::new(None),
            state,
            internal_tx,
        };
        (manager, public_rx)
    }

    /// Enumerate connection candidates for a transport family. Network
    /// devices are addressed directly by `host:port`, so discovery there
    /// yields nothing.
    pub fn discover(&self, kind: TransportKind) -> Result<Vec<DeviceInfo>> {
        match kind {
            TransportKind::Serial => serial::list_ports(),
            TransportKind::Tcp => Ok(Vec::new()),
        }
    }

    /// Connect to `target` over the given transport family. Any previous
    /// connection is torn down first, regardless of its kind.
    pub async fn connect(&self, kind: TransportKind, target: &str) -> Result<String> {
        let previous = self.active.write().take();
        if let Some(previous) = previous {
            tracing::info!(kind = %previous.kind, "replacing existing connection");
            let _ = previous.transport.disconnect().await;
        }

        *self.state.write() = ConnectionState::Connecting;

        let transport: Arc<dyn DeviceTransport> = match kind {
            TransportKind::Serial => Arc::new(SerialTransport::new(self.internal_tx.clone())),
            TransportKind::Tcp => Arc::new(TcpTransport::new(self.internal_tx.clone())),
        };

        match transport.connect(target).await {
            Ok(message) => {
                *self.active.write() = Some(ActiveConnection { kind, transport });
                *self.state.write() = ConnectionState::Connected;
                Ok(message)
            }
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Tear down the active connection, if any. Idempotent.
    pub async fn disconnect(&self) -> Result<String> {
        let previous = self.active.write().take();
        *self.state.write() = ConnectionState::Disconnected;
        match previous {
            Some(connection) => connection.transport.disconnect().await,
            None => Ok("already disconnected".to_string()),
        }
    }

    /// Stream a job to the connected device. Returns once the job is
    /// accepted; progress arrives on the event stream.
    pub async fn send(&self, lines: Vec<String>) -> Result<String> {
        let transport = self.active_transport()?;

        // Enter Sending before the drain task can emit its first event, so
        // even an instantly-completing job observes the transition.
        let previous = {
            let mut guard = self.state.write();
            let previous = *guard;
            *guard = ConnectionState::Sending;
            previous
        };

        match transport.send(lines).await {
            Ok(message) => Ok(message),
            Err(e) => {
                // A busy rejection means another job still owns the Sending
                // state; anything else means no job started.
                if !e.is_busy() {
                    *self.state.write() = previous;
                }
                Err(e)
            }
        }
    }

    /// Halt the device immediately, cancelling any in-flight job.
    pub async fn emergency_stop(&self) -> Result<String> {
        let transport = self.active_transport()?;
        let message = transport.emergency_stop().await?;
        *self.state.write() = ConnectionState::EmergencyStopped;
        Ok(message)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Transport family of the active connection, if any.
    pub fn kind(&self) -> Option<TransportKind> {
        self.active.read().as_ref().map(|c| c.kind)
    }

    /// Whether a live link exists.
    pub fn is_connected(&self) -> bool {
        self.active
            .read()
            .as_ref()
            .is_some_and(|c| c.transport.is_connected())
    }

    /// Recent lines received from the device, oldest first.
    pub fn received_lines(&self) -> Vec<String> {
        self.active
            .read()
            .as_ref()
            .map(|c| c.transport.received_lines())
            .unwrap_or_default()
    }

    fn active_transport(&self) -> Result<Arc<dyn DeviceTransport>> {
        self.active
            .read()
            .as_ref()
            .map(|c| c.transport.clone())
            .ok_or_else(|| DeviceError::NotConnected.into())
    }
}

/// Map terminal transport events onto the state machine. Progress and
/// received lines do not change state.
fn apply_transition(state: &Arc<RwLock<ConnectionState>>, event: &TransportEvent) {
    match event {
        TransportEvent::Completed { .. } | TransportEvent::Failed { .. } => {
            let mut guard = state.write();
            if *guard == ConnectionState::Sending {
                *guard = ConnectionState::Connected;
            }
        }
        TransportEvent::Cancelled { .. } => {
            // Only an interrupted send lands in EmergencyStopped. A plain
            // disconnect also trips the transport's cancel flag, but by then
            // the manager has already left Sending.
            let mut guard = state.write();
            if *guard == ConnectionState::Sending {
                *guard = ConnectionState::EmergencyStopped;
            }
        }
        TransportEvent::Progress { .. } | TransportEvent::LineReceived { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state_is_disconnected() {
        let (manager, _events) = ConnectionManager::new();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
        assert!(manager.kind().is_none());
        assert!(manager.received_lines().is_empty());
    }

    #[tokio::test]
    async fn test_operations_require_a_connection() {
        let (manager, _events) = ConnectionManager::new();

        let send = manager.send(vec!["G21".to_string()]).await;
        assert!(matches!(
            send,
            Err(plotkit_core::Error::Device(DeviceError::NotConnected))
        ));

        let stop = manager.emergency_stop().await;
        assert!(matches!(
            stop,
            Err(plotkit_core::Error::Device(DeviceError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_harmless() {
        let (manager, _events) = ConnectionManager::new();
        assert_eq!(
            manager.disconnect().await.unwrap(),
            "already disconnected"
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connect_resets_state() {
        let (manager, _events) = ConnectionManager::new();
        // Port 1 on localhost refuses connections.
        let result = manager.connect(TransportKind::Tcp, "127.0.0.1:1").await;
        assert!(result.is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.kind().is_none());
    }

    #[tokio::test]
    async fn test_tcp_discovery_is_empty() {
        let (manager, _events) = ConnectionManager::new();
        assert!(manager.discover(TransportKind::Tcp).unwrap().is_empty());
    }
}
