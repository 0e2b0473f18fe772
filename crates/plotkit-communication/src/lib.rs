//! # Plotkit Communication
//!
//! Device transports for streaming command lines to a pen plotter over a
//! wired serial link or a network socket, plus the connection manager that
//! owns the connection lifecycle.
//!
//! Transports share one streaming protocol: fixed initialization commands,
//! the payload paced line by line with comment and blank lines skipped,
//! then trailing return-to-origin commands. Progress and device chatter
//! surface on an event channel; an emergency stop cancels the in-flight
//! job at line granularity and transmits a firmware halt sequence.

pub mod manager;
pub mod serial;
mod streamer;
pub mod tcp;
pub mod transport;

pub use manager::{ConnectionManager, TransportKind};
pub use serial::{list_ports, ReadWrite, SerialTransport};
pub use tcp::TcpTransport;
pub use transport::{
    DeviceInfo, DeviceTransport, EventReceiver, EventSender, StreamTiming, TransportEvent,
    INIT_COMMANDS, RECEIVE_BUFFER_LINES, TRAILER_COMMANDS,
};
