//! # Plotkit Core
//!
//! Core types for the Plotkit pen plotter toolchain: the stroke data model
//! shared by the toolpath pipeline and the device transports, the validated
//! machine configuration, the connection state machine, and the error
//! taxonomy.

pub mod config;
pub mod error;
pub mod geometry;
pub mod state;
pub mod stroke;

pub use config::{MachineConfig, MachineOptions, Z_CEILING, Z_FLOOR};
pub use error::{DeviceError, Error, PipelineError, Result};
pub use geometry::Point;
pub use state::ConnectionState;
pub use stroke::{CommandLine, Polyline, StrokeKind, StrokeSet};
