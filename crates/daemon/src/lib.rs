//! Meridian Daemon
//!
//! The composition root: loads settings, wires the breaker/limiter/
//! tracker/memory manager/connection manager together, creates the
//! virtual interface, and runs either the tunnel server or client plus
//! the admin control socket (§6).

mod control;
mod error;
mod service;

pub use control::{ControlCommand, ControlResponse, ControlServer, ControlServerConfig};
pub use error::{DaemonError, Result};
pub use service::{DaemonMode, DaemonService};
