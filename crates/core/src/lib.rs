//! Meridian Core
//!
//! Shared data types, the cross-cutting error taxonomy, a clock
//! abstraction, and the enumerated configuration key set used by every
//! other Meridian crate. Nothing in here talks to the network, the
//! filesystem, or a virtual interface — it is the vocabulary the rest
//! of the workspace shares.

mod clock;
mod config_keys;
pub mod error;
mod types;

pub use clock::{Clock, MockClock, SystemClock};
pub use config_keys::ConfigKey;
pub use error::{ErrorKind, MeridianError, Result};
pub use types::{Endpoint, InterfaceKind};
