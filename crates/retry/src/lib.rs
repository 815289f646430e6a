//! Retry Manager (spec §4.5)
//!
//! A three-phase connection-establishment policy: immediate retries,
//! then gradually-backing-off retries, then an optional unbounded
//! persistent phase.

mod error;
mod manager;

pub use error::{RetryError, Result};
pub use manager::{RetryConfig, RetryCounters, RetryManager};
pub use meridian_pool::Factory;
