//! Circuit Breaker (spec §4.3)
//!
//! A Closed/Open/HalfOpen state machine guarding an arbitrary fallible
//! async operation. Every state transition logs at `info`; no
//! transition is silent.

mod error;
mod state;

pub use error::{BreakerError, Result};
pub use state::{BreakerConfig, BreakerStats, CircuitBreaker, CircuitState};
