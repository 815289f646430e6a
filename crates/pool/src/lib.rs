//! Connection Pool (spec §4.4)
//!
//! A bounded, reusable cache of transport connections with an idle
//! policy and an optional health check. `Factory` and `HealthCheck` are
//! the abstract capability handles the manager hands to the pool
//! instead of a back-pointer (§9 redesign flag).

mod error;
mod pool;

pub use error::{PoolError, Result};
pub use pool::{
    ExhaustionPolicy, Factory, HealthCheck, OnClose, Pool, PoolConfig, PoolStats,
    PooledConnection,
};
