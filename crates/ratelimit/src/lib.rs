//! Token-Bucket Rate Limiter (spec §4.2)
//!
//! Buckets are created lazily on first use of an unknown identity, and
//! reaped by a background cleanup task once their last-update age
//! exceeds a configurable TTL.

mod bucket;
mod error;
mod limiter;
mod metrics;

pub use bucket::TokenBucket;
pub use error::{RateLimitError, Result};
pub use limiter::{RateLimiter, RateLimiterConfig};
pub use metrics::RateLimitMetrics;
