use meridian_breaker::BreakerError;
use meridian_core::ErrorKind;

/// Admission-time failure from [`crate::ConnectionManager`]. Generic over
/// the inner dial error so `Connect`'s breaker-wrapped factory failures can
/// be threaded through without an extra conversion layer.
#[derive(Debug)]
pub enum ManagerError<E> {
    MaxConnectionsReached,
    RateLimited,
    Breaker(BreakerError<E>),
}

impl<E: std::fmt::Display> std::fmt::Display for ManagerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerError::MaxConnectionsReached => write!(f, "maximum connections reached"),
            ManagerError::RateLimited => write!(f, "rate limited"),
            ManagerError::Breaker(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ManagerError<E> {}

impl<E> ManagerError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::MaxConnectionsReached => ErrorKind::ResourceBusy,
            ManagerError::RateLimited => ErrorKind::RateLimited,
            ManagerError::Breaker(e) => e.kind(),
        }
    }
}

pub type Result<T, E> = std::result::Result<T, ManagerError<E>>;
