use meridian_core::ErrorKind;

/// Wraps either a breaker-level rejection or the inner operation's own
/// error, so `Execute`'s caller can match on both without the breaker
/// needing to know the inner error type beyond `Send + 'static`.
#[derive(Debug)]
pub enum BreakerError<E> {
    Open,
    HalfOpenLimit,
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker open"),
            BreakerError::HalfOpenLimit => write!(f, "circuit breaker half-open call limit reached"),
            BreakerError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for BreakerError<E> {}

impl<E> BreakerError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BreakerError::Open => ErrorKind::BreakerOpen,
            BreakerError::HalfOpenLimit => ErrorKind::BreakerHalfOpenLimit,
            BreakerError::Inner(_) => ErrorKind::IoError,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T, E> = std::result::Result<T, BreakerError<E>>;
