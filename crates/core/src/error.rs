use thiserror::Error;

/// The error taxonomy from the data-plane design: every subsystem's
/// error wraps one of these kinds so a manager can decide retry vs.
/// surface without matching on subsystem-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigInvalid,
    ResourceBusy,
    ResourcePermission,
    PoolClosed,
    PoolExhausted,
    RateLimited,
    BreakerOpen,
    BreakerHalfOpenLimit,
    HealthCheckFailed,
    HandshakeFailed,
    IoError,
    MaxRetriesExceeded,
    ContextCanceled,
    ContextDeadline,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::ResourceBusy => "resource_busy",
            ErrorKind::ResourcePermission => "resource_permission",
            ErrorKind::PoolClosed => "pool_closed",
            ErrorKind::PoolExhausted => "pool_exhausted",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::BreakerOpen => "breaker_open",
            ErrorKind::BreakerHalfOpenLimit => "breaker_half_open_limit",
            ErrorKind::HealthCheckFailed => "health_check_failed",
            ErrorKind::HandshakeFailed => "handshake_failed",
            ErrorKind::IoError => "io_error",
            ErrorKind::MaxRetriesExceeded => "max_retries_exceeded",
            ErrorKind::ContextCanceled => "context_canceled",
            ErrorKind::ContextDeadline => "context_deadline",
        };
        f.write_str(s)
    }
}

/// Core-level error: malformed addresses, bad configuration values,
/// and the like. Subsystem crates define their own `thiserror` enums
/// and expose a `kind()` accessor returning one of the `ErrorKind`
/// values above; this type only covers failures raised by `meridian-core`
/// itself.
#[derive(Error, Debug)]
pub enum MeridianError {
    #[error("invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl MeridianError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeridianError::InvalidEndpoint(_) => ErrorKind::ConfigInvalid,
            MeridianError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
        }
    }
}

pub type Result<T> = std::result::Result<T, MeridianError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::BreakerOpen.to_string(), "breaker_open");
        assert_eq!(ErrorKind::PoolExhausted.to_string(), "pool_exhausted");
    }

    #[test]
    fn invalid_endpoint_kind() {
        let err = MeridianError::InvalidEndpoint("bad:addr:1".into());
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(err.to_string(), "invalid endpoint address: bad:addr:1");
    }
}
