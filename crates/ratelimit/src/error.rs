use meridian_core::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    #[error("rate limited")]
    RateLimited,

    #[error("wait canceled")]
    Canceled,

    #[error("wait deadline exceeded")]
    DeadlineExceeded,
}

impl RateLimitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RateLimitError::InvalidConfig(_) => ErrorKind::ConfigInvalid,
            RateLimitError::RateLimited => ErrorKind::RateLimited,
            RateLimitError::Canceled => ErrorKind::ContextCanceled,
            RateLimitError::DeadlineExceeded => ErrorKind::ContextDeadline,
        }
    }
}

pub type Result<T> = std::result::Result<T, RateLimitError>;
