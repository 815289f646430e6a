use meridian_core::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError<E> {
    #[error("pool is closed")]
    Closed,

    #[error("pool exhausted")]
    Exhausted,

    #[error("wait for a connection was canceled")]
    Canceled,

    #[error("wait for a connection deadline exceeded")]
    DeadlineExceeded,

    #[error("factory failed to create connection: {0}")]
    Factory(E),
}

impl<E> PoolError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Closed => ErrorKind::PoolClosed,
            PoolError::Exhausted => ErrorKind::PoolExhausted,
            PoolError::Canceled => ErrorKind::ContextCanceled,
            PoolError::DeadlineExceeded => ErrorKind::ContextDeadline,
            PoolError::Factory(_) => ErrorKind::IoError,
        }
    }
}

pub type Result<T, E> = std::result::Result<T, PoolError<E>>;
