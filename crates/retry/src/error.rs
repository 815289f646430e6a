use meridian_core::ErrorKind;

#[derive(Debug)]
pub enum RetryError<E> {
    /// All enabled phases exhausted without success; carries the last
    /// attempt's error for diagnostics, if any attempt was made.
    MaxRetriesExceeded(Option<E>),
    Canceled,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::MaxRetriesExceeded(Some(e)) => {
                write!(f, "all retry phases exhausted without success: {e}")
            }
            RetryError::MaxRetriesExceeded(None) => {
                write!(f, "all retry phases exhausted without success")
            }
            RetryError::Canceled => write!(f, "retry canceled"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

impl<E> RetryError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetryError::MaxRetriesExceeded(_) => ErrorKind::MaxRetriesExceeded,
            RetryError::Canceled => ErrorKind::ContextCanceled,
        }
    }
}

pub type Result<T, E> = std::result::Result<T, RetryError<E>>;
