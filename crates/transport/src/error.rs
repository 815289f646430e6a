use meridian_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("tls handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("frame of {0} bytes exceeds the maximum of {1}")]
    FrameTooLarge(usize, usize),
    #[error("peer closed the connection")]
    Closed,
    #[error("io error: {0}")]
    IoError(String),
    #[error("invalid certificate material: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::HandshakeFailed(_) => ErrorKind::HandshakeFailed,
            TransportError::FrameTooLarge(_, _) => ErrorKind::IoError,
            TransportError::Closed => ErrorKind::IoError,
            TransportError::IoError(_) => ErrorKind::IoError,
            TransportError::InvalidConfig(_) => ErrorKind::ConfigInvalid,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Closed
        } else {
            TransportError::IoError(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_eof_maps_to_closed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn frame_too_large_maps_kind() {
        let err = TransportError::FrameTooLarge(9000, 1484);
        assert_eq!(err.kind(), ErrorKind::IoError);
    }
}
