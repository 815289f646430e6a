use meridian_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IfaceError {
    #[error("invalid interface config: {0}")]
    InvalidConfig(String),
    #[error("interface name already in use")]
    ResourceBusy,
    #[error("insufficient privilege to create interface")]
    Permission,
    #[error("interface io error: {0}")]
    IoError(String),
    #[error("interface already closed")]
    Closed,
}

impl IfaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IfaceError::InvalidConfig(_) => ErrorKind::ConfigInvalid,
            IfaceError::ResourceBusy => ErrorKind::ResourceBusy,
            IfaceError::Permission => ErrorKind::ResourcePermission,
            IfaceError::IoError(_) => ErrorKind::IoError,
            IfaceError::Closed => ErrorKind::IoError,
        }
    }
}

pub type Result<T> = std::result::Result<T, IfaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_and_maps_kind() {
        let err = IfaceError::ResourceBusy;
        assert_eq!(err.to_string(), "interface name already in use");
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);
    }
}
