use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("control socket error: {0}")]
    ControlSocket(String),

    #[error("transport error: {0}")]
    Transport(#[from] meridian_transport::TransportError),

    #[error("interface error: {0}")]
    Interface(#[from] meridian_iface::IfaceError),

    #[error("settings error: {0}")]
    Settings(#[from] meridian_settings::SettingsError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
