//! Meridian Settings
//!
//! Application configuration over the semantic key set enumerated in
//! `meridian_core::ConfigKey` (§6, §9: "expose get/set only via a known
//! key set" rather than runtime reflection over arbitrary paths).
//!
//! ```no_run
//! use meridian_settings::Settings;
//!
//! let settings = Settings::load_or_default()?;
//! settings.save()?;
//! # Ok::<(), meridian_settings::SettingsError>(())
//! ```

mod config;
mod paths;

pub use config::{
    CircuitBreakerSettings, ConnectionSettings, NetworkSettings, RateLimitSettings, ServerSettings,
    Settings,
};
pub use paths::default_settings_path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for key {key}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;
