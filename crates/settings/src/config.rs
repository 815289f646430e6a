use std::path::PathBuf;
use std::time::Duration;

use meridian_core::ConfigKey;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::paths::default_settings_path;
use crate::{Result, SettingsError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerSettings::default(),
            connection: ConnectionSettings::default(),
            rate_limit: RateLimitSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            network: NetworkSettings::default(),
            config_path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4443
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_true")]
    pub keep_alive: bool,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            keep_alive: true,
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl ConnectionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_request_rate")]
    pub request_rate: f64,
    #[serde(default = "default_burst_size")]
    pub burst_size: f64,
}

fn default_request_rate() -> f64 {
    100.0
}

fn default_burst_size() -> f64 {
    200.0
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            request_rate: default_request_rate(),
            burst_size: default_burst_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

fn default_max_failures() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    30
}

fn default_half_open_max_calls() -> u32 {
    1
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout_secs(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_network_address")]
    pub address: String,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
}

fn default_network_address() -> String {
    "10.8.0.1/24".to_string()
}

fn default_mtu() -> u32 {
    1420
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            interface: None,
            address: default_network_address(),
            mtu: default_mtu(),
        }
    }
}

impl Settings {
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            settings.config_path = Some(path.clone());
            info!(path = %path.display(), "loaded settings");
            Ok(settings)
        } else {
            let mut settings = Self::default();
            settings.config_path = Some(path.clone());
            Ok(settings)
        }
    }

    /// The path this instance was loaded from or saved to, if any.
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }
        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!(path = %path.display(), "saved settings");
        Ok(())
    }

    /// Reads one key from the enumerated set (§6, §9 redesign flag).
    pub fn get(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::LogLevel => self.log_level.clone(),
            ConfigKey::ServerHost => self.server.host.clone(),
            ConfigKey::ServerPort => self.server.port.to_string(),
            ConfigKey::ConnectionMaxConnections => self.connection.max_connections.to_string(),
            ConfigKey::ConnectionKeepAlive => self.connection.keep_alive.to_string(),
            ConfigKey::ConnectionIdleTimeout => self.connection.idle_timeout_secs.to_string(),
            ConfigKey::RateLimitEnabled => self.rate_limit.enabled.to_string(),
            ConfigKey::RateLimitRequestRate => self.rate_limit.request_rate.to_string(),
            ConfigKey::RateLimitBurstSize => self.rate_limit.burst_size.to_string(),
            ConfigKey::CircuitBreakerEnabled => self.circuit_breaker.enabled.to_string(),
            ConfigKey::CircuitBreakerMaxFailures => self.circuit_breaker.max_failures.to_string(),
            ConfigKey::CircuitBreakerResetTimeout => {
                self.circuit_breaker.reset_timeout_secs.to_string()
            }
            ConfigKey::CircuitBreakerHalfOpenMaxCalls => {
                self.circuit_breaker.half_open_max_calls.to_string()
            }
            ConfigKey::NetworkInterface => self.network.interface.clone().unwrap_or_default(),
            ConfigKey::NetworkAddress => self.network.address.clone(),
            ConfigKey::NetworkMtu => self.network.mtu.to_string(),
        }
    }

    /// Writes one key from the enumerated set, parsing `value` to the
    /// field's type.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: ConfigKey, value: &str) -> Result<T> {
            value.parse().map_err(|_| SettingsError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        }

        match key {
            ConfigKey::LogLevel => self.log_level = value.to_string(),
            ConfigKey::ServerHost => self.server.host = value.to_string(),
            ConfigKey::ServerPort => self.server.port = parse(key, value)?,
            ConfigKey::ConnectionMaxConnections => {
                self.connection.max_connections = parse(key, value)?
            }
            ConfigKey::ConnectionKeepAlive => self.connection.keep_alive = parse(key, value)?,
            ConfigKey::ConnectionIdleTimeout => {
                self.connection.idle_timeout_secs = parse(key, value)?
            }
            ConfigKey::RateLimitEnabled => self.rate_limit.enabled = parse(key, value)?,
            ConfigKey::RateLimitRequestRate => self.rate_limit.request_rate = parse(key, value)?,
            ConfigKey::RateLimitBurstSize => self.rate_limit.burst_size = parse(key, value)?,
            ConfigKey::CircuitBreakerEnabled => self.circuit_breaker.enabled = parse(key, value)?,
            ConfigKey::CircuitBreakerMaxFailures => {
                self.circuit_breaker.max_failures = parse(key, value)?
            }
            ConfigKey::CircuitBreakerResetTimeout => {
                self.circuit_breaker.reset_timeout_secs = parse(key, value)?
            }
            ConfigKey::CircuitBreakerHalfOpenMaxCalls => {
                self.circuit_breaker.half_open_max_calls = parse(key, value)?
            }
            ConfigKey::NetworkInterface => self.network.interface = Some(value.to_string()),
            ConfigKey::NetworkAddress => self.network.address = value.to_string(),
            ConfigKey::NetworkMtu => self.network.mtu = parse(key, value)?,
        }
        Ok(())
    }
}
