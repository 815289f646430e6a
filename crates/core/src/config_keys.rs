use std::str::FromStr;

/// The enumerated configuration key set from spec §6. Runtime get/set
/// is modeled as a match over this enum instead of reflection over a
/// string path (§9 redesign flag): `config get <key>` / `config set
/// <key> <value>` in the admin CLI can only ever name one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    LogLevel,
    ServerHost,
    ServerPort,
    ConnectionMaxConnections,
    ConnectionKeepAlive,
    ConnectionIdleTimeout,
    RateLimitEnabled,
    RateLimitRequestRate,
    RateLimitBurstSize,
    CircuitBreakerEnabled,
    CircuitBreakerMaxFailures,
    CircuitBreakerResetTimeout,
    CircuitBreakerHalfOpenMaxCalls,
    NetworkInterface,
    NetworkAddress,
    NetworkMtu,
}

impl ConfigKey {
    pub const ALL: &'static [ConfigKey] = &[
        ConfigKey::LogLevel,
        ConfigKey::ServerHost,
        ConfigKey::ServerPort,
        ConfigKey::ConnectionMaxConnections,
        ConfigKey::ConnectionKeepAlive,
        ConfigKey::ConnectionIdleTimeout,
        ConfigKey::RateLimitEnabled,
        ConfigKey::RateLimitRequestRate,
        ConfigKey::RateLimitBurstSize,
        ConfigKey::CircuitBreakerEnabled,
        ConfigKey::CircuitBreakerMaxFailures,
        ConfigKey::CircuitBreakerResetTimeout,
        ConfigKey::CircuitBreakerHalfOpenMaxCalls,
        ConfigKey::NetworkInterface,
        ConfigKey::NetworkAddress,
        ConfigKey::NetworkMtu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::LogLevel => "logLevel",
            ConfigKey::ServerHost => "server.host",
            ConfigKey::ServerPort => "server.port",
            ConfigKey::ConnectionMaxConnections => "connection.maxConnections",
            ConfigKey::ConnectionKeepAlive => "connection.keepAlive",
            ConfigKey::ConnectionIdleTimeout => "connection.idleTimeout",
            ConfigKey::RateLimitEnabled => "rateLimit.enabled",
            ConfigKey::RateLimitRequestRate => "rateLimit.requestRate",
            ConfigKey::RateLimitBurstSize => "rateLimit.burstSize",
            ConfigKey::CircuitBreakerEnabled => "circuitBreaker.enabled",
            ConfigKey::CircuitBreakerMaxFailures => "circuitBreaker.maxFailures",
            ConfigKey::CircuitBreakerResetTimeout => "circuitBreaker.resetTimeout",
            ConfigKey::CircuitBreakerHalfOpenMaxCalls => "circuitBreaker.halfOpenMaxCalls",
            ConfigKey::NetworkInterface => "network.interface",
            ConfigKey::NetworkAddress => "network.address",
            ConfigKey::NetworkMtu => "network.mtu",
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown configuration key: {0}")]
pub struct UnknownConfigKey(pub String);

impl FromStr for ConfigKey {
    type Err = UnknownConfigKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownConfigKey(s.to_string()))
    }
}
