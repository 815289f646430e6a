//! Composition root (§3): wires settings into the breaker, limiter,
//! tracker, memory manager, connection manager, and virtual interface,
//! then runs either the tunnel server or client until shutdown.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use meridian_breaker::{BreakerConfig, CircuitBreaker};
use meridian_core::{ConfigKey, InterfaceKind, SystemClock};
use meridian_iface::{create_iface, InterfaceConfig};
use meridian_manager::{ConnectionManager, ConnectionManagerConfig};
use meridian_memory::{BufferPool, MemoryManager, MemoryManagerConfig};
use meridian_ratelimit::{RateLimiter, RateLimiterConfig};
use meridian_settings::Settings;
use meridian_tracker::ConnectionTracker;
use meridian_transport::{
    SessionConfig, TlsMaterial, TunnelClient, TunnelClientConfig, TunnelServer, TunnelServerConfig,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{DaemonError, Result};

/// Which role the daemon was started in. Chosen at startup and fixed
/// for the process lifetime; switching roles means a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonMode {
    Server,
    Client { endpoint: std::net::SocketAddr, server_name: String },
}

/// Everything the admin control socket needs to answer `status`,
/// `metrics`, `health`, and `config` commands, plus the shutdown
/// switch the whole process selects on.
pub struct DaemonService {
    settings: parking_lot::RwLock<Settings>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConnectionTracker>,
    memory: Arc<MemoryManager>,
    manager: Arc<ConnectionManager<()>>,
    shutdown: CancellationToken,
}

impl DaemonService {
    pub fn new(settings: Settings) -> Arc<Self> {
        let clock = Arc::new(SystemClock);
        let breaker = Arc::new(CircuitBreaker::new(
            "tunnel",
            BreakerConfig {
                max_failures: settings.circuit_breaker.max_failures,
                reset_timeout: settings.circuit_breaker.reset_timeout(),
                half_open_max_calls: settings.circuit_breaker.half_open_max_calls,
                ..BreakerConfig::default()
            },
            clock.clone(),
        ));
        let limiter = RateLimiter::new(
            RateLimiterConfig {
                default_rate: settings.rate_limit.request_rate,
                default_burst: settings.rate_limit.burst_size,
                ..RateLimiterConfig::default()
            },
            clock.clone(),
        );
        let tracker = Arc::new(ConnectionTracker::new(clock));
        let memory = MemoryManager::new(MemoryManagerConfig::default());
        memory.start_monitor();

        let manager_config = ConnectionManagerConfig {
            max_connections: settings.connection.max_connections,
            keep_alive: settings.connection.keep_alive,
            idle_timeout: settings.connection.idle_timeout(),
            rate_limit_enabled: settings.rate_limit.enabled,
            breaker_enabled: settings.circuit_breaker.enabled,
        };
        let manager = ConnectionManager::new(
            manager_config,
            breaker.clone(),
            limiter.clone(),
            tracker.clone(),
            None,
            None,
        );

        Arc::new(Self {
            settings: parking_lot::RwLock::new(settings),
            breaker,
            limiter,
            tracker,
            memory,
            manager,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn status(&self) -> serde_json::Value {
        json!({
            "state": "running",
            "connections": self.manager.connection_count(),
            "breaker": format!("{:?}", self.breaker.state()),
        })
    }

    pub fn metrics(&self) -> serde_json::Value {
        let breaker = self.breaker.stats();
        let rate_limit = self.limiter.metrics();
        let tracker = self.tracker.stats();
        json!({
            "circuitBreaker": {
                "state": format!("{:?}", breaker.state),
                "failureCount": breaker.failure_count,
                "halfOpenCalls": breaker.half_open_calls,
            },
            "rateLimit": {
                "allowed": rate_limit.allowed,
                "denied": rate_limit.denied,
                "activeBuckets": rate_limit.active_buckets,
            },
            "tracker": {
                "activeConnections": tracker.active_connections,
                "peakConnections": tracker.peak_connections,
                "totalBytesSent": tracker.total_bytes_sent,
                "totalBytesReceived": tracker.total_bytes_received,
            },
            "memory": {
                "current": self.memory.current(),
                "peak": self.memory.peak(),
                "pressure": format!("{:?}", self.memory.pressure()),
            },
        })
    }

    pub fn health(&self) -> serde_json::Value {
        let healthy = self.breaker.state() != meridian_breaker::CircuitState::Open;
        json!({ "healthy": healthy })
    }

    pub fn reload(&self) -> Result<()> {
        let path = self.settings.read().config_path().cloned();
        let Some(path) = path else {
            return Err(DaemonError::InvalidRequest(
                "no config file to reload from".into(),
            ));
        };
        let reloaded = Settings::load_from(&path)?;
        *self.settings.write() = reloaded;
        info!("settings reloaded");
        Ok(())
    }

    pub fn update_config(&self, key: &str, value: &str) -> Result<()> {
        let key = ConfigKey::from_str(key)
            .map_err(|e| DaemonError::InvalidRequest(e.to_string()))?;
        self.settings.write().set(key, value)?;
        Ok(())
    }

    fn settings_snapshot(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Runs this daemon's main task (tunnel server or client) to
    /// completion. Returns once the shared shutdown token fires and the
    /// role's task has drained.
    pub async fn run(self: &Arc<Self>, mode: DaemonMode) -> Result<()> {
        let settings = self.settings_snapshot();
        let buffer_pool = Arc::new(BufferPool::new(self.memory.clone()));
        let iface = create_iface(interface_config(&settings)?).await?;

        match mode {
            DaemonMode::Server => {
                let server = TunnelServer::new(
                    TunnelServerConfig {
                        listen_addr: format!("{}:{}", settings.server.host, settings.server.port)
                            .parse()
                            .map_err(|_| {
                                DaemonError::InvalidRequest("invalid server.host/port".into())
                            })?,
                        tls: tls_material(&settings),
                        session: SessionConfig {
                            mtu: settings.network.mtu,
                            ..SessionConfig::default()
                        },
                    },
                    self.manager.clone(),
                    iface,
                    self.limiter.clone(),
                    self.tracker.clone(),
                    buffer_pool,
                );
                server.run(self.shutdown.clone()).await?;
            }
            DaemonMode::Client { endpoint, server_name } => {
                let client = TunnelClient::new(
                    TunnelClientConfig {
                        endpoint,
                        server_name,
                        tls: tls_material(&settings),
                        retry: meridian_retry::RetryConfig::default(),
                        session: SessionConfig {
                            mtu: settings.network.mtu,
                            ..SessionConfig::default()
                        },
                    },
                    self.manager.clone(),
                    iface,
                    self.limiter.clone(),
                    self.tracker.clone(),
                    buffer_pool,
                );
                client.run(self.shutdown.clone()).await?;
            }
        }

        self.manager.stop().await;
        Ok(())
    }
}

fn interface_config(settings: &Settings) -> Result<InterfaceConfig> {
    let (addr, prefix_len) = settings
        .network
        .address
        .split_once('/')
        .ok_or_else(|| DaemonError::InvalidRequest("network.address must be CIDR".into()))?;
    let address = IpAddr::from_str(addr)
        .map_err(|_| DaemonError::InvalidRequest("network.address has an invalid host part".into()))?;
    let prefix_len: u8 = prefix_len
        .parse()
        .map_err(|_| DaemonError::InvalidRequest("network.address has an invalid prefix".into()))?;
    Ok(InterfaceConfig {
        name: settings.network.interface.clone(),
        kind: InterfaceKind::L3,
        address,
        prefix_len,
        mtu: settings.network.mtu,
        persistent: false,
        read_timeout: std::time::Duration::from_secs(30),
    })
}

fn tls_material(settings: &Settings) -> TlsMaterial {
    let base = settings
        .config_path()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    TlsMaterial {
        cert_path: base.join("cert.pem"),
        key_path: base.join("key.pem"),
        ca_path: base.join("ca.pem"),
    }
}
