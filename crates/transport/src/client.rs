use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use meridian_iface::VirtualInterface;
use meridian_manager::ConnectionManager;
use meridian_memory::BufferPool;
use meridian_ratelimit::RateLimiter;
use meridian_retry::{Factory, RetryConfig, RetryManager};
use meridian_tracker::ConnectionTracker;
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, TransportError};
use crate::session::{run_session, SessionConfig};
use crate::tls::{client_connector, TlsMaterial};

#[derive(Debug, Clone)]
pub struct TunnelClientConfig {
    pub endpoint: SocketAddr,
    pub server_name: String,
    pub tls: TlsMaterial,
    pub retry: RetryConfig,
    pub session: SessionConfig,
}

struct DialFactory {
    connector: TlsConnector,
    target: SocketAddr,
    server_name: ServerName<'static>,
}

#[async_trait]
impl Factory<TlsStream<TcpStream>> for DialFactory {
    type Error = TransportError;

    async fn create(
        &self,
        _ctx: &CancellationToken,
    ) -> std::result::Result<TlsStream<TcpStream>, TransportError> {
        let tcp = TcpStream::connect(self.target).await?;
        self.connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))
    }
}

/// Dials the configured endpoint through the retry manager, then runs one
/// session against the shared interface. On session exit for any reason
/// other than shutdown, re-enters the retry manager (§4.9 Client).
pub struct TunnelClient {
    config: TunnelClientConfig,
    manager: Arc<ConnectionManager<()>>,
    iface: Arc<dyn VirtualInterface>,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConnectionTracker>,
    buffer_pool: Arc<BufferPool>,
}

impl TunnelClient {
    pub fn new(
        config: TunnelClientConfig,
        manager: Arc<ConnectionManager<()>>,
        iface: Arc<dyn VirtualInterface>,
        limiter: Arc<RateLimiter>,
        tracker: Arc<ConnectionTracker>,
        buffer_pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            config,
            manager,
            iface,
            limiter,
            tracker,
            buffer_pool,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let connector = client_connector(&self.config.tls)?;
        let server_name = ServerName::try_from(self.config.server_name.clone())
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
        let factory = Arc::new(DialFactory {
            connector,
            target: self.config.endpoint,
            server_name,
        });
        let key = self.config.endpoint.to_string();

        while !shutdown.is_cancelled() {
            let retry = RetryManager::new(self.config.retry.clone(), factory.clone());
            let stream = match retry.get(&shutdown).await {
                Ok(s) => s,
                Err(e) => {
                    if shutdown.is_cancelled() {
                        return Ok(());
                    }
                    return Err(TransportError::HandshakeFailed(e.to_string()));
                }
            };

            let admission: meridian_manager::Result<Arc<()>, std::convert::Infallible> =
                self.manager.accept(&key, ()).await;
            if let Err(e) = admission {
                warn!(addr = %key, error = %e, "client connection rejected by admission control");
                continue;
            }

            info!(addr = %key, "tunnel client connected");
            let guard = self.manager.register_session();
            let result = run_session(
                stream,
                self.iface.clone(),
                self.limiter.clone(),
                self.tracker.clone(),
                self.buffer_pool.clone(),
                key.clone(),
                shutdown.clone(),
                self.config.session.clone(),
            )
            .await;
            drop(guard);
            self.manager.remove(&key).await;

            if let Err(e) = result {
                warn!(addr = %key, error = %e, "session ended, re-entering retry");
            }
        }

        Ok(())
    }
}
