use std::net::SocketAddr;
use std::sync::Arc;

use meridian_iface::VirtualInterface;
use meridian_manager::ConnectionManager;
use meridian_manager::Result as ManagerResult;
use meridian_memory::BufferPool;
use meridian_ratelimit::RateLimiter;
use meridian_tracker::ConnectionTracker;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Result, TransportError};
use crate::session::{run_session, SessionConfig};
use crate::tls::{server_acceptor, TlsMaterial};

#[derive(Debug, Clone)]
pub struct TunnelServerConfig {
    pub listen_addr: SocketAddr,
    pub tls: TlsMaterial,
    pub session: SessionConfig,
}

/// Binds a TLS listener and, for each accepted peer, handshakes with
/// mutual auth, submits to the connection manager's admission control,
/// and launches a session against the shared virtual interface (§4.9
/// Server).
pub struct TunnelServer {
    config: TunnelServerConfig,
    manager: Arc<ConnectionManager<()>>,
    iface: Arc<dyn VirtualInterface>,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConnectionTracker>,
    buffer_pool: Arc<BufferPool>,
}

impl TunnelServer {
    pub fn new(
        config: TunnelServerConfig,
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

    /// Runs the accept loop until `shutdown` fires. Closes the listener,
    /// signals every session to drain via the manager's shutdown token,
    /// then closes the interface last.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(TransportError::from)?;
        let acceptor = server_acceptor(&self.config.tls)?;
        info!(addr = %self.config.listen_addr, "tunnel server listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (tcp, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    self.handle_connection(tcp, peer_addr, acceptor.clone());
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!("tunnel server draining sessions");
        self.manager.stop().await;
        let _ = self.iface.close().await;
        Ok(())
    }

    fn handle_connection(
        &self,
        tcp: tokio::net::TcpStream,
        peer_addr: SocketAddr,
        acceptor: tokio_rustls::TlsAcceptor,
    ) {
        let manager = self.manager.clone();
        let iface = self.iface.clone();
        let limiter = self.limiter.clone();
        let tracker = self.tracker.clone();
        let buffer_pool = self.buffer_pool.clone();
        let session_config = self.config.session.clone();
        let session_shutdown = manager.shutdown_token();

        tokio::spawn(async move {
            let addr_key = peer_addr.to_string();
            let tls_stream = match acceptor.accept(tcp).await {
                Ok(s) => s,
                Err(e) => {
                    error!(addr = %addr_key, error = %e, "tls handshake failed");
                    return;
                }
            };

            let admission: ManagerResult<std::sync::Arc<()>, std::convert::Infallible> =
                manager.accept(&addr_key, ()).await;
            if let Err(e) = admission {
                warn!(addr = %addr_key, error = %e, "connection rejected");
                return;
            }

            let guard = manager.register_session();
            let result = run_session(
                tls_stream,
                iface,
                limiter,
                tracker,
                buffer_pool,
                addr_key.clone(),
                session_shutdown,
                session_config,
            )
            .await;
            drop(guard);
            manager.remove(&addr_key).await;

            if let Err(e) = result {
                warn!(addr = %addr_key, error = %e, "session ended with error");
            }
        });
    }
}
