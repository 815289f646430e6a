//! End-to-end session teardown (spec scenario 6): a client dials a
//! server over mutually-authenticated TLS, a packet crosses in each
//! direction, then the peer goes away mid-session. Both sides must
//! notice within the grace deadline, close their own interface, and
//! the server's connection manager must drop the session from its
//! admission bookkeeping.

mod common;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use meridian_breaker::{BreakerConfig, CircuitBreaker};
use meridian_core::SystemClock;
use meridian_iface::{mock, IfaceError, VirtualInterface};
use meridian_manager::{ConnectionManager, ConnectionManagerConfig};
use meridian_memory::{BufferPool, MemoryManager, MemoryManagerConfig};
use meridian_ratelimit::{RateLimiter, RateLimiterConfig};
use meridian_retry::RetryConfig;
use meridian_tracker::ConnectionTracker;
use meridian_transport::{
    SessionConfig, TunnelClient, TunnelClientConfig, TunnelServer, TunnelServerConfig,
};
use tokio_util::sync::CancellationToken;

fn endpoint_stack(
    max_connections: usize,
) -> (
    Arc<ConnectionManager<()>>,
    Arc<RateLimiter>,
    Arc<ConnectionTracker>,
    Arc<BufferPool>,
) {
    let clock = Arc::new(SystemClock);
    let breaker = Arc::new(CircuitBreaker::new("test", BreakerConfig::default(), clock.clone()));
    let limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
    let tracker = Arc::new(ConnectionTracker::new(clock));
    let memory = MemoryManager::new(MemoryManagerConfig::default());
    let buffer_pool = Arc::new(BufferPool::new(memory));
    let manager = ConnectionManager::new(
        ConnectionManagerConfig {
            max_connections,
            ..ConnectionManagerConfig::default()
        },
        breaker,
        limiter.clone(),
        tracker.clone(),
        None,
        None,
    );
    (manager, limiter, tracker, buffer_pool)
}

async fn wait_for<F: Fn() -> bool>(predicate: F, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !predicate() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn session_torn_down_when_peer_disconnects() {
    let identities = common::TunnelIdentities::generate();
    let port = common::free_port();
    let listen_addr: std::net::SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let (server_manager, server_limiter, server_tracker, server_buffers) = endpoint_stack(8);
    let (client_manager, client_limiter, client_tracker, client_buffers) = endpoint_stack(8);

    let (server_iface, server_handle) = mock::pair("server-tun", IpAddr::from([10, 8, 0, 1]));
    let (client_iface, client_handle) = mock::pair("client-tun", IpAddr::from([10, 8, 0, 2]));
    let server_iface_probe = server_iface.clone();

    let server = TunnelServer::new(
        TunnelServerConfig {
            listen_addr,
            tls: identities.server_material(),
            session: SessionConfig {
                grace_deadline: Duration::from_millis(200),
                ..SessionConfig::default()
            },
        },
        server_manager.clone(),
        server_iface as Arc<dyn VirtualInterface>,
        server_limiter,
        server_tracker,
        server_buffers,
    );

    let client = TunnelClient::new(
        TunnelClientConfig {
            endpoint: listen_addr,
            server_name: "localhost".to_string(),
            tls: identities.client_material(),
            retry: RetryConfig::default(),
            session: SessionConfig {
                grace_deadline: Duration::from_millis(200),
                ..SessionConfig::default()
            },
        },
        client_manager,
        client_iface as Arc<dyn VirtualInterface>,
        client_limiter,
        client_tracker,
        client_buffers,
    );

    let server_shutdown = CancellationToken::new();
    let client_shutdown = CancellationToken::new();

    let server_task = tokio::spawn({
        let shutdown = server_shutdown.clone();
        async move { server.run(shutdown).await }
    });
    let client_task = tokio::spawn({
        let shutdown = client_shutdown.clone();
        async move { client.run(shutdown).await }
    });

    wait_for(|| server_manager.connection_count() == 1, Duration::from_secs(5)).await;

    // A packet crosses in each direction while the session is live.
    client_handle.push_inbound(vec![7, 7, 7]).await;
    let forwarded = server_handle.drain_outbound().await.expect("packet reached server side");
    assert_eq!(forwarded, vec![7, 7, 7]);

    server_handle.push_inbound(vec![9, 9]).await;
    let echoed = client_handle.drain_outbound().await.expect("packet reached client side");
    assert_eq!(echoed, vec![9, 9]);

    // The peer goes away: cancel the client's run loop, which drops its
    // TCP connection without a clean close.
    client_shutdown.cancel();
    let _ = client_task.await;

    wait_for(|| server_manager.connection_count() == 0, Duration::from_secs(2)).await;

    let mut scratch = [0u8; 16];
    assert!(matches!(
        server_iface_probe.read(&mut scratch).await,
        Err(IfaceError::Closed)
    ));

    server_shutdown.cancel();
    let _ = server_task.await;
}
