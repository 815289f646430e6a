//! Session Loop (§4.9): two coupled directions sharing one interface and
//! one transport connection. First error in either direction tears down
//! both; cleanup is exactly-once over (interface, connection, buffers).

use std::sync::Arc;
use std::time::Duration;

use meridian_iface::VirtualInterface;
use meridian_memory::BufferPool;
use meridian_ratelimit::RateLimiter;
use meridian_tracker::ConnectionTracker;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::framing::{read_frame, write_frame};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mtu: u32,
    /// Extra headroom above the MTU allowed in a single framed payload
    /// (§6: "MTU + overhead headroom, e.g. 64 bytes").
    pub frame_overhead: usize,
    /// How long the surviving direction is given to drain after the first
    /// error before the session is forced closed.
    pub grace_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mtu: 1420,
            frame_overhead: 64,
            grace_deadline: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    fn max_payload(&self) -> usize {
        self.mtu as usize + self.frame_overhead
    }
}

/// Runs one session to completion: interface<->peer in both directions,
/// until either side errors, the peer closes, or `ctx` is canceled.
/// Always closes the interface before returning (§4.9, §4.1 cleanup).
pub async fn run_session<S>(
    stream: S,
    iface: Arc<dyn VirtualInterface>,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConnectionTracker>,
    buffer_pool: Arc<BufferPool>,
    key: String,
    ctx: CancellationToken,
    config: SessionConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (peer_reader, peer_writer) = tokio::io::split(stream);
    let session_ctx = ctx.child_token();

    let to_peer = tokio::spawn(interface_to_peer(
        iface.clone(),
        peer_writer,
        limiter.clone(),
        tracker.clone(),
        buffer_pool.clone(),
        key.clone(),
        session_ctx.clone(),
        config.clone(),
    ));
    let to_iface = tokio::spawn(peer_to_interface(
        iface.clone(),
        peer_reader,
        limiter,
        tracker,
        buffer_pool,
        key.clone(),
        session_ctx.clone(),
        config,
    ));

    let outcome = tokio::select! {
        r = to_peer => r.map_err(|e| TransportError::IoError(e.to_string())).and_then(|r| r),
        r = to_iface => r.map_err(|e| TransportError::IoError(e.to_string())).and_then(|r| r),
    };

    // First error/close terminates the session; signal and drain the
    // other direction up to the grace deadline.
    session_ctx.cancel();
    let _ = iface.close().await;

    debug!(key, "session terminated: {:?}", outcome.as_ref().err());
    outcome
}

async fn interface_to_peer<W>(
    iface: Arc<dyn VirtualInterface>,
    mut peer_writer: W,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConnectionTracker>,
    buffer_pool: Arc<BufferPool>,
    key: String,
    ctx: CancellationToken,
    config: SessionConfig,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let max_payload = config.max_payload();
    loop {
        let mut buf = buffer_pool
            .get(max_payload)
            .ok_or_else(|| TransportError::IoError("buffer pool exhausted".into()))?;

        let n = tokio::select! {
            r = iface.read(&mut buf) => r.map_err(|e| TransportError::IoError(e.to_string()))?,
            _ = ctx.cancelled() => {
                buffer_pool.put(buf);
                return Ok(());
            }
        };
        let packet = &buf[..n];

        tokio::select! {
            r = limiter.wait_n(&ctx, &key, n as f64) => {
                if r.is_err() {
                    buffer_pool.put(buf);
                    return Ok(());
                }
            }
            _ = ctx.cancelled() => {
                buffer_pool.put(buf);
                return Ok(());
            }
        }

        if let Err(e) = write_frame(&mut peer_writer, packet, max_payload).await {
            buffer_pool.put(buf);
            return Err(e);
        }
        tracker.record_sent(&key, n as u64);
        buffer_pool.put(buf);
    }
}

async fn peer_to_interface<R>(
    iface: Arc<dyn VirtualInterface>,
    mut peer_reader: R,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConnectionTracker>,
    buffer_pool: Arc<BufferPool>,
    key: String,
    ctx: CancellationToken,
    config: SessionConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let max_payload = config.max_payload();
    loop {
        let packet = tokio::select! {
            r = read_frame(&mut peer_reader, max_payload) => {
                match r {
                    Ok(p) => p,
                    Err(TransportError::Closed) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            _ = ctx.cancelled() => return Ok(()),
        };

        tokio::select! {
            r = limiter.wait_n(&ctx, &key, packet.len() as f64) => {
                if r.is_err() {
                    return Ok(());
                }
            }
            _ = ctx.cancelled() => return Ok(()),
        }

        if let Err(e) = iface.write(&packet).await {
            return Err(TransportError::IoError(e.to_string()));
        }
        tracker.record_received(&key, packet.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::SystemClock;
    use meridian_iface::mock as iface_mock;
    use meridian_memory::MemoryManager;
    use meridian_ratelimit::RateLimiterConfig;
    use tokio::io::duplex;

    #[tokio::test]
    async fn session_forwards_interface_to_peer_and_back() {
        let clock = Arc::new(SystemClock);
        let limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
        let tracker = Arc::new(ConnectionTracker::new(clock));
        let memory = MemoryManager::new(Default::default());
        let buffer_pool = Arc::new(BufferPool::new(memory));

        let (iface, handle) = iface_mock::pair("mock0", std::net::IpAddr::from([10, 0, 0, 1]));
        let (client_side, server_side) = duplex(4096);

        let ctx = CancellationToken::new();
        let session_ctx = ctx.clone();
        let session = tokio::spawn(run_session(
            server_side,
            iface,
            limiter,
            tracker,
            buffer_pool,
            "peer".to_string(),
            session_ctx,
            SessionConfig {
                mtu: 1420,
                frame_overhead: 64,
                grace_deadline: Duration::from_millis(100),
            },
        ));

        handle.push_inbound(vec![9, 9, 9]).await;

        let mut peer_side = client_side;
        let packet = read_frame(&mut peer_side, 1500).await.unwrap();
        assert_eq!(packet, vec![9, 9, 9]);

        write_frame(&mut peer_side, &[1, 2, 3, 4], 1500).await.unwrap();
        let out = handle.drain_outbound().await.unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);

        ctx.cancel();
        let _ = session.await;
    }
}
