//! An in-memory [`VirtualInterface`] for tests, needing no elevated
//! privilege or real OS device. `inbound` is what `read` returns;
//! `outbound` collects everything passed to `write`.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{IfaceError, Result};
use crate::VirtualInterface;

pub struct MockInterface {
    name: String,
    address: IpAddr,
    inbound_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: Mutex<bool>,
}

/// The test-side handle paired with a [`MockInterface`]: `push_inbound`
/// simulates a packet arriving on the device; `drain_outbound` collects
/// what the session wrote to it.
pub struct MockHandle {
    inbound_tx: mpsc::Sender<Vec<u8>>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MockHandle {
    pub async fn push_inbound(&self, packet: Vec<u8>) {
        let _ = self.inbound_tx.send(packet).await;
    }

    pub async fn drain_outbound(&self) -> Option<Vec<u8>> {
        self.outbound_rx.lock().recv().await
    }
}

pub fn pair(name: impl Into<String>, address: IpAddr) -> (Arc<MockInterface>, MockHandle) {
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let iface = Arc::new(MockInterface {
        name: name.into(),
        address,
        inbound_rx: Mutex::new(inbound_rx),
        outbound_tx,
        closed: Mutex::new(false),
    });
    let handle = MockHandle {
        inbound_tx,
        outbound_rx: Mutex::new(outbound_rx),
    };
    (iface, handle)
}

#[async_trait]
impl VirtualInterface for MockInterface {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if *self.closed.lock() {
            return Err(IfaceError::Closed);
        }
        let packet = {
            let mut rx = self.inbound_rx.lock();
            rx.recv().await
        };
        match packet {
            Some(packet) => {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                Ok(n)
            }
            None => Err(IfaceError::Closed),
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        if *self.closed.lock() {
            return Err(IfaceError::Closed);
        }
        self.outbound_tx
            .send(buf.to_vec())
            .map_err(|_| IfaceError::Closed)?;
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }

    fn set_mtu(&self, _mtu: u32) -> Result<()> {
        Ok(())
    }

    fn set_flags(&self, _up: bool) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn address(&self) -> IpAddr {
        self.address
    }
}
