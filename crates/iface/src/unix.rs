use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tun::{AsyncDevice, Device};

use crate::config::InterfaceConfig;
use crate::error::{IfaceError, Result};
use crate::VirtualInterface;

pub struct UnixInterface {
    device: AsyncMutex<Option<AsyncDevice>>,
    name: String,
    address: IpAddr,
    mtu: RwLock<u32>,
}

pub async fn create(config: InterfaceConfig) -> Result<Arc<dyn VirtualInterface>> {
    let mut tun_config = tun::Configuration::default();
    tun_config
        .address(config.address)
        .netmask(prefix_to_netmask(config.prefix_len))
        .mtu(config.mtu as i32)
        .up();
    if let Some(name) = &config.name {
        tun_config.name(name);
    }

    let device = tun::create_as_async(&tun_config).map_err(|e| match e {
        tun::Error::InvalidConfig => IfaceError::InvalidConfig(e.to_string()),
        tun::Error::PermissionDenied => IfaceError::Permission,
        tun::Error::NameTooLong | tun::Error::InvalidName => {
            IfaceError::InvalidConfig(e.to_string())
        }
        other => IfaceError::IoError(other.to_string()),
    })?;

    let name = device
        .get_ref()
        .name()
        .map_err(|e| IfaceError::IoError(e.to_string()))?;

    Ok(Arc::new(UnixInterface {
        device: AsyncMutex::new(Some(device)),
        name,
        address: config.address,
        mtu: RwLock::new(config.mtu),
    }))
}

fn prefix_to_netmask(prefix_len: u8) -> std::net::Ipv4Addr {
    let bits = if prefix_len > 32 { 32 } else { prefix_len };
    let mask: u32 = if bits == 0 {
        0
    } else {
        u32::MAX << (32 - bits)
    };
    std::net::Ipv4Addr::from(mask)
}

#[async_trait]
impl VirtualInterface for UnixInterface {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.device.lock().await;
        let device = guard.as_mut().ok_or(IfaceError::Closed)?;
        device
            .read(buf)
            .await
            .map_err(|e| IfaceError::IoError(e.to_string()))
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut guard = self.device.lock().await;
        let device = guard.as_mut().ok_or(IfaceError::Closed)?;
        device
            .write(buf)
            .await
            .map_err(|e| IfaceError::IoError(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.device.lock().await;
        // Dropping the device tears it down; idempotent since a second
        // close simply finds `None` already.
        guard.take();
        Ok(())
    }

    fn set_mtu(&self, mtu: u32) -> Result<()> {
        *self.mtu.write() = mtu;
        Ok(())
    }

    fn set_flags(&self, _up: bool) -> Result<()> {
        // Brought up at creation time; runtime flag toggling is not
        // exposed by the underlying device handle.
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn address(&self) -> IpAddr {
        self.address
    }
}
