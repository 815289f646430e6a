use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::InterfaceConfig;
use crate::error::{IfaceError, Result};
use crate::VirtualInterface;

/// Placeholder backend: creating a real Windows TUN device needs a wintun
/// driver handle, which the `tun` crate's async support does not cover on
/// this platform. TODO: back this with `wintun` once a client build target
/// requires it.
pub async fn create(_config: InterfaceConfig) -> Result<Arc<dyn VirtualInterface>> {
    Err(IfaceError::IoError(
        "windows virtual interface backend is not implemented".into(),
    ))
}

#[allow(dead_code)]
struct WindowsInterface {
    address: IpAddr,
}

#[async_trait]
impl VirtualInterface for WindowsInterface {
    async fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(IfaceError::IoError("not implemented".into()))
    }

    async fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(IfaceError::IoError("not implemented".into()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn set_mtu(&self, _mtu: u32) -> Result<()> {
        Err(IfaceError::IoError("not implemented".into()))
    }

    fn set_flags(&self, _up: bool) -> Result<()> {
        Err(IfaceError::IoError("not implemented".into()))
    }

    fn name(&self) -> String {
        "windows-tun".into()
    }

    fn address(&self) -> IpAddr {
        self.address
    }
}
