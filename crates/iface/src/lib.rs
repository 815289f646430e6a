//! Virtual Interface Adapter (spec §4.1)
//!
//! A Layer-3 TUN device behind a small async trait, so the session loop
//! (`meridian-transport`) never has to know which platform backend it is
//! talking to. Real devices are created per-OS; [`mock::MockInterface`]
//! gives tests an in-memory stand-in that needs no elevated privilege.

mod config;
mod error;
pub mod mock;

#[cfg(unix)]
#[path = "unix.rs"]
mod platform;

#[cfg(windows)]
#[path = "windows.rs"]
mod platform;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

pub use config::InterfaceConfig;
pub use error::{IfaceError, Result};
pub use meridian_core::InterfaceKind;

/// Capabilities of a live virtual network device (§4.1). `read`/`write`
/// operate on whole IP packets; `read` suspends until one is available.
#[async_trait]
pub trait VirtualInterface: Send + Sync {
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;
    async fn write(&self, buf: &[u8]) -> Result<usize>;
    async fn close(&self) -> Result<()>;
    fn set_mtu(&self, mtu: u32) -> Result<()>;
    fn set_flags(&self, up: bool) -> Result<()>;
    fn name(&self) -> String;
    fn address(&self) -> IpAddr;
}

/// Creates a platform device with link up and address configured, ready
/// for `read`/`write` (§4.1 Creation). `InterfaceKind::L2` is rejected;
/// this data plane only carries raw IP packets.
pub async fn create_iface(config: InterfaceConfig) -> Result<Arc<dyn VirtualInterface>> {
    if config.kind != InterfaceKind::L3 {
        return Err(IfaceError::InvalidConfig(
            "only L3 interfaces are supported".into(),
        ));
    }
    if config.prefix_len > 128 {
        return Err(IfaceError::InvalidConfig(format!(
            "prefix length {} out of range",
            config.prefix_len
        )));
    }
    if config.mtu == 0 || config.mtu > 65535 {
        return Err(IfaceError::InvalidConfig(format!(
            "mtu {} out of range",
            config.mtu
        )));
    }
    platform::create(config).await
}
