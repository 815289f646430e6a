use std::net::IpAddr;
use std::time::Duration;

use meridian_core::InterfaceKind;

/// Device creation request (§4.1 Creation: "{name?, type, address/prefix,
/// mtu, persistent?}").
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub name: Option<String>,
    pub kind: InterfaceKind,
    pub address: IpAddr,
    pub prefix_len: u8,
    pub mtu: u32,
    /// If false, the device is destroyed on `close` (and best-effort on
    /// process crash); if true, it outlives the process.
    pub persistent: bool,
    pub read_timeout: Duration,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: None,
            kind: InterfaceKind::L3,
            address: IpAddr::from([10, 8, 0, 1]),
            prefix_len: 24,
            mtu: 1420,
            persistent: false,
            read_timeout: Duration::from_secs(30),
        }
    }
}
