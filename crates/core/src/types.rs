use serde::{Deserialize, Serialize};

use crate::error::{MeridianError, Result};

/// Layer-3 vs layer-2 virtual device (§3 Interface). Meridian only
/// implements L3 (the tunnel carries raw IP packets); the variant is
/// kept so configuration can reject L2 requests explicitly instead of
/// silently ignoring the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    L3,
    L2,
}

/// A remote transport endpoint: identity is the `host:port` string
/// (§3 Endpoint). `weight` and `healthy` exist for multi-endpoint
/// configurations even though this spec's data plane is point-to-point;
/// they are carried so the external configuration collaborator (§1) has
/// somewhere to put them without the core type changing shape later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub healthy: bool,
}

fn default_weight() -> u32 {
    1
}

impl Endpoint {
    pub fn parse(addr: &str) -> Result<Self> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| MeridianError::InvalidEndpoint(addr.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| MeridianError::InvalidEndpoint(addr.to_string()))?;
        if host.is_empty() {
            return Err(MeridianError::InvalidEndpoint(addr.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            weight: 1,
            healthy: true,
        })
    }

    /// Identity string used as the rate-limiter/tracker key (§3: "Identity
    /// is the address string").
    pub fn identity(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
