//! Default gateway resolution from the kernel routing table.
//!
//! Inside a container the host agent is usually reachable only through the
//! bridge gateway. The kernel exposes the routing table as text:
//!
//! ```text
//! Iface   Destination  Gateway   Flags  RefCnt  Use  Metric  Mask      MTU  Window  IRTT
//! eth0    00000000     010011AC  0003   0       0    0       00000000  0    0       0
//! eth0    000011AC     00000000  0001   0       0    0       0000FFFF  0    0       0
//! ```
//!
//! The row with destination `00000000` is the default route; its gateway
//! column is an IPv4 address in little-endian hex (`010011AC` = `172.17.0.1`).

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::error::{DiscoveryError, Result};

/// Resolves the default network gateway.
pub trait GatewayResolver: Send + Sync {
    /// Default gateway address, `Ok(None)` if the table has no default route.
    fn default_gateway(&self) -> Result<Option<Ipv4Addr>>;
}

/// Routing table file, normally `/proc/net/route`.
#[derive(Debug, Clone)]
pub struct RouteTable {
    path: PathBuf,
}

impl RouteTable {
    /// Resolver reading the routing table at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the routing table.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new("/proc/net/route")
    }
}

impl GatewayResolver for RouteTable {
    fn default_gateway(&self) -> Result<Option<Ipv4Addr>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            DiscoveryError::Gateway(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        parse_default_gateway(&content)
    }
}

/// Find the default route's gateway in routing table text.
pub fn parse_default_gateway(content: &str) -> Result<Option<Ipv4Addr>> {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            continue;
        }

        // On-link default route has no gateway to probe
        let gateway = parse_hex_addr(fields[2])?;
        return Ok(Some(gateway).filter(|addr| !addr.is_unspecified()));
    }

    Ok(None)
}

fn parse_hex_addr(hex: &str) -> Result<Ipv4Addr> {
    let raw = u32::from_str_radix(hex, 16)
        .map_err(|e| DiscoveryError::Gateway(format!("Invalid gateway address {hex:?}: {e}")))?;

    Ok(Ipv4Addr::from(raw.to_le_bytes()))
}
