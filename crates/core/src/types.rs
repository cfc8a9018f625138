//! Core types shared by every WorkNet crate.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// Identifier of a node as carried on the mesh wire.
///
/// Ordering is total and deterministic across nodes: ids that both parse as
/// unsigned integers compare numerically, numeric ids sort before anything
/// else, and the remainder compare lexicographically. The election tie-break
/// relies on every node agreeing on this order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

/// Stable identity of the local node, derived once from its hardware address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Numeric chip id (low 32 bits of the hardware address)
    pub chip_id: u32,
    /// Wire identifier (decimal chip id)
    pub node_id: NodeId,
    /// Human-readable name, e.g. `SafeHat-1a2b`
    pub name: String,
    /// Colon-separated hardware address
    pub mac: String,
}

impl NodeIdentity {
    /// Derive the identity from a 6-byte hardware address.
    pub fn from_mac(mac: [u8; 6], name_prefix: &str) -> Self {
        let chip_id = u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]]);
        Self {
            chip_id,
            node_id: NodeId::from(chip_id),
            name: format!("{}-{:02x}{:02x}", name_prefix, mac[4], mac[5]),
            mac: format_mac(&mac),
        }
    }

    /// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated) and derive the identity.
    pub fn parse(mac: &str, name_prefix: &str) -> Result<Self> {
        Ok(Self::from_mac(parse_mac(mac)?, name_prefix))
    }
}

/// Parse a textual hardware address into its six octets.
pub fn parse_mac(mac: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = mac.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(Error::InvalidMac(mac.to_string()));
    }

    let mut bytes = [0u8; 6];
    for (slot, part) in bytes.iter_mut().zip(parts) {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidMac(mac.to_string()));
        }
        *slot = u8::from_str_radix(part, 16).map_err(|_| Error::InvalidMac(mac.to_string()))?;
    }
    Ok(bytes)
}

/// Format six octets as lowercase colon-separated hex.
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
