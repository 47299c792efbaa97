use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Policy band for subnet prefixes. Anything shorter than /8 is too large
/// to inventory; anything longer than /30 leaves no assignable hosts once
/// the network and broadcast addresses are carved out.
pub const MIN_PREFIX: u8 = 8;
pub const MAX_PREFIX: u8 = 30;

/// A validated, canonical IPv4 network range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkRange {
    net: Ipv4Net,
}

impl NetworkRange {
    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn prefix(&self) -> u8 {
        self.net.prefix_len()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    /// First assignable host address (network + 1).
    pub fn first_usable(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network()) + 1)
    }

    /// Last assignable host address (broadcast - 1).
    pub fn last_usable(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.broadcast()) - 1)
    }

    /// Every address in the range, network and broadcast included.
    pub fn total_addresses(&self) -> u64 {
        1u64 << (32 - self.prefix())
    }

    /// Range bounds as unsigned integers, for intersection math.
    pub fn first(&self) -> u32 {
        u32::from(self.network())
    }

    pub fn last(&self) -> u32 {
        u32::from(self.broadcast())
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.net.contains(&ip)
    }

    /// True when `ip` can carry an assignment: inside the range and neither
    /// the network nor the broadcast address.
    pub fn is_usable(&self, ip: Ipv4Addr) -> bool {
        let n = u32::from(ip);
        n > self.first() && n < self.last()
    }

    /// Canonical text form, e.g. `10.0.0.0/24`.
    pub fn cidr(&self) -> String {
        self.net.to_string()
    }
}

/// Parse and validate a `a.b.c.d/n` string into a canonical network range.
///
/// Rejections, in order: malformed shape, octet outside 0-255, prefix
/// outside the policy band, host bits set below the mask (the error carries
/// the corrected CIDR so callers can offer a one-click fix).
pub fn validate(cidr: &str) -> Result<NetworkRange> {
    let trimmed = cidr.trim();
    let (addr_part, prefix_part) = trimmed
        .split_once('/')
        .ok_or_else(|| Error::InvalidCidrFormat(trimmed.to_string()))?;

    let octet_parts: Vec<&str> = addr_part.split('.').collect();
    if octet_parts.len() != 4 {
        return Err(Error::InvalidCidrFormat(trimmed.to_string()));
    }

    let mut addr: u32 = 0;
    for part in &octet_parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidCidrFormat(trimmed.to_string()));
        }
        // All-digit text that fails to parse or exceeds 255 is a value
        // problem, not a shape problem.
        let value = part.parse::<u32>().ok().filter(|v| *v <= 255).ok_or_else(|| {
            Error::OctetOutOfRange {
                cidr: trimmed.to_string(),
                octet: part.to_string(),
            }
        })?;
        addr = (addr << 8) | value;
    }

    if prefix_part.is_empty() || !prefix_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidCidrFormat(trimmed.to_string()));
    }
    let prefix = prefix_part
        .parse::<u32>()
        .map_err(|_| Error::InvalidCidrFormat(trimmed.to_string()))?;
    if prefix < MIN_PREFIX as u32 || prefix > MAX_PREFIX as u32 {
        return Err(Error::PrefixOutOfRange {
            prefix,
            min: MIN_PREFIX,
            max: MAX_PREFIX,
        });
    }
    let prefix = prefix as u8;

    let mask = u32::MAX << (32 - prefix);
    if addr & !mask != 0 {
        let network = Ipv4Addr::from(addr & mask);
        return Err(Error::MisalignedNetwork {
            supplied: trimmed.to_string(),
            suggested: format!("{}/{}", network, prefix),
        });
    }

    let net = Ipv4Net::new(Ipv4Addr::from(addr), prefix)
        .map_err(|_| Error::InvalidCidrFormat(trimmed.to_string()))?;

    Ok(NetworkRange { net })
}

/// Parse a bare dotted-quad address.
pub fn parse_address(addr: &str) -> Result<Ipv4Addr> {
    addr.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| Error::InvalidAddress(addr.trim().to_string()))
}
