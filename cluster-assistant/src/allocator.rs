//! Deterministic IP allocation for cluster nodes.
//!
//! Given the console IPs of N nodes (in sheet order), a subnet and the cluster
//! FQDN, the allocator hands out the first N usable host addresses of the
//! subnet positionally:
//!
//! ```text
//! position:  0          1          2          3          4
//! role:      master-00  master-01  master-02  worker-00  worker-01
//! address:   hosts[0]   hosts[1]   hosts[2]   hosts[3]   hosts[4]
//! ```
//!
//! Roles depend only on position, never on address values. Addresses already
//! in use inside the subnet are not tracked: running the allocator twice
//! against the same subnet yields the same addresses both times.

use cluster_assistant_sdk::{NodeAllocation, NodeRole, StageError};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Number of leading nodes that become masters
pub const MASTER_COUNT: usize = 3;

/// A parsed CIDR block.
///
/// Parsing is non-strict: host bits set in the supplied address are cleared
/// rather than rejected, so `10.1.2.3/16` is the network `10.1.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: IpAddr,
    prefix: u8,
}

impl Subnet {
    pub fn parse(text: &str) -> Result<Self, StageError> {
        let text = text.trim();
        let (address, prefix) = match text.split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (text, None),
        };

        let address: IpAddr = address.trim().parse().map_err(|_| StageError::Subnet {
            subnet: text.to_string(),
            reason: format!("'{}' is not an IP address", address),
        })?;

        let max_prefix = address_bits(&address) as u8;
        let prefix = match prefix {
            None => max_prefix,
            Some(raw) => Some(raw.trim())
                .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse::<u8>().ok())
                .filter(|prefix| *prefix <= max_prefix)
                .ok_or_else(|| StageError::Subnet {
                    subnet: text.to_string(),
                    reason: format!("prefix length must be between 0 and {}", max_prefix),
                })?,
        };

        let host_bits = address_bits(&address) - prefix as u32;
        let network_bits = to_u128(&address) & network_mask(host_bits);

        Ok(Self {
            network: from_u128(&address, network_bits),
            prefix,
        })
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    fn host_bits(&self) -> u32 {
        address_bits(&self.network) - self.prefix as u32
    }

    /// Offset of the first usable host from the network address, and how
    /// many usable hosts there are.
    ///
    /// IPv4 excludes the network and broadcast addresses, IPv6 excludes the
    /// subnet-router anycast address. Point-to-point (/31, /127) and
    /// single-address blocks keep every address.
    fn usable_range(&self) -> (u128, u128) {
        let host_bits = self.host_bits();
        match (self.network, host_bits) {
            (_, 0) => (0, 1),
            (_, 1) => (0, 2),
            (IpAddr::V4(_), bits) => (1, (1u128 << bits) - 2),
            (IpAddr::V6(_), 128) => (1, u128::MAX),
            (IpAddr::V6(_), bits) => (1, (1u128 << bits) - 1),
        }
    }

    pub fn usable_host_count(&self) -> u128 {
        self.usable_range().1
    }

    /// The `index`-th usable host address, if the subnet has that many
    pub fn host(&self, index: u128) -> Option<IpAddr> {
        let (offset, count) = self.usable_range();
        if index >= count {
            return None;
        }
        let value = to_u128(&self.network) + offset + index;
        Some(from_u128(&self.network, value))
    }

    /// Usable host addresses in ascending order
    pub fn hosts(&self) -> impl Iterator<Item = IpAddr> + '_ {
        (0..self.usable_host_count()).filter_map(move |index| self.host(index))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn address_bits(address: &IpAddr) -> u32 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn network_mask(host_bits: u32) -> u128 {
    if host_bits >= 128 {
        0
    } else {
        u128::MAX << host_bits
    }
}

fn to_u128(address: &IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u32::from(*v4) as u128,
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

fn from_u128(family: &IpAddr, value: u128) -> IpAddr {
    match family {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(value as u32)),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

/// Role and per-role ordinal for a node at `index` in input order
pub fn role_for_position(index: usize) -> (NodeRole, usize) {
    if index < MASTER_COUNT {
        (NodeRole::Master, index)
    } else {
        (NodeRole::Worker, index - MASTER_COUNT)
    }
}

/// `master-00`, `worker-12`, ...
pub fn hostname_for(role: NodeRole, ordinal: usize) -> String {
    format!("{}-{:02}", role, ordinal)
}

/// Assign roles, hostnames and subnet addresses to `node_ips`.
///
/// Fails with [`StageError::Subnet`] when `subnet` is not a CIDR block and
/// with [`StageError::Allocation`] when it has fewer usable hosts than there
/// are nodes. Never truncates.
pub fn allocate(
    node_ips: &[String],
    subnet: &str,
    cluster_fqdn: &str,
) -> Result<Vec<NodeAllocation>, StageError> {
    let network = Subnet::parse(subnet)?;
    let available = network.usable_host_count();
    let insufficient = || StageError::Allocation {
        subnet: subnet.trim().to_string(),
        requested: node_ips.len(),
        available,
    };

    if available < node_ips.len() as u128 {
        return Err(insufficient());
    }

    let domain = cluster_fqdn.trim().trim_end_matches('.');

    node_ips
        .iter()
        .enumerate()
        .map(|(index, console_ip)| {
            let (role, ordinal) = role_for_position(index);
            let hostname = hostname_for(role, ordinal);
            let allocated_ip = network.host(index as u128).ok_or_else(insufficient)?;

            Ok(NodeAllocation {
                role,
                ordinal,
                fqdn: format!("{}.{}", hostname, domain),
                hostname,
                console_ip: console_ip.trim().to_string(),
                allocated_ip: allocated_ip.to_string(),
                subnet: subnet.trim().to_string(),
            })
        })
        .collect()
}
