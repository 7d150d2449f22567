//! # Host Table
//!
//! Purpose: Hold the ordered set of cache servers and the lazily created
//! connection for each.
//!
//! ## Design Principles
//! 1. **Deterministic Order**: Hosts are sorted by (family, address bytes, port)
//!    at construction. Two clients configured with the same hosts in any order
//!    shard identically.
//! 2. **Fixed Membership**: Entries live for the whole client lifetime; only the
//!    connection slot changes (None -> Some on connect, Some -> None on error).
//! 3. **Fail at Init**: Unsupported address families are rejected when the
//!    table is built, never at request time.

use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use emc_common::ConnectionId;

use crate::client::{ClientError, ClientResult};

/// Address of a configured host, tagged by family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAddress {
    /// IPv4 or IPv6 socket address.
    Inet(SocketAddr),
    /// Local socket path; recognised, but not a supported family.
    Unix(PathBuf),
}

impl From<SocketAddr> for HostAddress {
    fn from(addr: SocketAddr) -> Self {
        HostAddress::Inet(addr)
    }
}

impl FromStr for HostAddress {
    type Err = ClientError;

    /// Parses `ip:port`, `[ipv6]:port`, or `unix:/path`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("unix:") {
            return Ok(HostAddress::Unix(PathBuf::from(path)));
        }
        raw.parse::<SocketAddr>()
            .map(HostAddress::Inet)
            .map_err(|_| ClientError::InvalidAddress(raw.to_string()))
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAddress::Inet(addr) => write!(f, "{addr}"),
            HostAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// One cache server and its connection slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    addr: SocketAddr,
    connection: Option<ConnectionId>,
}

impl Host {
    fn new(addr: SocketAddr) -> Self {
        Host {
            addr,
            connection: None,
        }
    }

    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[inline]
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub(crate) fn set_connection(&mut self, conn: ConnectionId) {
        self.connection = Some(conn);
    }

    pub(crate) fn take_connection(&mut self) -> Option<ConnectionId> {
        self.connection.take()
    }
}

/// Sorted, fixed-membership table of hosts.
#[derive(Debug, Clone, Default)]
pub struct HostTable {
    hosts: Vec<Host>,
}

impl HostTable {
    /// Builds the table from caller-supplied addresses.
    ///
    /// # Errors
    /// `UnsupportedAddressFamily` for a non-IP address; `AllocationFailure` if
    /// the table cannot be allocated.
    pub fn new(addresses: impl IntoIterator<Item = HostAddress>) -> ClientResult<Self> {
        let addresses = addresses.into_iter();
        let mut hosts = Vec::new();
        hosts
            .try_reserve_exact(addresses.size_hint().0)
            .map_err(|_| ClientError::AllocationFailure)?;

        for address in addresses {
            match address {
                HostAddress::Inet(addr) => hosts.push(Host::new(addr)),
                other => return Err(ClientError::UnsupportedAddressFamily(other.to_string())),
            }
        }

        hosts.sort_by(|a, b| host_order(&a.addr, &b.addr));
        Ok(HostTable { hosts })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Host> {
        self.hosts.get(index)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Host> {
        self.hosts.get_mut(index)
    }

    #[inline]
    pub fn as_slice(&self) -> &[Host] {
        &self.hosts
    }

    /// Finds the host currently owning `conn`.
    pub fn position_of(&self, conn: ConnectionId) -> Option<usize> {
        self.hosts
            .iter()
            .position(|host| host.connection == Some(conn))
    }

    /// Clears every connection slot, returning the live handles.
    pub(crate) fn take_connections(&mut self) -> Vec<ConnectionId> {
        self.hosts
            .iter_mut()
            .filter_map(Host::take_connection)
            .collect()
    }
}

/// Orders addresses by family (IPv4 first), then address bytes, then port,
/// then IPv6 scope id.
pub fn host_order(a: &SocketAddr, b: &SocketAddr) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

fn sort_key(addr: &SocketAddr) -> (u8, [u8; 16], u16, u32) {
    let mut bytes = [0u8; 16];
    let family = match addr.ip() {
        IpAddr::V4(ip) => {
            bytes[..4].copy_from_slice(&ip.octets());
            4
        }
        IpAddr::V6(ip) => {
            bytes.copy_from_slice(&ip.octets());
            6
        }
    };
    let scope_id = match addr {
        SocketAddr::V4(_) => 0,
        SocketAddr::V6(v6) => v6.scope_id(),
    };
    (family, bytes, addr.port(), scope_id)
}
