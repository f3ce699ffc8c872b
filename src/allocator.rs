//! Client Address Allocation
//!
//! Addresses are handed out by host octet inside a /24 client subnet. The
//! server interface owns `.1`, the first client gets `.2` and every later
//! client gets one past the highest octet currently in use.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Host octet reserved for the server interface
pub const SERVER_HOST: u8 = 1;

/// First host octet issued to a client
pub const FIRST_CLIENT_HOST: u8 = 2;

/// A /24 client subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSubnet {
    prefix: [u8; 3],
}

impl ClientSubnet {
    /// Create a subnet from its network prefix
    pub fn new(a: u8, b: u8, c: u8) -> Self {
        Self { prefix: [a, b, c] }
    }

    /// Address with the given host octet
    pub fn address(&self, host: u8) -> Ipv4Addr {
        let [a, b, c] = self.prefix;
        Ipv4Addr::new(a, b, c, host)
    }

    /// Address of the server interface
    pub fn server_address(&self) -> Ipv4Addr {
        self.address(SERVER_HOST)
    }

    /// Check if an address lies inside this subnet
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        addr.octets()[..3] == self.prefix
    }

    /// Host octet of an address inside this subnet
    pub fn host_octet(&self, addr: Ipv4Addr) -> Option<u8> {
        self.contains(addr).then(|| addr.octets()[3])
    }
}

impl FromStr for ClientSubnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix_len) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("subnet '{}' is missing a prefix length", s)))?;

        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::Config(format!("subnet '{}' is not an IPv4 network", s)))?;

        if prefix_len != "24" {
            return Err(Error::Config(format!(
                "subnet '{}' must be a /24, host octet allocation is per last octet",
                s
            )));
        }

        let [a, b, c, _] = addr.octets();
        Ok(Self::new(a, b, c))
    }
}

impl fmt::Display for ClientSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/24", self.address(0))
    }
}

/// Computes the next client address from the addresses already in use
#[derive(Debug, Clone, Copy)]
pub struct AddressAllocator {
    subnet: ClientSubnet,
}

impl AddressAllocator {
    pub fn new(subnet: ClientSubnet) -> Self {
        Self { subnet }
    }

    pub fn subnet(&self) -> ClientSubnet {
        self.subnet
    }

    /// Next address after the highest host octet in `existing`.
    ///
    /// Freed octets below the maximum are never reused. Never returns an
    /// octet below [`FIRST_CLIENT_HOST`].
    pub fn next_address<I>(&self, existing: I) -> Result<Ipv4Addr>
    where
        I: IntoIterator<Item = u8>,
    {
        let host = match existing.into_iter().max() {
            None => FIRST_CLIENT_HOST,
            Some(highest) => highest
                .checked_add(1)
                .ok_or_else(|| Error::AddressPoolExhausted(self.subnet.to_string()))?
                .max(FIRST_CLIENT_HOST),
        };

        Ok(self.subnet.address(host))
    }

    /// Next address given full peer addresses. Addresses outside the subnet
    /// are ignored.
    pub fn next_after<I>(&self, addresses: I) -> Result<Ipv4Addr>
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let subnet = self.subnet;
        self.next_address(addresses.into_iter().filter_map(|a| subnet.host_octet(a)))
    }
}
