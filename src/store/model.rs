//! Server Interface Config Model
//!
//! In-memory form of the server interface file: one `[Interface]` section
//! followed by an ordered list of marked peer blocks.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Comment line that introduces every managed peer block
pub const PEER_MARKER_PREFIX: &str = "# Peer configuration for ";

/// Section header of the interface section
pub const INTERFACE_HEADER: &str = "[Interface]";

/// Section header of a peer block
pub const PEER_HEADER: &str = "[Peer]";

/// AmneziaWG parameters that must match on both ends of the tunnel
const TUNNEL_PARAMETER_KEYS: [&str; 16] = [
    "Jc", "Jmin", "Jmax", "S1", "S2", "S3", "S4", "H1", "H2", "H3", "H4", "I1", "I2", "I3", "I4",
    "I5",
];

/// Validate a peer username (`^[A-Za-z0-9_]+$`)
pub fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidUsername(username.to_string()))
    }
}

/// Split a `Key = value` line. Values may themselves contain `=` (base64).
pub fn split_setting(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.starts_with('#') || key.starts_with('[') {
        return None;
    }
    Some((key, value.trim()))
}

/// The `[Interface]` section. Lines are kept verbatim so hand edits survive
/// a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceSection {
    lines: Vec<String>,
}

impl InterfaceSection {
    /// Build from the lines following the `[Interface]` header
    pub fn from_lines(lines: Vec<String>) -> Self {
        let mut section = Self { lines };
        while section.lines.last().is_some_and(|l| l.trim().is_empty()) {
            section.lines.pop();
        }
        section
    }

    /// Build a fresh section for a new server
    pub fn new(private_key: &str, address: Ipv4Addr, listen_port: u16, extra: &[String]) -> Self {
        let mut lines = vec![
            format!("PrivateKey = {}", private_key),
            format!("Address = {}/32", address),
            format!("ListenPort = {}", listen_port),
        ];
        if !extra.is_empty() {
            lines.push(String::new());
            lines.extend(extra.iter().cloned());
        }
        Self { lines }
    }

    /// Raw lines (without the header)
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// First value for `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .filter_map(|l| split_setting(l))
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn private_key(&self) -> Option<&str> {
        self.get("PrivateKey")
    }

    pub fn address(&self) -> Option<&str> {
        self.get("Address")
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.get("ListenPort").and_then(|p| p.parse().ok())
    }

    /// Obfuscation parameters clients must mirror (`Jc`, `S1`, `H1` ...), in
    /// file order. Server-only settings such as `PostUp` or `MTU` are skipped.
    pub fn tunnel_parameters(&self) -> Vec<(&str, &str)> {
        self.lines
            .iter()
            .filter_map(|l| split_setting(l))
            .filter(|(k, _)| {
                TUNNEL_PARAMETER_KEYS
                    .iter()
                    .any(|known| k.eq_ignore_ascii_case(known))
            })
            .collect()
    }

    /// [`Self::tunnel_parameters`] rendered as `Key = value` lines
    pub fn tunnel_lines(&self) -> Vec<String> {
        self.tunnel_parameters()
            .into_iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect()
    }
}

/// One provisioned client in the server interface file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub username: String,
    pub public_key: String,
    pub preshared_key: String,
    pub address: Ipv4Addr,
}

impl PeerRecord {
    /// Marker comment line for this peer
    pub fn marker(&self) -> String {
        marker_for(&self.username)
    }
}

/// Marker comment line for a username
pub fn marker_for(username: &str) -> String {
    format!("{}{}", PEER_MARKER_PREFIX, username)
}

/// The whole server interface file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInterfaceConfig {
    /// Comment lines found before `[Interface]`
    pub preamble: Vec<String>,
    pub interface: InterfaceSection,
    pub peers: Vec<PeerRecord>,
}

impl ServerInterfaceConfig {
    pub fn new(interface: InterfaceSection) -> Self {
        Self {
            preamble: Vec::new(),
            interface,
            peers: Vec::new(),
        }
    }

    /// Find a peer by username
    pub fn peer(&self, username: &str) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.username == username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.peer(username).is_some()
    }

    /// Remove a peer by username, returning it
    pub fn remove_peer(&mut self, username: &str) -> Option<PeerRecord> {
        let idx = self.peers.iter().position(|p| p.username == username)?;
        Some(self.peers.remove(idx))
    }

    /// Addresses of all peers, in file order
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.peers.iter().map(|p| p.address)
    }
}
