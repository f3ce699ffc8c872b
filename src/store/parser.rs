//! Server Interface File Parser
//!
//! Parses the line-oriented interface file into [`ServerInterfaceConfig`] and
//! serializes it back. Only the grammar this service writes is modeled: an
//! `[Interface]` section followed by peer blocks of the fixed shape
//!
//! ```text
//!
//! # Peer configuration for <username>
//! [Peer]
//! PublicKey = <key>
//! PresharedKey = <key>
//! AllowedIPs = <ip>/32
//! ```

use std::collections::HashSet;
use std::net::Ipv4Addr;

use super::model::{
    split_setting, validate_username, InterfaceSection, PeerRecord,
    ServerInterfaceConfig, INTERFACE_HEADER, PEER_HEADER, PEER_MARKER_PREFIX,
};
use crate::error::{Error, Result};

/// Number of lines in a serialized peer block, leading blank line included
pub const PEER_BLOCK_LINES: usize = 6;

fn corrupt(line: usize, reason: impl Into<String>) -> Error {
    Error::ConfigCorrupt {
        line,
        reason: reason.into(),
    }
}

fn is_header(line: &str, header: &str) -> bool {
    line.trim().eq_ignore_ascii_case(header)
}

/// Username of a marker line, if the line is one
fn marker_username(line: &str) -> Option<&str> {
    line.trim().strip_prefix(PEER_MARKER_PREFIX).map(str::trim)
}

/// Parse the full interface file
pub fn parse(text: &str) -> Result<ServerInterfaceConfig> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l)).peekable();

    // Everything up to [Interface]
    let mut preamble = Vec::new();
    loop {
        let Some((no, line)) = lines.next() else {
            return Err(corrupt(0, "missing [Interface] section"));
        };
        if is_header(line, INTERFACE_HEADER) {
            break;
        }
        if marker_username(line).is_some() || is_header(line, PEER_HEADER) {
            return Err(corrupt(no, "peer block before [Interface] section"));
        }
        if !line.trim().is_empty() {
            if !line.trim_start().starts_with('#') {
                return Err(corrupt(no, "unexpected content before [Interface] section"));
            }
            preamble.push(line.to_string());
        }
    }

    // Interface body, up to the first marker
    let mut interface_lines = Vec::new();
    while let Some(&(no, line)) = lines.peek() {
        if marker_username(line).is_some() {
            break;
        }
        if is_header(line, INTERFACE_HEADER) {
            return Err(corrupt(no, "duplicate [Interface] section"));
        }
        if is_header(line, PEER_HEADER) {
            return Err(corrupt(no, "[Peer] section without a peer marker comment"));
        }
        interface_lines.push(line.to_string());
        lines.next();
    }

    let mut config = ServerInterfaceConfig {
        preamble,
        interface: InterfaceSection::from_lines(interface_lines),
        peers: Vec::new(),
    };

    let mut usernames = HashSet::new();
    let mut addresses = HashSet::new();

    while let Some((no, line)) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }

        let Some(username) = marker_username(line) else {
            return Err(corrupt(no, format!("unexpected line between peer blocks: '{}'", line.trim())));
        };
        if validate_username(username).is_err() {
            return Err(corrupt(no, format!("invalid peer username '{}'", username)));
        }

        match lines.next() {
            Some((_, header)) if is_header(header, PEER_HEADER) => {}
            Some((no, _)) => return Err(corrupt(no, format!("expected [Peer] after marker for {}", username))),
            None => return Err(corrupt(no, format!("truncated peer block for {}", username))),
        }

        let mut public_key = None;
        let mut preshared_key = None;
        let mut address = None;

        for _ in 0..3 {
            let Some((no, setting)) = lines.next() else {
                return Err(corrupt(no, format!("truncated peer block for {}", username)));
            };
            let (key, value) = split_setting(setting)
                .ok_or_else(|| corrupt(no, format!("expected a key/value line in peer block for {}", username)))?;

            let slot = if key.eq_ignore_ascii_case("PublicKey") {
                &mut public_key
            } else if key.eq_ignore_ascii_case("PresharedKey") {
                &mut preshared_key
            } else if key.eq_ignore_ascii_case("AllowedIPs") {
                address = Some(parse_host_address(value).ok_or_else(|| {
                    corrupt(no, format!("AllowedIPs for {} is not a single /32 address", username))
                })?);
                continue;
            } else {
                return Err(corrupt(no, format!("unexpected key '{}' in peer block for {}", key, username)));
            };

            if slot.replace(value.to_string()).is_some() {
                return Err(corrupt(no, format!("duplicate key '{}' in peer block for {}", key, username)));
            }
        }

        let (Some(public_key), Some(preshared_key), Some(address)) = (public_key, preshared_key, address) else {
            return Err(corrupt(no, format!("incomplete peer block for {}", username)));
        };

        if !usernames.insert(username.to_string()) {
            return Err(corrupt(no, format!("duplicate peer {}", username)));
        }
        if !addresses.insert(address) {
            return Err(corrupt(no, format!("address {} assigned twice", address)));
        }

        config.peers.push(PeerRecord {
            username: username.to_string(),
            public_key,
            preshared_key,
            address,
        });
    }

    Ok(config)
}

/// Parse `a.b.c.d/32`
fn parse_host_address(value: &str) -> Option<Ipv4Addr> {
    let (addr, prefix) = value.trim().split_once('/')?;
    if prefix.trim() != "32" {
        return None;
    }
    addr.trim().parse().ok()
}

/// Render one peer block, leading blank line included
pub fn render_peer_block(peer: &PeerRecord) -> String {
    format!(
        "\n{}\n{}\nPublicKey = {}\nPresharedKey = {}\nAllowedIPs = {}/32\n",
        peer.marker(),
        PEER_HEADER,
        peer.public_key,
        peer.preshared_key,
        peer.address
    )
}

/// Serialize the full interface file
pub fn serialize(config: &ServerInterfaceConfig) -> String {
    let mut out = String::new();
    for line in &config.preamble {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(INTERFACE_HEADER);
    out.push('\n');
    for line in config.interface.lines() {
        out.push_str(line);
        out.push('\n');
    }
    for peer in &config.peers {
        out.push_str(&render_peer_block(peer));
    }
    out
}
