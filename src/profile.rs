//! Client Profiles
//!
//! The configuration handed to a client: its own interface (private key,
//! address, DNS, tunnel parameters) plus the server as its only peer.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::WolfGuardConfig;
use crate::error::Result;
use crate::store::{self, PeerRecord};

/// Routes sent through the tunnel by every client
pub const CATCH_ALL_ROUTES: &str = "0.0.0.0/0, ::/0";

/// Server-side public data rendered into every client profile
#[derive(Debug, Clone)]
pub struct ServerProfile {
    pub public_key: String,
    pub dns: String,
    pub endpoint: String,
    pub tunnel_lines: Vec<String>,
}

impl ServerProfile {
    /// `tunnel_lines` come from the server interface file, so clients always
    /// mirror the parameters the server actually runs with.
    pub fn new(config: &WolfGuardConfig, server_public_key: String, tunnel_lines: Vec<String>) -> Self {
        Self {
            public_key: server_public_key,
            dns: config.network.dns.clone(),
            endpoint: config.endpoint(),
            tunnel_lines,
        }
    }
}

/// A rendered client profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientProfile {
    pub username: String,
    pub text: String,
}

impl ClientProfile {
    /// Render the profile for `record`, whose private key is `private_key`
    pub fn render(record: &PeerRecord, private_key: &str, server: &ServerProfile) -> Self {
        let mut lines = vec![
            "[Interface]".to_string(),
            format!("PrivateKey = {}", private_key),
            format!("Address = {}/32", record.address),
            format!("DNS = {}", server.dns),
        ];

        if !server.tunnel_lines.is_empty() {
            lines.push(String::new());
            lines.extend(server.tunnel_lines.iter().cloned());
        }

        lines.extend([
            String::new(),
            "[Peer]".to_string(),
            format!("PublicKey = {}", server.public_key),
            format!("PresharedKey = {}", record.preshared_key),
            format!("Endpoint = {}", server.endpoint),
            format!("AllowedIPs = {}", CATCH_ALL_ROUTES),
        ]);

        let mut text = lines.join("\n");
        text.push('\n');

        Self {
            username: record.username.clone(),
            text,
        }
    }
}

/// Directory of `<username>.conf` client profiles
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Profile file path for a username
    pub fn path_for(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{}.conf", username))
    }

    /// Create the profile directory (owner-only)
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Persist a profile, returning its path. Written owner-only.
    pub fn write(&self, profile: &ClientProfile) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&profile.username);
        store::write_atomic(&path, profile.text.as_bytes())?;
        Ok(path)
    }

    /// Read a profile, `None` when the file does not exist
    pub fn read(&self, username: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(username)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a profile. Best effort: a missing file is not an error and
    /// other failures are only logged. Returns whether a file was removed.
    pub fn remove(&self, username: &str) -> bool {
        let path = self.path_for(username);
        match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to remove profile {:?}: {}", path, e);
                false
            }
        }
    }
}
