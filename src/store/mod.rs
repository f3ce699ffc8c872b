//! Config Store Module
//!
//! Sole owner of the server interface file. Every read goes through the
//! parser and every write replaces the file atomically (temp file, fsync,
//! rename), so a crash never leaves a half-written config behind.

pub mod model;
pub mod parser;
mod lock;

pub use lock::{lock_path, FileLock};
pub use model::{
    validate_username, InterfaceSection, PeerRecord, ServerInterfaceConfig, PEER_MARKER_PREFIX,
};
pub use parser::PEER_BLOCK_LINES;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File-backed store for the server interface config
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the server interface file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sidecar lock file
    pub fn lock_path(&self) -> PathBuf {
        lock_path(&self.path)
    }

    /// Check that the file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_raw(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::ConfigMissing(self.path.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and parse the file
    pub fn load(&self) -> Result<ServerInterfaceConfig> {
        parser::parse(&self.read_raw()?)
    }

    /// Serialize `config` and atomically replace the file with it
    pub fn save(&self, config: &ServerInterfaceConfig) -> Result<()> {
        write_atomic(&self.path, parser::serialize(config).as_bytes())
    }

    /// Append one peer block. Uniqueness must already have been checked by
    /// the caller; the existing content is not re-parsed.
    pub fn append_peer(&self, record: &PeerRecord) -> Result<()> {
        let mut text = self.read_raw()?;
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&parser::render_peer_block(record));

        write_atomic(&self.path, text.as_bytes())?;
        tracing::debug!("Appended peer block for {} to {:?}", record.username, self.path);
        Ok(())
    }

    /// Remove the peer block for `username` and return the removed record
    pub fn remove_peer(&self, username: &str) -> Result<PeerRecord> {
        let mut config = self.load()?;
        let removed = config
            .remove_peer(username)
            .ok_or_else(|| Error::PeerNotFound(username.to_string()))?;

        self.save(&config)?;
        tracing::debug!("Removed peer block for {} from {:?}", username, self.path);
        Ok(removed)
    }

    /// All peer records in file order. Re-parses the file on every call.
    pub fn list_peers(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.load()?.peers)
    }

    /// Create the file with an interface section and no peers. Fails if the
    /// file already exists.
    pub fn initialize(&self, interface: InterfaceSection) -> Result<()> {
        if self.exists() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", self.path.display()),
            )));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        self.save(&ServerInterfaceConfig::new(interface))
    }
}

/// Temporary sibling used while replacing `path`
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Write `contents` to a temporary sibling, fsync it, then rename it over
/// `path`. Existing permissions are kept; new files are created 0600.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);

    let result = (|| -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;

        if let Ok(meta) = fs::metadata(path) {
            file.set_permissions(meta.permissions())?;
        }

        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)?;

        if let Some(parent) = path.parent() {
            let dir = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            File::open(dir)?.sync_all()?;
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
