//! Advisory Config File Lock
//!
//! `flock(2)` on a sidecar `<config>.lock` file so that separate processes
//! (the API daemon and a CLI invocation) never interleave a mutation.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};

use crate::error::Result;

/// Path of the lock file guarding `config_file`
pub fn lock_path(config_file: &Path) -> PathBuf {
    let mut path = config_file.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

/// Held lock, released on drop
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until an exclusive lock is held
    pub fn exclusive(path: &Path) -> Result<Self> {
        Self::acquire(path, FlockArg::LockExclusive)
    }

    /// Block until a shared lock is held
    pub fn shared(path: &Path) -> Result<Self> {
        Self::acquire(path, FlockArg::LockShared)
    }

    fn acquire(path: &Path, arg: FlockArg) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        loop {
            match flock(file.as_raw_fd(), arg) {
                Ok(()) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(std::io::Error::from(e).into()),
            }
        }

        tracing::trace!("Acquired {:?} on {:?}", arg, path);
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            tracing::warn!("Failed to release lock on {:?}: {}", self.path, e);
        }
    }
}
