//! WolfGuard Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for WolfGuard operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfGuard error types
#[derive(Error, Debug)]
pub enum Error {
    // Request errors
    #[error("Invalid username '{0}': only letters, digits and underscores are allowed")]
    InvalidUsername(String),

    #[error("Peer {0} already exists")]
    PeerAlreadyExists(String),

    #[error("Peer {0} does not exist")]
    PeerNotFound(String),

    // Server interface file errors
    #[error("Server interface config not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Server interface config corrupt at line {line}: {reason}")]
    ConfigCorrupt { line: usize, reason: String },

    #[error("No free client address left in {0}")]
    AddressPoolExhausted(String),

    // Collaborator errors
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// The configuration file was changed but the live interface does not
    /// reflect it yet.
    #[error("Interface sync failed after committing changes for {username}: {reason}")]
    InterfaceSyncFailed { username: String, reason: String },

    #[error("This operation requires root privileges")]
    PrivilegeRequired,

    // Service configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if the configuration file was durably changed before this error
    /// happened. Such errors do not mean the peer operation was undone.
    pub fn is_committed(&self) -> bool {
        matches!(self, Error::InterfaceSyncFailed { .. })
    }

    /// Check if this error was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUsername(_) | Error::PeerAlreadyExists(_) | Error::PeerNotFound(_)
        )
    }

    /// Check if this error should stop the process at startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::PrivilegeRequired | Error::ConfigMissing(_))
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUsername(_) => "INVALID_USERNAME",
            Error::PeerAlreadyExists(_) => "PEER_ALREADY_EXISTS",
            Error::PeerNotFound(_) => "PEER_NOT_FOUND",
            Error::ConfigMissing(_) => "CONFIG_MISSING",
            Error::ConfigCorrupt { .. } => "CONFIG_CORRUPT",
            Error::AddressPoolExhausted(_) => "ADDRESS_POOL_EXHAUSTED",
            Error::KeyGenerationFailed(_) => "KEY_GENERATION_FAILED",
            Error::InterfaceSyncFailed { .. } => "INTERFACE_SYNC_FAILED",
            Error::PrivilegeRequired => "PRIVILEGE_REQUIRED",
            Error::Config(_) | Error::ConfigParse(_) => "SERVICE_CONFIG",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
