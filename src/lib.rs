//! WolfGuard - WireGuard Peer Registry
//!
//! Manages the peers of a WireGuard-family (WireGuard / AmneziaWG) server
//! interface whose configuration file is the single source of truth.
//!
//! # Architecture
//!
//! The peer registry is the only entry point for mutations. Every add or
//! remove runs under a process-wide lock and an advisory file lock, rewrites
//! the interface file atomically and then restarts the interface so the
//! running tunnel matches the file.
//!
//! # Features
//!
//! - Strict parser for the server interface file, preserving the interface section
//! - Sequential /32 address allocation inside a /24 client subnet
//! - Key generation through the `awg`/`wg` tools or in-process X25519
//! - Client profile rendering with optional AmneziaWG obfuscation parameters
//! - Access-key HTTP API and a remote control tool

pub mod allocator;
pub mod api;
pub mod config;
pub mod error;
pub mod interface;
pub mod keys;
pub mod privilege;
pub mod profile;
pub mod registry;
pub mod store;

pub use config::WolfGuardConfig;
pub use error::{Error, Result};
pub use registry::PeerRegistry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::allocator::{AddressAllocator, ClientSubnet};
    pub use crate::config::WolfGuardConfig;
    pub use crate::error::{Error, Result};
    pub use crate::interface::{InterfaceControl, InterfaceReconciler};
    pub use crate::keys::{KeyProvider, KeyTriple};
    pub use crate::profile::ClientProfile;
    pub use crate::registry::{PeerListing, PeerRegistry, ProvisionedPeer};
    pub use crate::store::{ConfigStore, PeerRecord, ServerInterfaceConfig};
}
