//! Root Privilege Gate

use crate::error::{Error, Result};

/// Fail with [`Error::PrivilegeRequired`] unless running as root
pub fn require_root() -> Result<()> {
    if nix::unistd::Uid::effective().is_root() {
        Ok(())
    } else {
        Err(Error::PrivilegeRequired)
    }
}

/// Tell the user how to rerun the current command as root
pub fn print_sudo_hint() {
    eprintln!("  This command needs root access (to manage the tunnel interface).");
    eprintln!(
        "  Run with: sudo {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
}
