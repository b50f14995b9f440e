//! System utilities: privileges and external command execution

pub mod command;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};

use crate::error::{BackupError, Result};
use std::path::PathBuf;

/// Directories searched for external tools, in order
pub const STANDARD_EXECUTABLE_PATHS: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr/local/bin",
    "/usr/local/sbin",
    "/usr/bin",
    "/usr/sbin",
];

/// Standard tool search directories as paths
pub fn standard_search_path() -> Vec<PathBuf> {
    STANDARD_EXECUTABLE_PATHS.iter().map(PathBuf::from).collect()
}

/// Check if running as root
pub fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

/// Ensure the process may touch block devices: either root, or sudo was requested
pub fn check_privileges(is_root: bool, use_sudo: bool) -> Result<()> {
    if !is_root && !use_sudo {
        return Err(BackupError::NotRunningAsRoot);
    }
    Ok(())
}
