//! Partition table rows

use crate::error::{BackupError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Sector size assumed when the tool output does not report one
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// One entry of a device's partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// Partition number (e.g. 2 for /dev/nvme0n1p2)
    pub index: u32,
    /// Partition device node
    pub node: PathBuf,
    /// First sector
    pub start: u64,
    /// Length in sectors
    pub size: u64,
    /// Logical sector size of the disk
    pub sector_size: u64,
    /// MBR type code or GPT type GUID
    pub type_id: String,
    /// Partition UUID (GPT, or synthesized by sfdisk for dos labels)
    pub uuid: Option<String>,
    /// GPT partition name
    pub name: Option<String>,
    /// Bootable flag (dos labels)
    pub bootable: bool,
}

impl Partition {
    /// Start offset in bytes
    pub fn start_bytes(&self) -> u64 {
        self.start * self.sector_size
    }

    /// Size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size * self.sector_size
    }

    /// Get human-readable size
    pub fn size_human(&self) -> String {
        bytesize::ByteSize(self.size_bytes()).to_string_as(true)
    }

    /// File name of the partition node (e.g. sda1, or ata-DISK-part1 for a by-id link)
    pub fn device_name(&self) -> String {
        self.node
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.node.to_string_lossy().into_owned())
    }

    /// Kernel name of the partition, following `/dev/disk/by-*` links
    pub fn kernel_name(&self) -> String {
        kernel_name(&self.node)
    }
}

/// Kernel name of a device node as lsblk reports it
///
/// Symlinks are resolved; a node that cannot be resolved keeps its own file name.
pub fn kernel_name(node: &Path) -> String {
    let resolved = fs::canonicalize(node).unwrap_or_else(|_| node.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| resolved.to_string_lossy().into_owned())
}

/// Extract the partition number from a device node
pub fn partition_index(node: &Path) -> Result<u32> {
    static TRAILING_DIGITS: OnceLock<regex::Regex> = OnceLock::new();
    let re = TRAILING_DIGITS
        .get_or_init(|| regex::Regex::new(r"(\d+)$").expect("static regex is valid"));

    let node_str = node.to_string_lossy();
    re.captures(&node_str)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| {
            BackupError::parse(format!("no partition number in node name '{}'", node_str))
        })
}
