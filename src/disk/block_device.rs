//! Block device representation
//!
//! A disk (or disk image) whose partition table is read through `sfdisk` and cached.

use crate::disk::lsblk::parse_fs_types;
use crate::disk::partition::{self, Partition};
use crate::disk::sfdisk::PartitionTable;
use crate::error::{BackupError, Result};
use crate::system::{self, CommandRunner, CommandSpec, SystemRunner};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Represents a block device and its last-read partition table
pub struct BlockDevice {
    /// Device path (e.g., /dev/sda)
    path: PathBuf,
    /// Prefix external commands with sudo
    use_sudo: bool,
    /// Cached partition table
    table: PartitionTable,
    /// Executes sfdisk, lsblk, dd, ...
    runner: Box<dyn CommandRunner>,
}

impl fmt::Debug for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDevice")
            .field("path", &self.path)
            .field("use_sudo", &self.use_sudo)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl BlockDevice {
    /// Open a device using the system runner
    ///
    /// Fails unless running as root or `use_sudo` is set.
    pub fn open<P: Into<PathBuf>>(path: P, use_sudo: bool) -> Result<Self> {
        system::check_privileges(system::is_root(), use_sudo)?;
        Self::with_runner(path, use_sudo, Box::new(SystemRunner::new(use_sudo, false)))
    }

    /// Open a device with a caller-supplied runner; reads the partition table
    pub fn with_runner<P: Into<PathBuf>>(
        path: P,
        use_sudo: bool,
        runner: Box<dyn CommandRunner>,
    ) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(BackupError::DeviceNotFound(path));
        }

        let mut device = Self {
            path,
            use_sudo,
            table: PartitionTable::default(),
            runner,
        };
        device.read_partition_table()?;
        Ok(device)
    }

    /// Re-read the partition table, replacing the cached one
    ///
    /// The cache is left untouched when the read fails.
    pub fn read_partition_table(&mut self) -> Result<()> {
        let output = self
            .runner
            .run(&CommandSpec::query("sfdisk").arg("--json").path_arg(&self.path))?;
        let table = PartitionTable::from_json(&output.stdout_text()?)?;

        log::debug!(
            "Read {} partition(s) from {} (label: {})",
            table.partitions.len(),
            self.path.display(),
            table.label.as_deref().unwrap_or("none")
        );
        self.table = table;
        Ok(())
    }

    /// Device path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kernel name (e.g. sda for /dev/sda or a /dev/disk/by-id link to it)
    pub fn name(&self) -> String {
        partition::kernel_name(&self.path)
    }

    /// Whether external commands run through sudo
    pub fn use_sudo(&self) -> bool {
        self.use_sudo
    }

    /// Partition table type (`dos`, `gpt`)
    pub fn label(&self) -> Option<&str> {
        self.table.label.as_deref()
    }

    /// Disk identifier
    pub fn uuid(&self) -> Option<&str> {
        self.table.id.as_deref()
    }

    /// Logical sector size
    pub fn sector_size(&self) -> u64 {
        self.table.sector_size
    }

    /// The cached table
    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    /// Return the partitions, ordered by index
    pub fn partitions(&self) -> &BTreeMap<u32, Partition> {
        &self.table.partitions
    }

    /// Look up one partition by index
    pub fn partition(&self, index: u32) -> Option<&Partition> {
        self.table.partitions.get(&index)
    }

    /// Runner used for this device's commands
    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Dump partition table to string (`sfdisk -d`)
    pub fn dump_partition_table(&self) -> Result<String> {
        self.runner
            .run(&CommandSpec::query("sfdisk").arg("-d").path_arg(&self.path))?
            .stdout_text()
    }

    /// Copy the boot header (MBR, plus GPT header and entries) to a file
    pub fn dump_mbr(&self, destination: &Path) -> Result<()> {
        let sectors = self.table.boot_header_sectors();
        log::info!(
            "Saving {} header sector(s) of {} to {}",
            sectors,
            self.path.display(),
            destination.display()
        );

        self.runner.run(
            &CommandSpec::action("dd")
                .arg(format!("if={}", self.path.display()))
                .arg(format!("of={}", destination.display()))
                .arg(format!("bs={}", self.table.sector_size))
                .arg(format!("count={}", sectors)),
        )?;
        Ok(())
    }

    /// Get partition filesystem types via lsblk, keyed by kernel name
    pub fn fs_types(&self) -> Result<BTreeMap<String, String>> {
        let output = self.runner.run(
            &CommandSpec::query("lsblk")
                .args(["-o", "NAME,TYPE,FSTYPE", "-b", "-J"])
                .path_arg(&self.path),
        )?;
        parse_fs_types(&output.stdout_text()?, &self.name())
    }

    /// Filesystem of a partition, looked up in a map returned by [`Self::fs_types`]
    pub fn fs_type_of<'m>(
        &self,
        fs_types: &'m BTreeMap<String, String>,
        partition: &Partition,
    ) -> Option<&'m str> {
        fs_types
            .get(&partition.kernel_name())
            .or_else(|| fs_types.get(&partition.device_name()))
            .map(String::as_str)
    }

    /// Unmount every partition carrying a filesystem
    ///
    /// Failures are ignored: partitions that are not mounted make umount fail.
    pub fn unmount_partitions(&self) -> Result<()> {
        let fs_types = self.fs_types()?;
        self.unmount_filesystems(&fs_types);
        Ok(())
    }

    /// Unmount the partitions named in `fs_types` (as returned by [`Self::fs_types`])
    ///
    /// Returns how many partitions were actually unmounted.
    pub fn unmount_filesystems(&self, fs_types: &BTreeMap<String, String>) -> usize {
        let mut unmounted = 0;
        for partition in self.partitions().values() {
            if self.fs_type_of(fs_types, partition).is_none() {
                continue;
            }
            let spec = CommandSpec::action("umount")
                .path_arg(&partition.node)
                .allow_failure();
            match self.runner.run(&spec) {
                Ok(output) if output.skipped => {}
                Ok(output) if output.success() => {
                    log::info!("Unmounted {}", partition.node.display());
                    unmounted += 1;
                }
                Ok(_) => log::debug!("{} was not mounted", partition.node.display()),
                Err(e) => log::debug!("umount {} failed: {}", partition.node.display(), e),
            }
        }
        unmounted
    }
}
