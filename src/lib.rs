//! sfdisk-backup Library
//!
//! Reads disk partition tables through `sfdisk`/`lsblk` and creates compressed
//! partition archives with `partclone`, `tar` and `pxz`.
//!
//! # Architecture
//!
//! The crate is organized into modules:
//! - `config`: Run configuration (TOML-loadable)
//! - `disk`: Block device handle, partition table and lsblk parsing
//! - `archive`: Sequential per-partition archiving
//! - `system`: Privilege checks and the external command runner
//! - `validation`: Pre-flight validation checks
//! - `error`: Error types and handling
//!
//! # Example
//!
//! ```rust,no_run
//! use sfdisk_backup::*;
//!
//! # fn main() -> Result<()> {
//! let device = BlockDevice::open("/dev/sda", true)?;
//! for (index, partition) in device.partitions() {
//!     println!("{}: {} ({})", index, partition.node.display(), partition.size_human());
//! }
//!
//! let report = Archiver::new(&device, ArchiveOptions::new("/srv/backup")).run()?;
//! println!("{} partition(s) archived", report.images.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod archive;
pub mod config;
pub mod disk;
pub mod error;
pub mod system;
pub mod validation;

// Re-export commonly used types
pub use archive::{ArchiveOptions, ArchiveReport, ArchiveStep, Archiver};
pub use config::{Compression, Config};
pub use disk::{BlockDevice, Partition, PartitionTable};
pub use error::{BackupError, ErrorKind, Result};
pub use system::{CommandRunner, SystemRunner};
pub use validation::{ValidationResult, Validator};

/// Open the configured device with a runner honouring sudo, dry-run and tool directories
pub fn open_device(config: &Config) -> Result<BlockDevice> {
    let path = config
        .device
        .clone()
        .ok_or_else(|| BackupError::validation("No device given"))?;
    system::check_privileges(system::is_root(), config.use_sudo)?;

    let runner = SystemRunner::new(config.use_sudo, config.dry_run)
        .with_search_path(config.tool_dirs.clone());
    BlockDevice::with_runner(path, config.use_sudo, Box::new(runner))
}

/// Validate, open the device and archive it
pub fn run_archive(config: &Config, skip_preflight: bool) -> Result<ArchiveReport> {
    if config.dry_run {
        log::warn!("DRY RUN MODE - No changes will be made");
    }

    if skip_preflight {
        config.validate()?;
    } else {
        let result = Validator::new(config.clone()).validate()?;
        for warning in &result.warnings {
            log::warn!("Warning: {}", warning);
        }
        if !result.is_ok() {
            for error in &result.errors {
                log::error!("Error: {}", error);
            }
            return Err(BackupError::validation("Pre-flight checks failed"));
        }
    }

    let device = open_device(config)?;
    let options = ArchiveOptions::from_config(config)?;
    Archiver::new(&device, options).run()
}
