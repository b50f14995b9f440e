//! Disk archiving: boot header, table dump and one compressed partclone image per partition
//!
//! Partitions are processed one at a time in index order. The first failing step
//! aborts the run.

use crate::config::{Compression, Config};
use crate::disk::{BlockDevice, Partition};
use crate::error::{BackupError, Result};
use crate::system::CommandSpec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the manifest written into the target directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Filesystems with a dedicated `partclone.<fs>` imager
const PARTCLONE_FILESYSTEMS: &[&str] = &[
    "ext2", "ext3", "ext4", "btrfs", "xfs", "ntfs", "exfat", "f2fs", "hfsplus", "jfs",
    "nilfs2", "reiserfs", "minix",
];

/// Step of a per-partition archive run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStep {
    /// partclone imaging
    Image,
    /// chmod of root-owned output
    Permissions,
    /// tar + compressor
    Compress,
    /// removal of the raw image
    Cleanup,
}

impl fmt::Display for ArchiveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "imaging"),
            Self::Permissions => write!(f, "permission fix-up"),
            Self::Compress => write!(f, "compression"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// partclone variant used for a filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imager {
    /// Executable name
    pub program: String,
    /// Arguments placed before the common ones
    pub extra_args: &'static [&'static str],
}

impl Imager {
    /// Pick an imager for a filesystem type; `None` means nothing to image
    pub fn for_fstype(fstype: &str) -> Option<Self> {
        match fstype {
            "swap" => None,
            "vfat" | "fat" | "fat12" | "fat16" | "fat32" | "msdos" => Some(Self {
                program: "partclone.fat".to_string(),
                extra_args: &["-I", "-F"],
            }),
            fs if PARTCLONE_FILESYSTEMS.contains(&fs) => Some(Self {
                program: format!("partclone.{}", fs),
                extra_args: &[],
            }),
            _ => Some(Self {
                program: "partclone.dd".to_string(),
                extra_args: &[],
            }),
        }
    }

    fn command(&self, source: &Path, output: &Path) -> CommandSpec {
        CommandSpec::action(self.program.as_str())
            .args(self.extra_args.iter().copied())
            .args(["-d", "-c", "-s"])
            .path_arg(source)
            .arg("-o")
            .path_arg(output)
    }
}

/// Settings of one archive run
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveOptions {
    /// Output directory
    pub target_dir: PathBuf,
    /// Boot header destination
    pub mbr_path: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Compressor for tar
    pub compression: Compression,
    /// Keep the uncompressed images
    pub keep_raw: bool,
    /// Log filesystem writes instead of performing them
    pub dry_run: bool,
}

impl ArchiveOptions {
    /// Options for a target directory with default naming
    pub fn new<P: Into<PathBuf>>(target_dir: P) -> Self {
        let target_dir = target_dir.into();
        let defaults = Config::default();
        Self {
            mbr_path: target_dir.join(&defaults.mbr_file),
            target_dir,
            prefix: defaults.prefix,
            compression: defaults.compression,
            keep_raw: defaults.keep_raw,
            dry_run: defaults.dry_run,
        }
    }

    /// Options from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let target_dir = config
            .target_dir
            .clone()
            .ok_or_else(|| BackupError::validation("No target directory given"))?;
        let mbr_path = config
            .mbr_path()
            .ok_or_else(|| BackupError::validation("No target directory given"))?;

        Ok(Self {
            target_dir,
            mbr_path,
            prefix: config.prefix.clone(),
            compression: config.compression,
            keep_raw: config.keep_raw,
            dry_run: config.dry_run,
        })
    }

    fn table_dump_path(&self) -> PathBuf {
        self.target_dir.join(format!("{}.sfdisk", self.prefix))
    }

    fn raw_image_path(&self, partition: &Partition) -> PathBuf {
        self.target_dir
            .join(format!("{}-{}.img", self.prefix, partition.device_name()))
    }

    fn archive_path(&self, partition: &Partition) -> PathBuf {
        self.target_dir.join(format!(
            "{}-{}.img.{}",
            self.prefix,
            partition.device_name(),
            self.compression.extension()
        ))
    }
}

/// One imaged partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    /// Partition number
    pub index: u32,
    /// Filesystem reported by lsblk
    pub fstype: String,
    /// partclone variant used
    pub imager: String,
    /// Compressed archive
    pub archive: PathBuf,
    /// Raw image, when kept
    pub raw: Option<PathBuf>,
}

/// What an archive run produced
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    /// Source device
    pub device: PathBuf,
    /// Table type
    pub label: Option<String>,
    /// Disk identifier
    pub disk_id: Option<String>,
    /// Start of the run
    pub created: DateTime<Utc>,
    /// Compressor used
    pub compression: Compression,
    /// Boot header file
    pub mbr: PathBuf,
    /// `sfdisk -d` dump
    pub table_dump: PathBuf,
    /// Imaged partitions by name
    pub images: BTreeMap<String, ImageEntry>,
    /// Partitions left out, with the reason
    pub skipped: BTreeMap<String, String>,
}

/// Sequential archiver over a device's cached partitions
pub struct Archiver<'a> {
    device: &'a BlockDevice,
    options: ArchiveOptions,
}

impl<'a> Archiver<'a> {
    /// Create an archiver for a device
    pub fn new(device: &'a BlockDevice, options: ArchiveOptions) -> Self {
        Self { device, options }
    }

    /// Run options
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Archive the whole device
    pub fn run(&self) -> Result<ArchiveReport> {
        let opts = &self.options;
        log::info!(
            "Archiving {} into {} ({} partition(s), {})",
            self.device.path().display(),
            opts.target_dir.display(),
            self.device.partitions().len(),
            opts.compression
        );

        let mut report = ArchiveReport {
            device: self.device.path().to_path_buf(),
            label: self.device.label().map(str::to_string),
            disk_id: self.device.uuid().map(str::to_string),
            created: Utc::now(),
            compression: opts.compression,
            mbr: opts.mbr_path.clone(),
            table_dump: opts.table_dump_path(),
            images: BTreeMap::new(),
            skipped: BTreeMap::new(),
        };

        if opts.dry_run {
            log::info!("[DRY RUN] Would create {}", opts.target_dir.display());
        } else {
            fs::create_dir_all(&opts.target_dir)?;
        }

        let fs_types = self.device.fs_types()?;
        self.device.unmount_filesystems(&fs_types);

        self.device.dump_mbr(&opts.mbr_path)?;
        self.write_file(&report.table_dump, &self.device.dump_partition_table()?)?;

        for partition in self.device.partitions().values() {
            let name = partition.device_name();
            let Some(fstype) = self.device.fs_type_of(&fs_types, partition) else {
                log::warn!("Skipping {}: no filesystem", name);
                report.skipped.insert(name, "no filesystem".to_string());
                continue;
            };
            let Some(imager) = Imager::for_fstype(fstype) else {
                log::info!("Skipping {}: {} holds no data to image", name, fstype);
                report
                    .skipped
                    .insert(name, format!("{} holds no data", fstype));
                continue;
            };

            let entry = self
                .archive_partition(partition, fstype, &imager)
                .map_err(|(step, source)| BackupError::PartitionFailed {
                    partition: name.clone(),
                    step,
                    source: Box::new(source),
                })?;
            report.images.insert(name, entry);
        }

        let manifest = serde_json::to_string_pretty(&report)?;
        self.write_file(&opts.target_dir.join(MANIFEST_FILE), &manifest)?;

        log::info!(
            "Archived {} partition(s), skipped {}",
            report.images.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn archive_partition(
        &self,
        partition: &Partition,
        fstype: &str,
        imager: &Imager,
    ) -> std::result::Result<ImageEntry, (ArchiveStep, BackupError)> {
        let opts = &self.options;
        let runner = self.device.runner();
        let raw = opts.raw_image_path(partition);
        let archive = opts.archive_path(partition);

        log::info!(
            "Imaging {} ({}) with {}",
            partition.node.display(),
            fstype,
            imager.program
        );
        runner
            .run(&imager.command(&partition.node, &raw))
            .map_err(|e| (ArchiveStep::Image, e))?;

        // Images written through sudo are root-owned; tar and the caller need to read them
        if self.device.use_sudo() {
            runner
                .run(&CommandSpec::action("chmod").arg("644").path_arg(&raw))
                .map_err(|e| (ArchiveStep::Permissions, e))?;
        }

        let tar = self
            .tar_command(&raw, &archive)
            .map_err(|e| (ArchiveStep::Compress, e))?;
        runner.run(&tar).map_err(|e| (ArchiveStep::Compress, e))?;

        if self.device.use_sudo() {
            runner
                .run(&CommandSpec::action("chmod").arg("644").path_arg(&archive))
                .map_err(|e| (ArchiveStep::Permissions, e))?;
        }

        let raw = if opts.keep_raw {
            Some(raw)
        } else {
            if !opts.dry_run {
                fs::remove_file(&raw).map_err(|e| (ArchiveStep::Cleanup, e.into()))?;
            }
            None
        };

        Ok(ImageEntry {
            index: partition.index,
            fstype: fstype.to_string(),
            imager: imager.program.clone(),
            archive,
            raw,
        })
    }

    /// `tar` invocation, with the compressor given by full path
    fn tar_command(&self, raw: &Path, archive: &Path) -> Result<CommandSpec> {
        let mut spec = CommandSpec::action("tar");
        if let Some(program) = self.options.compression.program() {
            let compressor = self.device.runner().resolve(program)?;
            spec = spec.arg("-I").path_arg(compressor);
        }
        let file_name = raw
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(spec
            .arg("-cf")
            .path_arg(archive)
            .arg("-C")
            .path_arg(&self.options.target_dir)
            .arg(file_name))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if self.options.dry_run {
            log::info!("[DRY RUN] Would write {}", path.display());
            return Ok(());
        }
        fs::write(path, contents)?;
        Ok(())
    }
}
