//! Configuration types and management
//!
//! Defines the archive run settings: source device, output location and naming,
//! compression, and tool lookup. Loadable from a TOML file.

use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Compressor handed to `tar -I`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Parallel xz
    #[default]
    Pxz,
    /// Single-threaded xz
    Xz,
    /// Zstandard
    Zstd,
    /// gzip
    Gzip,
    /// Plain tar
    None,
}

impl Compression {
    /// Program passed to tar, if any
    pub fn program(&self) -> Option<&'static str> {
        match self {
            Self::Pxz => Some("pxz"),
            Self::Xz => Some("xz"),
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    /// Archive file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pxz | Self::Xz => "tar.xz",
            Self::Zstd => "tar.zst",
            Self::Gzip => "tar.gz",
            Self::None => "tar",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pxz => write!(f, "pxz"),
            Self::Xz => write!(f, "xz"),
            Self::Zstd => write!(f, "zstd"),
            Self::Gzip => write!(f, "gzip"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Archive run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Device to back up
    pub device: Option<PathBuf>,

    /// Run external tools through sudo
    pub use_sudo: bool,

    /// Directory receiving the archive
    pub target_dir: Option<PathBuf>,

    /// Boot header file name (relative names land in the target directory)
    pub mbr_file: PathBuf,

    /// Name prefix of every produced file
    pub prefix: String,

    /// Compression algorithm
    pub compression: Compression,

    /// Keep uncompressed partclone images next to the archives
    pub keep_raw: bool,

    /// Dry run mode (don't actually make changes)
    pub dry_run: bool,

    /// Directories searched for external tools (standard locations when empty)
    pub tool_dirs: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            use_sudo: false,
            target_dir: None,
            mbr_file: PathBuf::from("mbr.bin"),
            prefix: "backup".to_string(),
            compression: Compression::default(),
            keep_raw: false,
            dry_run: false,
            tool_dirs: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            BackupError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BackupError::config(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.is_none() {
            return Err(BackupError::validation("No device given"));
        }
        if self.target_dir.is_none() {
            return Err(BackupError::validation("No target directory given"));
        }

        if self.prefix.is_empty() {
            return Err(BackupError::validation("Prefix cannot be empty"));
        }
        if !self
            .prefix
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(BackupError::validation(
                "Prefix must contain only alphanumeric characters, underscores, hyphens, and dots",
            ));
        }

        if self.mbr_file.file_name().is_none() {
            return Err(BackupError::validation(format!(
                "MBR file name is not a file: {}",
                self.mbr_file.display()
            )));
        }

        Ok(())
    }

    /// Boot header destination, resolved against the target directory
    pub fn mbr_path(&self) -> Option<PathBuf> {
        self.target_dir.as_ref().map(|dir| dir.join(&self.mbr_file))
    }
}
