//! Error types for sfdisk-backup
//!
//! Every failure is surfaced to the caller; nothing is retried.

use crate::archive::ArchiveStep;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;

/// Main error type
#[derive(Error, Debug)]
pub enum BackupError {
    /// Block device path does not exist
    #[error("Block device {0} does not exist")]
    DeviceNotFound(PathBuf),

    /// Neither root nor sudo
    #[error("Must be running as root or specify to use sudo")]
    NotRunningAsRoot,

    /// External tool was refused access to the device
    #[error("Permission denied while running '{0}'")]
    PermissionDenied(String),

    /// Required executable is not installed
    #[error("Executable '{0}' not found in the standard locations")]
    ExecutableNotFound(String),

    /// Command execution failed
    #[error("Command '{cmd}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        /// Command line as run
        cmd: String,
        /// Exit status (-1 when killed by a signal)
        code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// An archive run stopped at one partition
    #[error("Archiving partition {partition} failed during {step}: {source}")]
    PartitionFailed {
        /// Partition name
        partition: String,
        /// Step that failed
        step: ArchiveStep,
        /// Underlying failure
        #[source]
        source: Box<BackupError>,
    },

    /// Pre-flight validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unexpected tool output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing dependency in the environment
    Environment,
    /// Root or sudo required, or the device refused access
    Authorization,
    /// An external call or filesystem write failed
    Operation,
    /// Bad arguments, configuration or tool output
    Input,
}

impl BackupError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::ParseError(msg.into())
    }

    /// Classify the error; partition failures report their cause
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ExecutableNotFound(_) => ErrorKind::Environment,
            Self::NotRunningAsRoot | Self::PermissionDenied(_) => ErrorKind::Authorization,
            Self::PartitionFailed { source, .. } => source.kind(),
            Self::CommandFailed { .. } | Self::Io(_) => ErrorKind::Operation,
            Self::DeviceNotFound(_)
            | Self::ValidationError(_)
            | Self::ConfigError(_)
            | Self::ParseError(_)
            | Self::Json(_) => ErrorKind::Input,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Operation => 1,
            ErrorKind::Input => 2,
            ErrorKind::Environment => 3,
            ErrorKind::Authorization => 4,
        }
    }
}
