//! Pre-flight validation checks

use crate::config::Config;
use crate::error::Result;
use crate::system::{check_privileges, is_root, CommandRunner, SystemRunner};

/// Tools every archive run needs
const REQUIRED_TOOLS: &[&str] = &["sfdisk", "lsblk", "dd", "tar"];

/// Validation result
#[derive(Debug)]
pub struct ValidationResult {
    /// No errors were recorded
    pub passed: bool,
    /// Problems that block the run
    pub errors: Vec<String>,
    /// Problems worth reporting
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Create a new validation result
    pub fn new() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn add_error(&mut self, msg: String) {
        self.passed = false;
        self.errors.push(msg);
    }

    /// Add a warning
    pub fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    /// Check if validation passed
    pub fn is_ok(&self) -> bool {
        self.passed
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Archive run validator
pub struct Validator {
    config: Config,
    runner: SystemRunner,
    is_root: bool,
}

impl Validator {
    /// Create a new validator for the current process
    pub fn new(config: Config) -> Self {
        let runner = SystemRunner::new(config.use_sudo, config.dry_run)
            .with_search_path(config.tool_dirs.clone());
        Self {
            config,
            runner,
            is_root: is_root(),
        }
    }

    /// Override the detected privilege level
    pub fn assume_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Run all validation checks
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut result = ValidationResult::new();

        if let Err(e) = check_privileges(self.is_root, self.config.use_sudo) {
            result.add_error(e.to_string());
        }

        if let Err(e) = self.config.validate() {
            result.add_error(format!("Configuration error: {}", e));
        }

        self.check_tools(&mut result);
        self.check_paths(&mut result);

        Ok(result)
    }

    /// Check that the external tools resolve
    fn check_tools(&self, result: &mut ValidationResult) {
        let mut tools: Vec<&str> = REQUIRED_TOOLS.to_vec();
        if let Some(program) = self.config.compression.program() {
            tools.push(program);
        }
        if self.config.use_sudo {
            tools.push("sudo");
            tools.push("chmod");
        }

        for tool in tools {
            if let Err(e) = self.runner.resolve(tool) {
                result.add_error(e.to_string());
            }
        }

        if self.runner.resolve("umount").is_err() {
            result.add_warning(
                "umount not found; mounted partitions will not be released".to_string(),
            );
        }
        if self.runner.resolve("partclone.dd").is_err() {
            result.add_warning(
                "partclone.dd not found; filesystems without a dedicated imager will fail"
                    .to_string(),
            );
        }
    }

    /// Check the device and target directory
    fn check_paths(&self, result: &mut ValidationResult) {
        if let Some(device) = &self.config.device {
            if !device.exists() {
                result.add_error(format!("Block device {} does not exist", device.display()));
            }
        }

        if let Some(target) = &self.config.target_dir {
            if target.exists() && !target.is_dir() {
                result.add_error(format!("Target {} is not a directory", target.display()));
            } else if target
                .read_dir()
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false)
            {
                result.add_warning(format!(
                    "Target directory {} is not empty; files may be overwritten",
                    target.display()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config_in(dir: &std::path::Path) -> Config {
        let device = dir.join("disk.img");
        std::fs::write(&device, b"").unwrap();
        Config {
            device: Some(device),
            target_dir: Some(dir.join("out")),
            tool_dirs: vec![dir.to_path_buf()],
            ..Config::default()
        }
    }

    #[test]
    fn test_result_tracking() {
        let mut result = ValidationResult::new();
        assert!(result.is_ok());
        result.add_warning("warn".to_string());
        assert!(result.is_ok());
        result.add_error("err".to_string());
        assert!(!result.is_ok());
    }

    #[test]
    fn test_missing_tools_reported() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(config_in(dir.path())).assume_root(true);
        let result = validator.validate().unwrap();

        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("sfdisk")));
        assert!(result.errors.iter().any(|e| e.contains("pxz")));
        assert!(result.warnings.iter().any(|w| w.contains("umount")));
    }

    #[test]
    fn test_privileges_reported() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(config_in(dir.path())).assume_root(false);
        let result = validator.validate().unwrap();
        assert!(result.errors.iter().any(|e| e.contains("root")));
    }

    #[cfg(unix)]
    #[test]
    fn test_all_tools_present() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        for tool in ["sfdisk", "lsblk", "dd", "tar", "pxz", "umount", "partclone.dd"] {
            let path = dir.path().join(tool);
            std::fs::write(&path, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let result = Validator::new(config_in(dir.path()))
            .assume_root(true)
            .validate()
            .unwrap();
        assert!(result.is_ok(), "errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_device_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            device: Some(PathBuf::from("/dev/definitely-missing")),
            ..config_in(dir.path())
        };
        let result = Validator::new(config).assume_root(true).validate().unwrap();
        assert!(result.errors.iter().any(|e| e.contains("does not exist")));
    }
}
