//! External command execution
//!
//! All calls to `sfdisk`, `lsblk`, `dd`, `partclone` and friends go through
//! [`CommandRunner`], so device handling can be exercised without spawning processes.

use crate::error::{BackupError, Result};
use crate::system::standard_search_path;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One external command invocation, before executable resolution and sudo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name (resolved by the runner)
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Command changes system state and is skipped in dry-run mode
    pub mutating: bool,
    /// Non-zero exit is reported in the output instead of as an error
    pub allow_failure: bool,
}

impl CommandSpec {
    /// A read-only command; executed even in dry-run mode
    pub fn query<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            mutating: false,
            allow_failure: false,
        }
    }

    /// A command that writes to disk or changes system state
    pub fn action<S: Into<String>>(program: S) -> Self {
        Self {
            mutating: true,
            ..Self::query(program)
        }
    }

    /// Append one argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        let arg = path.as_ref().to_string_lossy().into_owned();
        self.arg(arg)
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Tolerate a non-zero exit status
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal or skipped
    pub code: Option<i32>,
    /// Not executed (dry run)
    pub skipped: bool,
    /// Standard output
    pub stdout: Vec<u8>,
    /// Standard error
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output carrying `stdout`
    pub fn with_stdout<S: Into<Vec<u8>>>(stdout: S) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Output of a command that was not executed
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Whether the command exited with status zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Standard output as UTF-8 text
    pub fn stdout_text(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone())
            .map_err(|e| BackupError::parse(format!("command output is not UTF-8: {}", e)))
    }
}

/// Executes external commands
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run a command to completion and capture its output
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Full path of an executable, as [`Self::run`] would find it
    fn resolve(&self, name: &str) -> Result<PathBuf>;
}

/// Runner backed by real processes
#[derive(Debug, Clone)]
pub struct SystemRunner {
    use_sudo: bool,
    dry_run: bool,
    search_path: Vec<PathBuf>,
}

impl SystemRunner {
    /// Create a runner searching the standard executable locations
    pub fn new(use_sudo: bool, dry_run: bool) -> Self {
        Self {
            use_sudo,
            dry_run,
            search_path: standard_search_path(),
        }
    }

    /// Replace the directories searched for executables
    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        if !search_path.is_empty() {
            self.search_path = search_path;
        }
        self
    }

    /// Whether commands are prefixed with sudo
    pub fn use_sudo(&self) -> bool {
        self.use_sudo
    }


    fn build(&self, spec: &CommandSpec) -> Result<Command> {
        let program = self.resolve(&spec.program)?;
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new(self.resolve("sudo")?);
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.args(&spec.args);
        Ok(cmd)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = self.build(spec)?;
        let cmd_str = if self.use_sudo {
            format!("sudo {}", spec)
        } else {
            spec.to_string()
        };

        if self.dry_run && spec.mutating {
            log::info!("[DRY RUN] Would execute: {}", cmd_str);
            return Ok(CommandOutput::skipped());
        }

        log::debug!("Executing: {}", cmd_str);
        let output = cmd.output()?;
        let result = CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            skipped: false,
        };

        if !result.success() && !spec.allow_failure {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            if stderr.to_lowercase().contains("permission denied") {
                return Err(BackupError::PermissionDenied(cmd_str));
            }
            return Err(BackupError::CommandFailed {
                cmd: cmd_str,
                code: result.code.unwrap_or(-1),
                stderr,
            });
        }

        Ok(result)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let paths = std::env::join_paths(&self.search_path)
            .map_err(|e| BackupError::config(format!("invalid tool search path: {}", e)))?;
        which::which_in(name, Some(paths), "/")
            .map_err(|_| BackupError::ExecutableNotFound(name.to_string()))
    }
}
