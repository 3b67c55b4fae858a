//! # Provider Contract
//!
//! A provider gives resources access to one target host: command execution plus a
//! filesystem capability. The runtime itself never calls these methods; it only hands the
//! provider to resource `compute` implementations, which are the sole place remote I/O
//! happens.
//!
//! Timeouts and cancellation belong here, not in the runtime: a provider call that blocks
//! blocks the triggering thread.

use crate::error::ProviderError;
use std::fmt;
use std::io::Read;

/// Result of running one command on the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Metadata returned by [`FileSystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    /// Unix permission bits (`0o644`).
    pub mode: u32,
    pub is_dir: bool,
}

pub type FileHandle = Box<dyn Read + Send>;

/// Filesystem capability of a target.
pub trait FileSystem: Send + Sync {
    fn open(&self, path: &str) -> Result<FileHandle, ProviderError>;

    fn stat(&self, path: &str) -> Result<FileInfo, ProviderError>;

    /// Reads a whole file as UTF-8 (lossy).
    fn read_to_string(&self, path: &str) -> Result<String, ProviderError> {
        let mut handle = self.open(path)?;
        let mut buf = Vec::new();
        handle
            .read_to_end(&mut buf)
            .map_err(|e| ProviderError::io(path, &e))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Connection to one target host.
pub trait Provider: Send + Sync + fmt::Debug {
    /// Short name used in logs (`local`, `mock`, ...).
    fn name(&self) -> &str;

    fn run_command(&self, command: &str) -> Result<CommandOutput, ProviderError>;

    fn fs(&self) -> &dyn FileSystem;

    fn file(&self, path: &str) -> Result<FileHandle, ProviderError> {
        self.fs().open(path)
    }
}
