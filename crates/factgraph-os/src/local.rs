//! Provider for the machine the process runs on.

use factgraph_core::{CommandOutput, FileHandle, FileInfo, FileSystem, Provider, ProviderError};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Runs commands through `sh -c` and reads the local filesystem.
///
/// An optional root directory re-bases every absolute path, which is how tests point the
/// provider at a fixture tree instead of `/`.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider {
    root: Option<PathBuf>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves file paths below `root` instead of `/`. Commands are unaffected.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }
}

fn map_io(path: &str, err: std::io::Error) -> ProviderError {
    match err.kind() {
        ErrorKind::NotFound => ProviderError::FileNotFound(path.to_string()),
        _ => ProviderError::io(path, &err),
    }
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

impl FileSystem for LocalProvider {
    fn open(&self, path: &str) -> Result<FileHandle, ProviderError> {
        let file = fs::File::open(self.resolve(path)).map_err(|e| map_io(path, e))?;
        Ok(Box::new(file))
    }

    fn stat(&self, path: &str) -> Result<FileInfo, ProviderError> {
        let meta = fs::metadata(self.resolve(path)).map_err(|e| map_io(path, e))?;
        Ok(FileInfo {
            path: path.to_string(),
            size: meta.len(),
            mode: mode_of(&meta),
            is_dir: meta.is_dir(),
        })
    }
}

impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn run_command(&self, command: &str) -> Result<CommandOutput, ProviderError> {
        debug!(command, "running local command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ProviderError::CommandNotFound("sh".to_string()),
                _ => ProviderError::io(command, &e),
            })?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code().unwrap_or(-1),
        })
    }

    fn fs(&self) -> &dyn FileSystem {
        self
    }
}
