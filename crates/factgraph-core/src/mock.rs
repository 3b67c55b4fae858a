//! # Mock Provider & Testing Guide
//!
//! `MockProvider` implements the same [`Provider`] contract as a real connection but serves
//! everything from memory. It lets you script command results and file contents, then check
//! how often the runtime actually reached the target.
//!
//! ## When to use the Mock vs a real provider
//!
//! | Feature | MockProvider | Local provider |
//! |---------|--------------|----------------|
//! | **Speed** | Instant (in-memory) | Spawns processes, reads disk |
//! | **Determinism** | 100% deterministic | Depends on the host |
//! | **Call counting** | `command_calls` | None |
//! | **Error injection** | Easy (`return_err`, `return_status`) | Hard |
//!
//! ## Example
//!
//! ```rust
//! use factgraph_core::mock::MockProvider;
//! use factgraph_core::{FileSystem, Provider};
//!
//! let mock = MockProvider::new();
//! mock.expect_command("uname -s").return_ok("Linux\n");
//! mock.add_file("/etc/hostname", "web-01\n");
//!
//! assert_eq!(mock.run_command("uname -s").unwrap().stdout, "Linux\n");
//! assert_eq!(mock.fs().read_to_string("/etc/hostname").unwrap(), "web-01\n");
//! assert_eq!(mock.command_calls("uname -s"), 1);
//! mock.verify(); // every scripted command was used
//! ```
//!
//! Scripted commands answer every call with the same response, which matches how the
//! runtime computes each field at most once. An unscripted command fails with
//! [`ProviderError::CommandNotFound`].

use crate::error::ProviderError;
use crate::provider::{CommandOutput, FileHandle, FileInfo, FileSystem, Provider};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, PoisonError};

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

struct CommandExpectation {
    response: Result<CommandOutput, ProviderError>,
    calls: usize,
}

#[derive(Clone)]
struct MockFile {
    content: Vec<u8>,
    mode: u32,
    is_dir: bool,
}

/// An in-memory provider with expectation tracking for fluent testing.
#[derive(Default)]
pub struct MockProvider {
    commands: Mutex<BTreeMap<String, CommandExpectation>>,
    unexpected: Mutex<Vec<String>>,
    files: Mutex<BTreeMap<String, MockFile>>,
}

impl MockProvider {
    /// Creates a new mock provider with no expectations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects `command` to be run.
    pub fn expect_command(&self, command: impl Into<String>) -> CommandExpectationBuilder<'_> {
        CommandExpectationBuilder {
            command: command.into(),
            provider: self,
        }
    }

    /// Adds a regular file with mode `0o644`.
    pub fn add_file(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.add_file_with_mode(path, content, 0o644);
    }

    pub fn add_file_with_mode(&self, path: impl Into<String>, content: impl Into<Vec<u8>>, mode: u32) {
        lock(&self.files).insert(
            path.into(),
            MockFile {
                content: content.into(),
                mode,
                is_dir: false,
            },
        );
    }

    pub fn add_dir(&self, path: impl Into<String>) {
        lock(&self.files).insert(
            path.into(),
            MockFile {
                content: Vec::new(),
                mode: 0o755,
                is_dir: true,
            },
        );
    }

    /// How many times `command` was run.
    pub fn command_calls(&self, command: &str) -> usize {
        lock(&self.commands).get(command).map_or(0, |e| e.calls)
    }

    /// Total number of command executions, scripted or not.
    pub fn total_command_calls(&self) -> usize {
        let scripted: usize = lock(&self.commands).values().map(|e| e.calls).sum();
        scripted + lock(&self.unexpected).len()
    }

    /// Commands that were run without being scripted.
    pub fn unexpected_commands(&self) -> Vec<String> {
        lock(&self.unexpected).clone()
    }

    /// Verifies that every scripted command was run at least once.
    pub fn verify(&self) {
        let unused: Vec<String> = lock(&self.commands)
            .iter()
            .filter(|(_, e)| e.calls == 0)
            .map(|(cmd, _)| cmd.clone())
            .collect();
        if !unused.is_empty() {
            panic!("Not all expectations were met. Unused commands: {unused:?}");
        }
    }

    fn script(&self, command: String, response: Result<CommandOutput, ProviderError>) {
        lock(&self.commands).insert(command, CommandExpectation { response, calls: 0 });
    }

    fn load_file(&self, path: &str) -> Result<MockFile, ProviderError> {
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::FileNotFound(path.to_string()))
    }
}

/// Builder for command expectations.
pub struct CommandExpectationBuilder<'a> {
    command: String,
    provider: &'a MockProvider,
}

impl CommandExpectationBuilder<'_> {
    /// The command succeeds with `stdout`.
    pub fn return_ok(self, stdout: impl Into<String>) {
        self.return_output(CommandOutput::success(stdout));
    }

    /// The command exits with `exit_status` and writes `stderr`.
    pub fn return_status(self, exit_status: i32, stderr: impl Into<String>) {
        self.return_output(CommandOutput {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_status,
        });
    }

    pub fn return_output(self, output: CommandOutput) {
        self.provider.script(self.command, Ok(output));
    }

    /// The provider fails to run the command at all.
    pub fn return_err(self, error: ProviderError) {
        self.provider.script(self.command, Err(error));
    }
}

impl FileSystem for MockProvider {
    fn open(&self, path: &str) -> Result<FileHandle, ProviderError> {
        let file = self.load_file(path)?;
        if file.is_dir {
            return Err(ProviderError::Io {
                path: path.to_string(),
                message: "is a directory".to_string(),
            });
        }
        Ok(Box::new(Cursor::new(file.content)))
    }

    fn stat(&self, path: &str) -> Result<FileInfo, ProviderError> {
        let file = self.load_file(path)?;
        Ok(FileInfo {
            path: path.to_string(),
            size: file.content.len() as u64,
            mode: file.mode,
            is_dir: file.is_dir,
        })
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn run_command(&self, command: &str) -> Result<CommandOutput, ProviderError> {
        let scripted = lock(&self.commands).get_mut(command).map(|expectation| {
            expectation.calls += 1;
            expectation.response.clone()
        });
        scripted.unwrap_or_else(|| {
            lock(&self.unexpected).push(command.to_string());
            Err(ProviderError::CommandNotFound(command.to_string()))
        })
    }

    fn fs(&self) -> &dyn FileSystem {
        self
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("commands", &lock(&self.commands).keys().collect::<Vec<_>>())
            .field("files", &lock(&self.files).keys().collect::<Vec<_>>())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
