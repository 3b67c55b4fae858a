//! # Mock Fixtures
//!
//! `--mock FILE` replaces the local machine with a JSON description of a host:
//!
//! ```json
//! {
//!   "commands": {
//!     "uname -s": { "stdout": "Linux\n" },
//!     "sysctl -a": { "stderr": "permission denied", "exit_status": 1 }
//!   },
//!   "files": {
//!     "/etc/passwd": { "content": "root:x:0:0:root:/root:/bin/bash\n" },
//!     "/etc/shadow": { "content": "", "mode": 416 }
//!   }
//! }
//! ```
//!
//! Commands that are not listed fail as if the binary did not exist, and missing files are
//! reported as not found.

use anyhow::Context;
use factgraph_core::mock::MockProvider;
use factgraph_core::CommandOutput;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub commands: BTreeMap<String, CommandFixture>,
    #[serde(default)]
    pub files: BTreeMap<String, FileFixture>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandFixture {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_status: i32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileFixture {
    pub content: String,
    #[serde(default = "default_mode")]
    pub mode: u32,
}

fn default_mode() -> u32 {
    0o644
}

impl Fixture {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading mock fixture {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing mock fixture {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn into_provider(self) -> MockProvider {
        let provider = MockProvider::new();
        for (command, out) in self.commands {
            provider
                .expect_command(command)
                .return_output(CommandOutput {
                    stdout: out.stdout,
                    stderr: out.stderr,
                    exit_status: out.exit_status,
                });
        }
        for (path, file) in self.files {
            provider.add_file_with_mode(path, file.content, file.mode);
        }
        provider
    }
}
