//! Resource classes of the OS pack.
//!
//! Every module exposes a `NAME` and a `class()` that builds its [`ResourceClass`] with a
//! factory. Derived resources never talk to the provider themselves: they read `command`
//! and `file` instances, so command output and file contents are fetched once per runtime
//! and shared by every consumer.

pub mod command;
pub mod file;
pub mod kernel;
pub mod platform;
pub mod sshd;
pub mod users;

use factgraph_core::{Args, ProviderError, Registry, ResourceClass, ResourceHandle, Result, Runtime};

/// Every class of the pack.
pub fn classes() -> Vec<ResourceClass> {
    vec![
        command::class(),
        file::class(),
        platform::class(),
        kernel::class(),
        sshd::class(),
        users::class(),
    ]
}

pub fn register_all(registry: &Registry) -> Result<()> {
    for class in classes() {
        registry.add(class)?;
    }
    Ok(())
}

pub(crate) fn command(runtime: &Runtime, cmd: &str) -> Result<ResourceHandle> {
    runtime.create_resource(command::NAME, Args::new().with("command", cmd))
}

pub(crate) fn file(runtime: &Runtime, path: &str) -> Result<ResourceHandle> {
    runtime.create_resource(file::NAME, Args::new().with("path", path))
}

/// Stdout of `cmd`; a non-zero exit status is an error carrying stderr.
pub(crate) fn command_stdout(runtime: &Runtime, cmd: &str) -> Result<String> {
    let command = command(runtime, cmd)?;
    let stdout = command.field("stdout")?;
    let status = command.field("exitcode")?.as_int().unwrap_or_default();
    if status != 0 {
        let stderr = command.field("stderr")?;
        return Err(ProviderError::Io {
            path: cmd.to_string(),
            message: format!(
                "exit status {status}: {}",
                stderr.as_str().unwrap_or_default().trim()
            ),
        }
        .into());
    }
    Ok(stdout.expect_str("command.stdout")?.to_string())
}

pub(crate) fn file_content(runtime: &Runtime, path: &str) -> Result<String> {
    let file = file(runtime, path)?;
    Ok(file.field("content")?.expect_str("file.content")?.to_string())
}
