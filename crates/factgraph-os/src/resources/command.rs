//! `command(command)`: runs a shell command on the target once and exposes its output.

use factgraph_core::{
    Args, CacheEntry, FactError, FieldInfo, FieldType, Resource, ResourceBase, ResourceClass,
    ResourceHandle, Result, Runtime, Value,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub const NAME: &str = "command";

const OUTPUT_FIELDS: [&str; 3] = ["stdout", "stderr", "exitcode"];

fn fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("command", FieldType::String).mandatory(),
        FieldInfo::new("stdout", FieldType::String),
        FieldInfo::new("stderr", FieldType::String),
        FieldInfo::new("exitcode", FieldType::Int),
    ]
}

pub fn class() -> ResourceClass {
    fields()
        .into_iter()
        .fold(ResourceClass::new(NAME), ResourceClass::field)
        .factory(new)
}

fn new(_runtime: &Runtime, mut args: Args) -> Result<ResourceHandle> {
    let command = args.take_str("command")?.unwrap_or_default();
    let id = args.take_id()?.unwrap_or_else(|| command.clone());
    let base = ResourceBase::new(NAME, id);
    if !command.is_empty() {
        base.cache().store_value("command", command.clone().into());
    }
    Ok(Arc::new(CommandResource {
        base,
        command,
        running: Mutex::new(()),
    }))
}

#[derive(Debug)]
pub struct CommandResource {
    base: ResourceBase,
    command: String,
    running: Mutex<()>,
}

impl CommandResource {
    /// Runs the command once and fills every output field from the same execution.
    fn run(&self, runtime: &Runtime) {
        let _guard = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if OUTPUT_FIELDS.iter().all(|f| self.base.cache().is_valid(f)) {
            return;
        }

        let cache = self.base.cache();
        match runtime.provider().run_command(&self.command) {
            Ok(out) => {
                debug!(command = %self.command, exit_status = out.exit_status, "command finished");
                cache.store_value("stdout", out.stdout.into());
                cache.store_value("stderr", out.stderr.into());
                cache.store_value("exitcode", Value::Int(i64::from(out.exit_status)));
            }
            Err(e) => {
                debug!(command = %self.command, error = %e, "command failed to run");
                let err = FactError::from(e);
                for field in OUTPUT_FIELDS {
                    cache.store(field, CacheEntry::failed(err.clone()));
                }
            }
        }
    }
}

impl Resource for CommandResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn fields(&self) -> Vec<FieldInfo> {
        fields()
    }

    fn register(&self, _runtime: &Runtime, _field: &str) -> Result<()> {
        Ok(())
    }

    fn compute(&self, runtime: &Runtime, field: &str) -> Result<()> {
        match field {
            "command" => Ok(()),
            "stdout" | "stderr" | "exitcode" => {
                if !self.base.cache().is_valid(field) {
                    self.run(runtime);
                }
                Ok(())
            }
            other => Err(FactError::unknown_field(NAME, other)),
        }
    }

    fn validate(&self) -> Result<()> {
        self.base.require(&["command"])
    }
}
