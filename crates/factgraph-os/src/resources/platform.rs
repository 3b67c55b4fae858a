//! `platform`: operating system name, release and architecture, from `uname`.

use super::command_stdout;
use factgraph_core::{
    Args, FactError, FieldInfo, FieldType, Resource, ResourceBase, ResourceClass, ResourceHandle,
    Result, Runtime,
};
use std::sync::Arc;

pub const NAME: &str = "platform";

fn fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("name", FieldType::String).refs(["command.stdout"]),
        FieldInfo::new("release", FieldType::String).refs(["command.stdout"]),
        FieldInfo::new("arch", FieldType::String).refs(["command.stdout"]),
    ]
}

pub fn class() -> ResourceClass {
    fields()
        .into_iter()
        .fold(ResourceClass::new(NAME), ResourceClass::field)
        .factory(new)
}

fn new(_runtime: &Runtime, mut args: Args) -> Result<ResourceHandle> {
    let id = args.take_id()?.unwrap_or_default();
    if let Some(key) = args.keys().next() {
        return Err(FactError::validation(format!(
            "unknown argument '{key}' for resource '{NAME}'"
        )));
    }
    Ok(Arc::new(Platform {
        base: ResourceBase::new(NAME, id),
    }))
}

/// The `uname` invocation backing each field.
fn uname(field: &str) -> Option<&'static str> {
    match field {
        "name" => Some("uname -s"),
        "release" => Some("uname -r"),
        "arch" => Some("uname -m"),
        _ => None,
    }
}

#[derive(Debug)]
pub struct Platform {
    base: ResourceBase,
}

impl Resource for Platform {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn fields(&self) -> Vec<FieldInfo> {
        fields()
    }

    fn register(&self, runtime: &Runtime, field: &str) -> Result<()> {
        let cmd = uname(field).ok_or_else(|| FactError::unknown_field(NAME, field))?;
        let command = super::command(runtime, cmd)?;
        runtime.watch_and_compute(command.as_ref(), "stdout", self, field)
    }

    fn compute(&self, runtime: &Runtime, field: &str) -> Result<()> {
        let cmd = uname(field).ok_or_else(|| FactError::unknown_field(NAME, field))?;
        self.base.compute_field(field, || {
            Ok(command_stdout(runtime, cmd)?.trim().to_string().into())
        })
    }
}
