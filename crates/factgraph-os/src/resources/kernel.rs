//! `kernel`: running kernel version, sysctl parameters and loaded modules.

use super::{command_stdout, file_content};
use factgraph_core::{
    Args, FactError, FieldInfo, FieldType, Resource, ResourceBase, ResourceClass, ResourceHandle,
    Result, Runtime, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAME: &str = "kernel";

const VERSION_CMD: &str = "uname -r";
const SYSCTL_CMD: &str = "sysctl -a";
const MODULES_PATH: &str = "/proc/modules";

fn fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("version", FieldType::String).refs(["command.stdout"]),
        FieldInfo::new("parameters", FieldType::map(FieldType::String)).refs(["command.stdout"]),
        FieldInfo::new("modules", FieldType::list(FieldType::map(FieldType::Any)))
            .refs(["file.content"]),
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
    Ok(Arc::new(Kernel {
        base: ResourceBase::new(NAME, id),
    }))
}

#[derive(Debug)]
pub struct Kernel {
    base: ResourceBase,
}

impl Resource for Kernel {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn fields(&self) -> Vec<FieldInfo> {
        fields()
    }

    fn register(&self, runtime: &Runtime, field: &str) -> Result<()> {
        match field {
            "version" => {
                let cmd = super::command(runtime, VERSION_CMD)?;
                runtime.watch_and_compute(cmd.as_ref(), "stdout", self, field)
            }
            "parameters" => {
                let cmd = super::command(runtime, SYSCTL_CMD)?;
                runtime.watch_and_compute(cmd.as_ref(), "stdout", self, field)
            }
            "modules" => {
                let file = super::file(runtime, MODULES_PATH)?;
                runtime.watch_and_compute(file.as_ref(), "content", self, field)
            }
            other => Err(FactError::unknown_field(NAME, other)),
        }
    }

    fn compute(&self, runtime: &Runtime, field: &str) -> Result<()> {
        match field {
            "version" => self.base.compute_field(field, || {
                Ok(command_stdout(runtime, VERSION_CMD)?.trim().to_string().into())
            }),
            "parameters" => self.base.compute_field(field, || {
                Ok(parse_sysctl(&command_stdout(runtime, SYSCTL_CMD)?).into())
            }),
            "modules" => self.base.compute_field(field, || {
                Ok(Value::List(parse_modules(&file_content(runtime, MODULES_PATH)?)))
            }),
            other => Err(FactError::unknown_field(NAME, other)),
        }
    }
}

/// Parses `sysctl -a` output. Linux prints `key = value`, the BSDs print `key: value`.
pub fn parse_sysctl(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(" = ").or_else(|| line.split_once(": "))?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parses `/proc/modules` into `{name, size, used}` maps.
pub fn parse_modules(content: &str) -> Vec<Value> {
    content
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let name = cols.next()?;
            let size = cols.next().and_then(|s| s.parse::<i64>().ok()).unwrap_or_default();
            let used = cols.next().and_then(|s| s.parse::<i64>().ok()).unwrap_or_default();
            let mut module = BTreeMap::new();
            module.insert("name".to_string(), Value::from(name));
            module.insert("size".to_string(), Value::Int(size));
            module.insert("used".to_string(), Value::Int(used));
            Some(Value::Map(module))
        })
        .collect()
}
