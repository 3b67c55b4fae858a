//! `file(path)`: contents and metadata of one file on the target.

use factgraph_core::{
    Args, FactError, FieldInfo, FieldType, ProviderError, Resource, ResourceBase, ResourceClass,
    ResourceHandle, Result, Runtime, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAME: &str = "file";

fn fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("path", FieldType::String).mandatory(),
        FieldInfo::new("content", FieldType::String),
        FieldInfo::new("exists", FieldType::Bool),
        FieldInfo::new("size", FieldType::Int),
        FieldInfo::new("permissions", FieldType::map(FieldType::Any)),
    ]
}

pub fn class() -> ResourceClass {
    fields()
        .into_iter()
        .fold(ResourceClass::new(NAME), ResourceClass::field)
        .factory(new)
}

fn new(_runtime: &Runtime, mut args: Args) -> Result<ResourceHandle> {
    let path = args.take_str("path")?.unwrap_or_default();
    let id = args.take_id()?.unwrap_or_else(|| path.clone());
    let base = ResourceBase::new(NAME, id);
    if !path.is_empty() {
        base.cache().store_value("path", path.clone().into());
    }
    Ok(Arc::new(FileResource { base, path }))
}

#[derive(Debug)]
pub struct FileResource {
    base: ResourceBase,
    path: String,
}

impl Resource for FileResource {
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
        let fs = runtime.provider().fs();
        match field {
            "path" => Ok(()),
            "content" => self.base.compute_field(field, || {
                Ok(fs.read_to_string(&self.path)?.into())
            }),
            "exists" => self.base.compute_field(field, || match fs.stat(&self.path) {
                Ok(_) => Ok(true.into()),
                Err(ProviderError::FileNotFound(_)) => Ok(false.into()),
                Err(e) => Err(e.into()),
            }),
            "size" => self.base.compute_field(field, || {
                Ok(fs.stat(&self.path)?.size.into())
            }),
            "permissions" => self.base.compute_field(field, || {
                Ok(permissions(fs.stat(&self.path)?.mode))
            }),
            other => Err(FactError::unknown_field(NAME, other)),
        }
    }

    fn validate(&self) -> Result<()> {
        self.base.require(&["path"])
    }
}

/// Unix permission bits as a map: `mode`, `octal` (`"0644"`) and `string` (`"rw-r--r--"`).
pub fn permissions(mode: u32) -> Value {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    let string: String = FLAGS
        .iter()
        .map(|(bit, c)| if mode & bit != 0 { *c } else { '-' })
        .collect();

    let mut map = BTreeMap::new();
    map.insert("mode".to_string(), Value::Int(i64::from(mode & 0o7777)));
    map.insert("octal".to_string(), Value::from(format!("{:04o}", mode & 0o7777)));
    map.insert("string".to_string(), Value::from(string));
    Value::Map(map)
}
