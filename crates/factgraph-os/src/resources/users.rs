//! `users`: local accounts from `/etc/passwd`.

use super::file_content;
use factgraph_core::{
    Args, FactError, FieldInfo, FieldType, Resource, ResourceBase, ResourceClass, ResourceHandle,
    Result, Runtime, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAME: &str = "users";

const PASSWD_PATH: &str = "/etc/passwd";

fn fields() -> Vec<FieldInfo> {
    vec![FieldInfo::new("list", FieldType::list(FieldType::map(FieldType::Any))).refs(["file.content"])]
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
    Ok(Arc::new(Users {
        base: ResourceBase::new(NAME, id),
    }))
}

#[derive(Debug)]
pub struct Users {
    base: ResourceBase,
}

impl Resource for Users {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn fields(&self) -> Vec<FieldInfo> {
        fields()
    }

    fn register(&self, runtime: &Runtime, field: &str) -> Result<()> {
        if field != "list" {
            return Err(FactError::unknown_field(NAME, field));
        }
        let passwd = super::file(runtime, PASSWD_PATH)?;
        runtime.watch_and_compute(passwd.as_ref(), "content", self, field)
    }

    fn compute(&self, runtime: &Runtime, field: &str) -> Result<()> {
        if field != "list" {
            return Err(FactError::unknown_field(NAME, field));
        }
        self.base.compute_field(field, || {
            Ok(Value::List(parse_passwd(&file_content(runtime, PASSWD_PATH)?)))
        })
    }
}

/// Parses passwd(5) lines. Malformed lines and NIS `+`/`-` entries are skipped.
pub fn parse_passwd(content: &str) -> Vec<Value> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split(':').collect();
            if cols.len() < 7 || cols[0].starts_with(['+', '-']) {
                return None;
            }
            let uid = cols[2].parse::<i64>().ok()?;
            let gid = cols[3].parse::<i64>().ok()?;

            let mut user = BTreeMap::new();
            user.insert("name".to_string(), Value::from(cols[0]));
            user.insert("uid".to_string(), Value::Int(uid));
            user.insert("gid".to_string(), Value::Int(gid));
            user.insert("home".to_string(), Value::from(cols[5]));
            user.insert("shell".to_string(), Value::from(cols[6]));
            Some(Value::Map(user))
        })
        .collect()
}
