//! `sshd.config(path)`: the OpenSSH daemon configuration.
//!
//! Registering the dotted name also materialises the static `sshd` class with a `config`
//! field that references this resource.
//!
//! Fields form a chain inside one resource: `file(path).content` feeds `content`, and
//! `content` feeds `params`. Each link is computed once and then served from the cache.

use super::file_content;
use factgraph_core::{
    Args, FactError, FieldInfo, FieldType, Resource, ResourceBase, ResourceClass, ResourceHandle,
    ResourceRef, Result, Runtime,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAME: &str = "sshd.config";

pub const DEFAULT_PATH: &str = "/etc/ssh/sshd_config";

/// Keywords that may appear more than once; their values are joined with `,`.
const MULTI_PARAMS: [&str; 8] = [
    "AcceptEnv",
    "AllowGroups",
    "AllowUsers",
    "DenyGroups",
    "DenyUsers",
    "HostKey",
    "ListenAddress",
    "Port",
];

/// Canonical spelling of common keywords. sshd matches keywords case-insensitively.
const KEYWORDS: [&str; 40] = [
    "AcceptEnv",
    "AddressFamily",
    "AllowAgentForwarding",
    "AllowGroups",
    "AllowTcpForwarding",
    "AllowUsers",
    "AuthorizedKeysFile",
    "Banner",
    "ChallengeResponseAuthentication",
    "Ciphers",
    "ClientAliveCountMax",
    "ClientAliveInterval",
    "Compression",
    "DenyGroups",
    "DenyUsers",
    "GatewayPorts",
    "HostKey",
    "HostbasedAuthentication",
    "IgnoreRhosts",
    "Include",
    "KbdInteractiveAuthentication",
    "KexAlgorithms",
    "ListenAddress",
    "LogLevel",
    "LoginGraceTime",
    "MACs",
    "Match",
    "MaxAuthTries",
    "MaxSessions",
    "PasswordAuthentication",
    "PermitEmptyPasswords",
    "PermitRootLogin",
    "PermitUserEnvironment",
    "Port",
    "PrintMotd",
    "Protocol",
    "PubkeyAuthentication",
    "Subsystem",
    "UsePAM",
    "X11Forwarding",
];

fn fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("path", FieldType::String),
        FieldInfo::new("file", FieldType::resource("file")),
        FieldInfo::new("content", FieldType::String).refs(["file.content"]),
        FieldInfo::new("params", FieldType::map(FieldType::String)).refs(["sshd.config.content"]),
    ]
}

pub fn class() -> ResourceClass {
    fields()
        .into_iter()
        .fold(ResourceClass::new(NAME), ResourceClass::field)
        .factory(new)
}

fn new(_runtime: &Runtime, mut args: Args) -> Result<ResourceHandle> {
    let path = args
        .take_str("path")?
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PATH.to_string());
    let id = args.take_id()?.unwrap_or_else(|| path.clone());
    if let Some(key) = args.keys().next() {
        return Err(FactError::validation(format!(
            "unknown argument '{key}' for resource '{NAME}'"
        )));
    }

    let base = ResourceBase::new(NAME, id);
    base.cache().store_value("path", path.clone().into());
    base.cache()
        .store_value("file", ResourceRef::new(super::file::NAME, path.clone()).into());
    Ok(Arc::new(SshdConfig { base, path }))
}

#[derive(Debug)]
pub struct SshdConfig {
    base: ResourceBase,
    path: String,
}

impl Resource for SshdConfig {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn fields(&self) -> Vec<FieldInfo> {
        fields()
    }

    fn register(&self, runtime: &Runtime, field: &str) -> Result<()> {
        match field {
            "path" | "file" => Ok(()),
            "content" => {
                let file = super::file(runtime, &self.path)?;
                runtime.watch_and_compute(file.as_ref(), "content", self, field)
            }
            "params" => runtime.watch_and_compute(self, "content", self, field),
            other => Err(FactError::unknown_field(NAME, other)),
        }
    }

    fn compute(&self, runtime: &Runtime, field: &str) -> Result<()> {
        match field {
            "path" | "file" => Ok(()),
            "content" => self.base.compute_field(field, || {
                Ok(file_content(runtime, &self.path)?.into())
            }),
            "params" => self.base.compute_field(field, || {
                let content = self.base.value("content")?;
                Ok(parse_params(content.expect_str("sshd.config.content")?).into())
            }),
            other => Err(FactError::unknown_field(NAME, other)),
        }
    }
}

/// Parses an sshd configuration into keyword/value pairs.
///
/// The first occurrence of a keyword wins, except for [`MULTI_PARAMS`] whose values are
/// collected in order. `Match` blocks are flattened: their conditions are kept under the
/// `Match` key and the settings inside them are read like top-level ones.
pub fn parse_params(content: &str) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = split_directive(line) else {
            continue;
        };
        let key = canonical_keyword(key);
        let multi = key == "Match" || MULTI_PARAMS.contains(&key.as_str());

        match params.get_mut(&key) {
            Some(existing) if multi => {
                existing.push(',');
                existing.push_str(value);
            }
            Some(_) => {}
            None => {
                params.insert(key, value.to_string());
            }
        }
    }
    params
}

/// Splits `Keyword value`, `Keyword=value` and `Keyword = value`.
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (key, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    let value = rest
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(rest);
    Some((key, value))
}

fn canonical_keyword(key: &str) -> String {
    KEYWORDS
        .iter()
        .find(|k| k.eq_ignore_ascii_case(key))
        .map_or_else(|| key.to_string(), |k| (*k).to_string())
}
