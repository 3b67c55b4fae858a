//! # Query Parsing
//!
//! A query names one field of one resource instance:
//!
//! ```text
//! resource[(key=value, ...)].field
//!
//! platform.name
//! sshd.config.params
//! sshd.config(path=/srv/sshd_config).params
//! file(path="/etc/hosts").content
//! ```
//!
//! Resource names may be dotted, so without an argument list the resource is the longest
//! registered prefix and the rest is the field. Argument values may be double-quoted to
//! carry `,` or `)`.

use factgraph_core::{Args, FactError, Registry, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub resource: String,
    pub args: Args,
    pub field: String,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|(k, v)| format!("{k}={}", v.as_str().unwrap_or_default()))
                .collect();
            write!(f, "({})", args.join(", "))?;
        }
        write!(f, ".{}", self.field)
    }
}

impl Query {
    pub fn parse(input: &str, registry: &Registry) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(FactError::validation("empty query"));
        }
        match input.find('(') {
            Some(open) => parse_with_args(input, open),
            None => parse_plain(input, registry),
        }
    }
}

fn parse_plain(input: &str, registry: &Registry) -> Result<Query> {
    let mut split = input.len();
    while let Some(dot) = input[..split].rfind('.') {
        let (resource, field) = (&input[..dot], &input[dot + 1..]);
        if registry.contains(resource) {
            if field.is_empty() || field.contains('.') {
                break;
            }
            return Ok(Query {
                resource: resource.to_string(),
                args: Args::new(),
                field: field.to_string(),
            });
        }
        split = dot;
    }
    Err(FactError::validation(format!(
        "query '{input}' does not name a field of a known resource"
    )))
}

fn parse_with_args(input: &str, open: usize) -> Result<Query> {
    let resource = input[..open].trim();
    let (args, rest) = parse_args(&input[open + 1..])
        .ok_or_else(|| FactError::validation(format!("malformed argument list in '{input}'")))?;
    let field = rest
        .trim()
        .strip_prefix('.')
        .filter(|f| !f.is_empty() && !f.contains('.'))
        .ok_or_else(|| FactError::validation(format!("query '{input}' is missing a field")))?;
    if resource.is_empty() {
        return Err(FactError::validation(format!(
            "query '{input}' is missing a resource"
        )));
    }
    Ok(Query {
        resource: resource.to_string(),
        args,
        field: field.to_string(),
    })
}

/// Parses `key=value, ...)` and returns the arguments plus what follows the `)`.
fn parse_args(input: &str) -> Option<(Args, &str)> {
    let mut args = Args::new();
    let mut current = String::new();
    let mut quoted = false;

    for (i, c) in input.char_indices() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => push_arg(&mut args, &std::mem::take(&mut current))?,
            ')' if !quoted => {
                push_arg(&mut args, &current)?;
                return Some((args, &input[i + 1..]));
            }
            _ => current.push(c),
        }
    }
    None
}

fn push_arg(args: &mut Args, entry: &str) -> Option<()> {
    if entry.trim().is_empty() {
        return Some(());
    }
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    args.insert(key, value);
    Some(())
}
