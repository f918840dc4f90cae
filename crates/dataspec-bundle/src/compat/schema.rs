//! Breaking-change classification between two revisions of one spec
//!
//! The classification is shallow on purpose and stays that way: it compares
//! the declared major version, dotted key paths of the schema tree and the
//! declared data format. It never reasons about whether two field types are
//! compatible.

use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakingKind {
    MajorVersionChange,
    FieldRemoval,
    FormatChange,
}

impl BreakingKind {
    pub fn severity(&self) -> Severity {
        match self {
            BreakingKind::FieldRemoval => Severity::Critical,
            BreakingKind::MajorVersionChange | BreakingKind::FormatChange => Severity::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    #[serde(rename = "type")]
    pub kind: BreakingKind,
    pub channel: String,
    pub file: String,
    pub description: String,
    pub severity: Severity,
}

impl fmt::Display for BreakingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.channel, self.description, self.severity)
    }
}

/// Every dotted key path of a nested mapping: `{a: {b: 1}}` -> `a`, `a.b`
pub fn extract_fields(schema: &Value) -> BTreeSet<String> {
    fn walk(node: &Value, prefix: &str, fields: &mut BTreeSet<String>) {
        if let Value::Object(map) = node {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                walk(value, &path, fields);
                fields.insert(path);
            }
        }
    }

    let mut fields = BTreeSet::new();
    walk(schema, "", &mut fields);
    fields
}

/// Breaking changes from `base` to `head` (whole spec documents)
pub fn detect_breaking_changes(
    channel: &str,
    file: &str,
    base: &Value,
    head: &Value,
) -> Vec<BreakingChange> {
    let mut changes = Vec::new();
    let mut push = |kind: BreakingKind, description: String| {
        changes.push(BreakingChange {
            kind,
            channel: channel.to_string(),
            file: file.to_string(),
            description,
            severity: kind.severity(),
        });
    };

    let base_version = declared_version(base);
    let head_version = declared_version(head);
    if let (Some(from), Some(to)) = (major(&base_version), major(&head_version)) {
        if to > from {
            push(
                BreakingKind::MajorVersionChange,
                format!("Version changed from {} to {}", base_version, head_version),
            );
        }
    }

    let empty = Value::Null;
    let base_schema = base.get("schema").unwrap_or(&empty);
    let head_schema = head.get("schema").unwrap_or(&empty);

    let head_fields = extract_fields(head_schema);
    for field in extract_fields(base_schema).difference(&head_fields) {
        push(
            BreakingKind::FieldRemoval,
            format!("Field '{}' was removed", field),
        );
    }

    let base_format = data_format(base_schema);
    let head_format = data_format(head_schema);
    if base_format != head_format {
        push(
            BreakingKind::FormatChange,
            format!(
                "Data format type changed from {} to {}",
                describe(base_format),
                describe(head_format)
            ),
        );
    }

    changes
}

fn declared_version(spec: &Value) -> String {
    match spec.get("meta").and_then(|m| m.get("version")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0.0.0".to_string(),
    }
}

fn major(version: &str) -> Option<u64> {
    version.split('.').next()?.trim().parse().ok()
}

fn data_format(schema: &Value) -> Option<&Value> {
    schema.get("data_format").and_then(|f| f.get("type"))
}

fn describe(format: Option<&Value>) -> String {
    match format {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "none".to_string(),
    }
}
