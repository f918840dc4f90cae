//! Channel spec documents and published releases

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel specification document (`spec-<version>.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChannelSpec {
    #[serde(default)]
    pub meta: SpecMeta,
    /// Nested field tree; `data_format.type` names the data format
    #[serde(default)]
    pub schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl ChannelSpec {
    /// Declared data-format type (`schema.data_format.type`)
    pub fn data_format_type(&self) -> Option<&Value> {
        self.schema.get("data_format").and_then(|f| f.get("type"))
    }
}

/// Spec metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SpecMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "scalar_as_string"
    )]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// YAML reads `version: 1.0` as a float; keep its text instead.
pub(crate) fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Lifecycle {
    #[serde(default)]
    pub status: LifecycleStatus,
}

/// Lifecycle status of a published spec
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Draft,
    #[default]
    Stable,
    Deprecated,
    Legacy,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Draft => "draft",
            LifecycleStatus::Stable => "stable",
            LifecycleStatus::Deprecated => "deprecated",
            LifecycleStatus::Legacy => "legacy",
        }
    }

    /// Deprecated and legacy releases still resolve but deserve a warning
    pub fn is_retired(&self) -> bool {
        matches!(self, LifecycleStatus::Deprecated | LifecycleStatus::Legacy)
    }
}

/// One published version of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub channel: String,
    pub version: semver::Version,
    pub spec: ChannelSpec,
    /// Coexistence marker; any value declares that this release may be
    /// selected alongside other members of its channel family
    pub coexistence: Option<Value>,
}

impl Release {
    pub fn supports_coexistence(&self) -> bool {
        self.coexistence.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec_document() {
        let yaml = r#"
meta:
  channel: image_original
  version: 1.2.0
  category: sensor
  description: Raw camera frames
schema:
  data_format:
    type: png
  fields:
    width: {type: int}
validation:
  rules: []
lifecycle:
  status: deprecated
"#;
        let spec: ChannelSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.meta.version.as_deref(), Some("1.2.0"));
        assert_eq!(spec.data_format_type(), Some(&Value::from("png")));
        assert_eq!(spec.lifecycle.status, LifecycleStatus::Deprecated);
        assert!(spec.lifecycle.status.is_retired());
    }

    #[test]
    fn test_spec_defaults_when_sections_missing() {
        let spec: ChannelSpec = serde_yaml::from_str("meta: {}").unwrap();
        assert_eq!(spec.lifecycle.status, LifecycleStatus::Stable);
        assert!(spec.data_format_type().is_none());
    }
}
