//! Consumer documents (`consumers/<name>.yaml`)

use crate::spec::scalar_as_string;
use crate::{BundleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A named set of version requirements against channels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Consumer {
    pub meta: ConsumerMeta,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    /// Named groups, flattened ahead of `requirements` in name order
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requirement_groups: BTreeMap<String, RequirementGroup>,
    /// File this consumer was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Consumer {
    /// Parse a consumer from YAML text
    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Load and check a consumer file
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut consumer: Consumer = crate::read_yaml(path)?;
        consumer.source = Some(path.to_path_buf());
        consumer.check().map_err(|reason| BundleError::InvalidConsumer {
            path: path.display().to_string(),
            reason,
        })?;
        Ok(consumer)
    }

    pub fn name(&self) -> &str {
        &self.meta.consumer
    }

    /// Every requirement: groups in name order, then top-level entries
    pub fn all_requirements(&self) -> Vec<&Requirement> {
        self.requirement_groups
            .values()
            .flat_map(|group| group.requirements.iter())
            .chain(self.requirements.iter())
            .collect()
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.meta.consumer.trim().is_empty() {
            return Err("meta.consumer is empty".to_string());
        }
        for req in self.all_requirements() {
            if req.channel.trim().is_empty() {
                return Err("requirement with empty channel".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConsumerMeta {
    pub consumer: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "scalar_as_string"
    )]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequirementGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

/// One channel requirement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    pub channel: String,
    /// Constraint expression; absent means any version
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "scalar_as_string"
    )]
    pub version: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_missing: Option<OnMissing>,
}

fn default_required() -> bool {
    true
}

impl Requirement {
    pub fn new(channel: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            version: Some(version.into()),
            required: true,
            on_missing: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn on_missing(mut self, policy: OnMissing) -> Self {
        self.on_missing = Some(policy);
        self
    }

    /// Constraint text, `*` when no version was given
    pub fn constraint_expr(&self) -> &str {
        self.version.as_deref().unwrap_or("*")
    }
}

/// What a pipeline does when a channel cannot be satisfied
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnMissing {
    Interrupt,
    SkipFrame,
    Continue,
    FetchLatest,
    Fail,
    Ignore,
}

impl OnMissing {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnMissing::Interrupt => "interrupt",
            OnMissing::SkipFrame => "skip_frame",
            OnMissing::Continue => "continue",
            OnMissing::FetchLatest => "fetch_latest",
            OnMissing::Fail => "fail",
            OnMissing::Ignore => "ignore",
        }
    }
}

impl fmt::Display for OnMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const E2E: &str = r#"
meta:
  consumer: end_to_end
  version: 1.2.0
  owner: planning-team
requirement_groups:
  sensors:
    requirements:
      - channel: image_original
        version: ">=1.1.0"
        on_missing: interrupt
  maps:
    requirements:
      - channel: drivable_area
        version: "^2.0.0"
        required: false
        on_missing: skip_frame
requirements:
  - channel: occupancy
"#;

    #[test]
    fn test_parse_consumer() {
        let consumer = Consumer::from_yaml_str(E2E).unwrap();
        assert_eq!(consumer.name(), "end_to_end");
        assert_eq!(consumer.meta.version.as_deref(), Some("1.2.0"));
        assert_eq!(consumer.meta.owner.as_deref(), Some("planning-team"));
    }

    #[test]
    fn test_requirement_defaults() {
        let consumer = Consumer::from_yaml_str(E2E).unwrap();
        let occupancy = &consumer.requirements[0];
        assert!(occupancy.required);
        assert_eq!(occupancy.on_missing, None);
        assert_eq!(occupancy.constraint_expr(), "*");
    }

    #[test]
    fn test_groups_flatten_in_name_order() {
        let consumer = Consumer::from_yaml_str(E2E).unwrap();
        let channels: Vec<&str> = consumer
            .all_requirements()
            .iter()
            .map(|r| r.channel.as_str())
            .collect();
        assert_eq!(channels, vec!["drivable_area", "image_original", "occupancy"]);
        assert_eq!(
            consumer.all_requirements()[0].on_missing,
            Some(OnMissing::SkipFrame)
        );
    }

    #[test]
    fn test_from_file_rejects_blank_consumer() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("blank.yaml");
        std::fs::write(&path, "meta:\n  consumer: ''\nrequirements: []\n").unwrap();
        assert!(matches!(
            Consumer::from_file(&path),
            Err(BundleError::InvalidConsumer { .. })
        ));
    }

    #[test]
    fn test_on_missing_round_names() {
        let policy: OnMissing = serde_yaml::from_str("fetch_latest").unwrap();
        assert_eq!(policy, OnMissing::FetchLatest);
        assert_eq!(policy.to_string(), "fetch_latest");
    }
}
