//! Naming: channel aliases, channel families and consumer version aliases

use crate::bundle::BundleType;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Alias key that always points at the most recently registered version
pub const LATEST: &str = "latest";

/// Synonym table from `taxonomy/channel_taxonomy.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelAliases {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl ChannelAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the taxonomy file. A missing file yields an empty alias set.
    pub fn from_taxonomy_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no channel taxonomy, aliases disabled");
            return Ok(Self::default());
        }
        crate::read_yaml(path)
    }

    pub fn insert(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(alias.into(), canonical.into());
    }

    /// Canonical identifier for `channel`, or `channel` itself
    pub fn canonicalize<'a>(&'a self, channel: &'a str) -> &'a str {
        self.aliases
            .get(channel)
            .map(String::as_str)
            .unwrap_or(channel)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Decides which channels belong to the same mutually exclusive family
pub trait FamilyPolicy {
    fn family<'a>(&self, channel: &'a str) -> &'a str;
}

/// Family is everything before the first separator: `radar.v2` -> `radar`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeparatorFamilyPolicy {
    separator: char,
}

impl SeparatorFamilyPolicy {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }
}

impl Default for SeparatorFamilyPolicy {
    fn default() -> Self {
        Self::new('.')
    }
}

impl FamilyPolicy for SeparatorFamilyPolicy {
    fn family<'a>(&self, channel: &'a str) -> &'a str {
        channel
            .split_once(self.separator)
            .map(|(family, _)| family)
            .unwrap_or(channel)
    }
}

/// One registered consumer version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub bundle_path: String,
    pub bundle_type: BundleType,
    pub registered_at: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "active".to_string()
}

/// Consumer version to bundle registry (`consumer_version_aliases.yaml`)
///
/// Lets downstream users ask for `end_to_end@1.2.0` (or `@latest`) instead
/// of tracking bundle version labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerAliases {
    consumers: BTreeMap<String, BTreeMap<String, AliasEntry>>,
}

impl ConsumerAliases {
    /// Load the registry. A missing or empty file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let registry: Option<Self> = crate::read_yaml(path)?;
        Ok(registry.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::write_yaml(path, self)
    }

    /// Record `consumer@version -> bundle_path` and move `latest` to it
    pub fn register(
        &mut self,
        consumer: &str,
        version: &str,
        bundle_path: impl Into<String>,
        bundle_type: BundleType,
    ) -> &AliasEntry {
        let entry = AliasEntry {
            bundle_path: bundle_path.into(),
            bundle_type,
            registered_at: Utc::now(),
            status: default_status(),
        };
        let versions = self.consumers.entry(consumer.to_string()).or_default();
        versions.insert(version.to_string(), entry.clone());
        versions.insert(LATEST.to_string(), entry);
        tracing::info!(consumer, version, "registered consumer version alias");
        &versions[LATEST]
    }

    /// Bundle path registered for `consumer@version` (`latest` when `None`)
    pub fn bundle_for(&self, consumer: &str, version: Option<&str>) -> Option<&str> {
        self.consumers
            .get(consumer)?
            .get(version.unwrap_or(LATEST))
            .map(|entry| entry.bundle_path.as_str())
    }

    pub fn versions(&self, consumer: &str) -> Vec<&str> {
        self.consumers
            .get(consumer)
            .map(|versions| {
                versions
                    .keys()
                    .map(String::as_str)
                    .filter(|v| *v != LATEST)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canonicalize_alias() {
        let mut aliases = ChannelAliases::new();
        aliases.insert("camera_raw", "image_original");
        assert_eq!(aliases.canonicalize("camera_raw"), "image_original");
        assert_eq!(aliases.canonicalize("occupancy"), "occupancy");
    }

    #[test]
    fn test_taxonomy_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("channel_taxonomy.yaml");
        std::fs::write(
            &path,
            "categories:\n  sensor: [image_original]\naliases:\n  img: image_original\n",
        )
        .unwrap();

        let aliases = ChannelAliases::from_taxonomy_file(&path).unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases.canonicalize("img"), "image_original");

        let missing = ChannelAliases::from_taxonomy_file(&temp.path().join("nope.yaml")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_separator_family_policy() {
        let policy = SeparatorFamilyPolicy::default();
        assert_eq!(policy.family("radar.v1"), "radar");
        assert_eq!(policy.family("radar.v2.beta"), "radar");
        assert_eq!(policy.family("occupancy"), "occupancy");

        let underscore = SeparatorFamilyPolicy::new('_');
        assert_eq!(underscore.family("image_original"), "image");
    }

    #[test]
    fn test_consumer_alias_latest_moves() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("consumer_version_aliases.yaml");

        let mut registry = ConsumerAliases::load(&path).unwrap();
        registry.register("e2e", "1.0.0", "bundles/weekly/e2e-2026.01.yaml", BundleType::Weekly);
        registry.register("e2e", "1.1.0", "bundles/weekly/e2e-2026.02.yaml", BundleType::Weekly);
        registry.save(&path).unwrap();

        let reloaded = ConsumerAliases::load(&path).unwrap();
        assert_eq!(
            reloaded.bundle_for("e2e", None),
            Some("bundles/weekly/e2e-2026.02.yaml")
        );
        assert_eq!(
            reloaded.bundle_for("e2e", Some("1.0.0")),
            Some("bundles/weekly/e2e-2026.01.yaml")
        );
        assert_eq!(reloaded.bundle_for("e2e", Some("9.9.9")), None);
        assert_eq!(reloaded.bundle_for("other", None), None);
        assert_eq!(reloaded.versions("e2e"), vec!["1.0.0", "1.1.0"]);
    }
}
