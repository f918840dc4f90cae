//! Index-backed catalog
//!
//! Answers the catalog contract from a single JSON document, the shape a
//! database export or query API hands back:
//!
//! ```json
//! {"channels": {"radar.v1": {"releases": {"1.0.0": {"spec": {...}, "coexistence": {...}}}}}}
//! ```

use super::{parse_versions, ReleaseCatalog};
use crate::integrity::canonical_json;
use crate::spec::{ChannelSpec, Release};
use crate::{BundleError, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexCatalog {
    #[serde(default)]
    channels: BTreeMap<String, IndexedChannel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct IndexedChannel {
    #[serde(default)]
    releases: BTreeMap<String, IndexedRelease>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexedRelease {
    spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coexistence: Option<Value>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index document from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| BundleError::json(path, e))
    }

    pub fn from_json_str(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Add a release, replacing any previous entry for the same version
    pub fn insert(
        &mut self,
        channel: impl Into<String>,
        version: impl Into<String>,
        spec: Value,
        coexistence: Option<Value>,
    ) -> &mut Self {
        self.channels
            .entry(channel.into())
            .or_default()
            .releases
            .insert(version.into(), IndexedRelease { spec, coexistence });
        self
    }

    fn lookup(&self, channel: &str, version: &Version) -> Result<&IndexedRelease> {
        let indexed = self
            .channels
            .get(channel)
            .ok_or_else(|| BundleError::channel_not_found(channel))?;
        // Labels are stored as written; match on parsed precedence.
        indexed
            .releases
            .iter()
            .find(|(label, _)| Version::parse(label).ok().as_ref() == Some(version))
            .map(|(_, release)| release)
            .ok_or_else(|| BundleError::release_not_found(channel, version))
    }
}

impl ReleaseCatalog for IndexCatalog {
    fn list_versions(&self, channel: &str) -> Result<Vec<Version>> {
        let indexed = self
            .channels
            .get(channel)
            .ok_or_else(|| BundleError::channel_not_found(channel))?;
        Ok(parse_versions(channel, indexed.releases.keys()))
    }

    fn get_release(&self, channel: &str, version: &Version) -> Result<Release> {
        let indexed = self.lookup(channel, version)?;
        let spec: ChannelSpec = serde_json::from_value(indexed.spec.clone()).map_err(|e| {
            BundleError::Serialize(format!("spec of {}@{}: {}", channel, version, e))
        })?;
        Ok(Release {
            channel: channel.to_string(),
            version: version.clone(),
            spec,
            coexistence: indexed.coexistence.clone(),
        })
    }

    fn spec_content(&self, channel: &str, version: &Version) -> Result<Option<Vec<u8>>> {
        match self.lookup(channel, version) {
            Ok(indexed) => Ok(Some(canonical_json(&indexed.spec).into_bytes())),
            Err(BundleError::ChannelNotFound { .. } | BundleError::ReleaseNotFound { .. }) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn spec_locator(&self, channel: &str, version: &Version) -> String {
        format!("index://{}/{}", channel, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> IndexCatalog {
        IndexCatalog::from_json_str(
            r#"{
              "channels": {
                "occupancy": {
                  "releases": {
                    "1.0.0": {"spec": {"meta": {"version": "1.0.0"}, "schema": {"grid": {"type": "float"}}}},
                    "0.9.0": {"spec": {"meta": {"version": "0.9.0"}}},
                    "beta": {"spec": {}}
                  }
                },
                "radar.v2": {
                  "releases": {
                    "2.0.0": {"spec": {}, "coexistence": {"with": ["radar.v1"]}}
                  }
                }
              }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_list_versions_from_index() {
        let catalog = sample();
        assert_eq!(
            catalog.list_versions("occupancy").unwrap(),
            vec![Version::new(0, 9, 0), Version::new(1, 0, 0)]
        );
        assert!(matches!(
            catalog.list_versions("lidar"),
            Err(BundleError::ChannelNotFound { .. })
        ));
    }

    #[test]
    fn test_get_release_from_index() {
        let catalog = sample();
        let release = catalog
            .get_release("radar.v2", &Version::new(2, 0, 0))
            .unwrap();
        assert!(release.supports_coexistence());

        let release = catalog
            .get_release("occupancy", &Version::new(1, 0, 0))
            .unwrap();
        assert!(!release.supports_coexistence());
        assert_eq!(release.spec.meta.version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_spec_content_is_canonical_json() {
        let mut catalog = IndexCatalog::new();
        catalog.insert("lidar", "1.0.0", json!({"schema": {"b": 1, "a": 2}}), None);

        let bytes = catalog
            .spec_content("lidar", &Version::new(1, 0, 0))
            .unwrap()
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"schema": {"a": 2, "b": 1}}"#
        );
        assert_eq!(
            catalog.spec_content("lidar", &Version::new(2, 0, 0)).unwrap(),
            None
        );
    }
}
