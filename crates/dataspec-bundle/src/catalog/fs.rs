//! Filesystem-backed catalog
//!
//! Layout: `<channels>/<channel>/spec-<version>.yaml`, with an optional
//! `release-<version>.yaml` beside it carrying release-level markers.

use super::{parse_versions, ReleaseCatalog};
use crate::spec::{ChannelSpec, Release};
use crate::{BundleError, Result};
use semver::Version;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SPEC_PREFIX: &str = "spec-";
const SPEC_SUFFIXES: [&str; 2] = [".yaml", ".yml"];

#[derive(Debug, Clone)]
pub struct FsCatalog {
    channels_dir: PathBuf,
}

impl FsCatalog {
    pub fn new(channels_dir: impl Into<PathBuf>) -> Self {
        Self {
            channels_dir: channels_dir.into(),
        }
    }

    pub fn channels_dir(&self) -> &Path {
        &self.channels_dir
    }

    /// Directory of `channel`. Names that could leave `channels/` are
    /// reported as unknown channels.
    fn channel_dir(&self, channel: &str) -> Result<PathBuf> {
        if !is_plain_channel_name(channel) {
            tracing::warn!(channel, "rejecting channel name with path components");
            return Err(BundleError::channel_not_found(channel));
        }
        Ok(self.channels_dir.join(channel))
    }

    fn spec_path(&self, channel: &str, version: &Version) -> Result<PathBuf> {
        let dir = self.channel_dir(channel)?;
        let yaml = dir.join(format!("{}{}.yaml", SPEC_PREFIX, version));
        if yaml.exists() {
            return Ok(yaml);
        }
        let yml = dir.join(format!("{}{}.yml", SPEC_PREFIX, version));
        Ok(if yml.exists() { yml } else { yaml })
    }

    fn release_path(&self, channel: &str, version: &Version) -> Result<PathBuf> {
        Ok(self
            .channel_dir(channel)?
            .join(format!("release-{}.yaml", version)))
    }

    fn read_coexistence(&self, channel: &str, version: &Version) -> Result<Option<Value>> {
        let path = self.release_path(channel, version)?;
        if !path.exists() {
            return Ok(None);
        }
        let release: Value = crate::read_yaml(&path)?;
        Ok(release.get("coexistence").cloned())
    }
}

fn is_plain_channel_name(channel: &str) -> bool {
    !channel.is_empty()
        && channel != "."
        && channel != ".."
        && !channel.contains(['/', '\\'])
        && !Path::new(channel).is_absolute()
}

/// `spec-1.2.0.yaml` -> `1.2.0`
fn version_label(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_prefix(SPEC_PREFIX)?;
    SPEC_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
}

impl ReleaseCatalog for FsCatalog {
    fn list_versions(&self, channel: &str) -> Result<Vec<Version>> {
        let dir = self.channel_dir(channel)?;
        if !dir.is_dir() {
            return Err(BundleError::channel_not_found(channel));
        }

        let entries = fs::read_dir(&dir).map_err(|e| BundleError::io(&dir, e))?;
        let mut labels = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BundleError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(label) = version_label(&name) {
                labels.push(label.to_string());
            }
        }

        Ok(parse_versions(channel, labels))
    }

    fn get_release(&self, channel: &str, version: &Version) -> Result<Release> {
        let path = self.spec_path(channel, version)?;
        if !path.exists() {
            if !self.channel_dir(channel)?.is_dir() {
                return Err(BundleError::channel_not_found(channel));
            }
            return Err(BundleError::release_not_found(channel, version));
        }

        let spec: ChannelSpec = crate::read_yaml(&path)?;
        Ok(Release {
            channel: channel.to_string(),
            version: version.clone(),
            spec,
            coexistence: self.read_coexistence(channel, version)?,
        })
    }

    fn spec_content(&self, channel: &str, version: &Version) -> Result<Option<Vec<u8>>> {
        let path = self.spec_path(channel, version)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BundleError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_spec(root: &Path, channel: &str, version: &str) {
        let dir = root.join(channel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(format!("spec-{}.yaml", version)),
            format!("meta:\n  channel: {}\n  version: {}\n", channel, version),
        )
        .unwrap();
    }

    #[test]
    fn test_version_label() {
        assert_eq!(version_label("spec-1.2.0.yaml"), Some("1.2.0"));
        assert_eq!(version_label("spec-1.2.0.yml"), Some("1.2.0"));
        assert_eq!(version_label("release-1.2.0.yaml"), None);
        assert_eq!(version_label("README.md"), None);
    }

    #[test]
    fn test_list_versions_ascending() {
        let temp = TempDir::new().unwrap();
        for v in ["1.10.0", "1.2.0", "1.9.0"] {
            write_spec(temp.path(), "radar", v);
        }
        fs::write(temp.path().join("radar/README.md"), "notes").unwrap();

        let catalog = FsCatalog::new(temp.path());
        let versions = catalog.list_versions("radar").unwrap();
        assert_eq!(
            versions,
            vec![
                Version::new(1, 2, 0),
                Version::new(1, 9, 0),
                Version::new(1, 10, 0)
            ]
        );
    }

    #[test]
    fn test_list_versions_skips_non_semver() {
        let temp = TempDir::new().unwrap();
        write_spec(temp.path(), "radar", "1.0.0");
        write_spec(temp.path(), "radar", "draft");

        let catalog = FsCatalog::new(temp.path());
        assert_eq!(
            catalog.list_versions("radar").unwrap(),
            vec![Version::new(1, 0, 0)]
        );
    }

    #[test]
    fn test_missing_channel_is_not_found() {
        let temp = TempDir::new().unwrap();
        let catalog = FsCatalog::new(temp.path());
        assert!(matches!(
            catalog.list_versions("ghost"),
            Err(BundleError::ChannelNotFound { .. })
        ));
    }

    #[test]
    fn test_path_like_channel_names_are_not_found() {
        let temp = TempDir::new().unwrap();
        let channels = temp.path().join("channels");
        write_spec(&channels, "radar", "1.0.0");
        write_spec(temp.path(), "outside", "1.0.0");
        let catalog = FsCatalog::new(&channels);
        let v1 = Version::new(1, 0, 0);

        for name in ["../outside", "..", "radar/../../outside", "/etc"] {
            assert!(
                matches!(
                    catalog.list_versions(name),
                    Err(BundleError::ChannelNotFound { .. })
                ),
                "{name}"
            );
            assert!(matches!(
                catalog.get_release(name, &v1),
                Err(BundleError::ChannelNotFound { .. })
            ));
            assert!(!catalog.has_release(name, &v1));
        }
        assert_eq!(catalog.list_versions("radar").unwrap(), vec![v1]);
    }

    #[test]
    fn test_get_release_reads_coexistence_marker() {
        let temp = TempDir::new().unwrap();
        write_spec(temp.path(), "radar.v2", "2.0.0");
        fs::write(
            temp.path().join("radar.v2/release-2.0.0.yaml"),
            "coexistence:\n  with: [radar.v1]\n",
        )
        .unwrap();

        let catalog = FsCatalog::new(temp.path());
        let release = catalog
            .get_release("radar.v2", &Version::new(2, 0, 0))
            .unwrap();
        assert!(release.supports_coexistence());
        assert_eq!(release.spec.meta.channel.as_deref(), Some("radar.v2"));
    }

    #[test]
    fn test_spec_content_absent() {
        let temp = TempDir::new().unwrap();
        write_spec(temp.path(), "radar", "1.0.0");
        let catalog = FsCatalog::new(temp.path());

        assert!(catalog.has_release("radar", &Version::new(1, 0, 0)));
        assert!(!catalog.has_release("radar", &Version::new(3, 0, 0)));
        assert!(matches!(
            catalog.get_release("radar", &Version::new(3, 0, 0)),
            Err(BundleError::ReleaseNotFound { .. })
        ));
    }
}
