//! Bundles: hash-verified snapshots of resolved channel versions
//!
//! A [`Bundle`] is produced once by [`BundleBuilder`] and never mutated
//! afterwards. Its `integrity_hash` depends only on the sorted
//! `(channel, version)` pairs, so rebuilding from an unchanged consumer and
//! catalog yields the same hash regardless of when the build ran.

use crate::aliases::ChannelAliases;
use crate::catalog::ReleaseCatalog;
use crate::consumer::{Consumer, OnMissing, Requirement};
use crate::integrity::bundle_integrity_hash;
use crate::resolver::{
    Conflict, ConflictDetector, Resolution, ResolvedEntry, Resolver, UnresolvedRequirement,
};
use crate::{BundleError, Result};
use chrono::{DateTime, Datelike, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Label used for release bundles when the consumer declares no version
const DEFAULT_RELEASE_LABEL: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BundleType {
    #[default]
    Snapshot,
    Weekly,
    Release,
}

impl BundleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::Snapshot => "snapshot",
            BundleType::Weekly => "weekly",
            BundleType::Release => "release",
        }
    }

    /// Directory under `bundles/` holding bundles of this type
    pub fn dir_name(&self) -> &'static str {
        match self {
            BundleType::Snapshot => "snapshots",
            BundleType::Weekly => "weekly",
            BundleType::Release => "release",
        }
    }

    /// Version label for a bundle of this type built at `now`:
    /// `20260620-143022`, `2026.25`, or the consumer's declared version
    pub fn label(&self, now: DateTime<Utc>, consumer_version: Option<&str>) -> String {
        match self {
            BundleType::Snapshot => now.format("%Y%m%d-%H%M%S").to_string(),
            BundleType::Weekly => {
                let week = now.iso_week();
                format!("{}.{:02}", week.year(), week.week())
            }
            BundleType::Release => consumer_version
                .unwrap_or(DEFAULT_RELEASE_LABEL)
                .to_string(),
        }
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(BundleType::Snapshot),
            "weekly" => Ok(BundleType::Weekly),
            "release" => Ok(BundleType::Release),
            other => Err(format!(
                "unknown bundle type '{}' (expected snapshot, weekly or release)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub bundle_name: String,
    pub bundle_version: String,
    pub bundle_type: BundleType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One resolved channel inside a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleChannel {
    pub channel: String,
    pub version: String,
    pub locked_at: DateTime<Utc>,
    pub source_constraint: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_missing: Option<OnMissing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_file: Option<String>,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compatibility {
    pub all_compatible: bool,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}

impl Compatibility {
    pub fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        Self {
            all_compatible: conflicts.is_empty(),
            conflicts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub meta: BundleMeta,
    /// Path (or name) of the consumer this bundle was built from
    pub source_consumer: String,
    pub channels: Vec<BundleChannel>,
    pub compatibility: Compatibility,
    pub integrity_hash: String,
}

impl Bundle {
    pub fn from_file(path: &Path) -> Result<Self> {
        crate::read_yaml(path)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        crate::write_yaml(path, self)
    }

    /// `<bundles>/<type dir>/<name>-<version>.yaml`
    pub fn default_path(&self, bundles_dir: &Path) -> PathBuf {
        bundles_dir
            .join(self.meta.bundle_type.dir_name())
            .join(format!(
                "{}-{}.yaml",
                self.meta.bundle_name, self.meta.bundle_version
            ))
    }

    /// Recompute the integrity hash from this bundle's own channel list
    pub fn compute_integrity_hash(&self) -> String {
        bundle_integrity_hash(
            self.channels
                .iter()
                .map(|c| (c.channel.as_str(), c.version.as_str())),
        )
    }

    pub fn verify_integrity(&self) -> Result<()> {
        let calculated = self.compute_integrity_hash();
        if calculated != self.integrity_hash {
            return Err(BundleError::IntegrityMismatch {
                stored: self.integrity_hash.clone(),
                calculated,
            });
        }
        Ok(())
    }

    pub fn channel(&self, name: &str) -> Option<&BundleChannel> {
        self.channels.iter().find(|c| c.channel == name)
    }

    pub fn analyze(&self) -> BundleAnalysis {
        let mut version_distribution = BTreeMap::new();
        for entry in &self.channels {
            let major = entry
                .version
                .split_once('.')
                .map(|(major, _)| major)
                .unwrap_or(entry.version.as_str());
            *version_distribution.entry(major.to_string()).or_insert(0) += 1;
        }
        BundleAnalysis {
            bundle_name: self.meta.bundle_name.clone(),
            bundle_version: self.meta.bundle_version.clone(),
            channel_count: self.channels.len(),
            version_distribution,
            conflicts: self.compatibility.conflicts.clone(),
        }
    }
}

/// Summary statistics of a bundle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleAnalysis {
    pub bundle_name: String,
    pub bundle_version: String,
    pub channel_count: usize,
    /// Major version label -> number of channels on it
    pub version_distribution: BTreeMap<String, usize>,
    pub conflicts: Vec<Conflict>,
}

/// A freshly built bundle plus the non-fatal findings of the build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub bundle: Bundle,
    pub warnings: Vec<String>,
}

/// Builds bundles from consumers
pub struct BundleBuilder<'a> {
    catalog: &'a dyn ReleaseCatalog,
    aliases: ChannelAliases,
    detector: ConflictDetector,
    name: Option<String>,
    version_label: Option<String>,
    created_by: String,
}

impl<'a> BundleBuilder<'a> {
    pub fn new(catalog: &'a dyn ReleaseCatalog) -> Self {
        Self {
            catalog,
            aliases: ChannelAliases::default(),
            detector: ConflictDetector::default(),
            name: None,
            version_label: None,
            created_by: "dataspec".to_string(),
        }
    }

    pub fn with_aliases(mut self, aliases: ChannelAliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Override the bundle name (defaults to the consumer name)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the version label derived from the bundle type
    pub fn with_version_label(mut self, label: impl Into<String>) -> Self {
        self.version_label = Some(label.into());
        self
    }

    pub fn build(&self, consumer: &Consumer, bundle_type: BundleType) -> Result<BuildOutput> {
        self.build_at(consumer, bundle_type, Utc::now())
    }

    /// Build with an explicit clock. Fails with `ResolutionFailed` listing
    /// every fatal unresolved requirement.
    pub fn build_at(
        &self,
        consumer: &Consumer,
        bundle_type: BundleType,
        now: DateTime<Utc>,
    ) -> Result<BuildOutput> {
        let mut resolver = Resolver::new(self.catalog).at(now);
        let mut warnings = Vec::new();
        let mut failures = Vec::new();
        let mut seen = BTreeSet::new();
        let mut channels = Vec::new();

        for req in consumer.all_requirements() {
            let channel = self.aliases.canonicalize(&req.channel);
            if channel != req.channel {
                tracing::debug!(alias = %req.channel, channel, "canonicalized channel alias");
            }
            if !seen.insert(channel.to_string()) {
                warn(
                    &mut warnings,
                    format!(
                        "duplicate requirement for '{}' ignored, first declaration wins",
                        channel
                    ),
                );
                continue;
            }

            match self.resolve_requirement(&mut resolver, channel, req, &mut warnings)? {
                Some(entry) => {
                    self.check_lifecycle(&entry, &mut warnings);
                    channels.push(BundleChannel {
                        spec_file: Some(self.catalog.spec_locator(&entry.channel, &entry.version)),
                        channel: entry.channel,
                        version: entry.version.to_string(),
                        locked_at: entry.locked_at,
                        source_constraint: req.constraint_expr().to_string(),
                        required: req.required,
                        on_missing: req.on_missing,
                    });
                }
                None if is_fatal(req) => failures.push(UnresolvedRequirement {
                    channel: channel.to_string(),
                    constraint: req.constraint_expr().to_string(),
                }),
                None => warn(
                    &mut warnings,
                    format!(
                        "optional channel '{}' omitted: nothing satisfies '{}'",
                        channel,
                        req.constraint_expr()
                    ),
                ),
            }
        }

        if !failures.is_empty() {
            return Err(BundleError::ResolutionFailed { failures });
        }

        let resolved: BTreeMap<String, Version> = channels
            .iter()
            .filter_map(|c| Some((c.channel.clone(), Version::parse(&c.version).ok()?)))
            .collect();
        let conflicts = self.detector.detect(&resolved, self.catalog);
        for conflict in &conflicts {
            warnings.push(conflict.message.clone());
        }

        let integrity_hash = bundle_integrity_hash(
            channels
                .iter()
                .map(|c| (c.channel.as_str(), c.version.as_str())),
        );

        let consumer_version = consumer.meta.version.clone();
        if bundle_type == BundleType::Release
            && consumer_version.is_none()
            && self.version_label.is_none()
        {
            warn(
                &mut warnings,
                format!(
                    "consumer '{}' declares no version, release labelled {}",
                    consumer.name(),
                    DEFAULT_RELEASE_LABEL
                ),
            );
        }
        let bundle_version = self
            .version_label
            .clone()
            .unwrap_or_else(|| bundle_type.label(now, consumer_version.as_deref()));

        let bundle = Bundle {
            meta: BundleMeta {
                bundle_name: self
                    .name
                    .clone()
                    .unwrap_or_else(|| consumer.name().to_string()),
                bundle_version,
                bundle_type,
                created_at: now,
                created_by: self.created_by.clone(),
                consumer_version,
                description: Some(format!(
                    "Bundle generated from {} consumer",
                    consumer.name()
                )),
            },
            source_consumer: consumer
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| consumer.name().to_string()),
            channels,
            compatibility: Compatibility::from_conflicts(conflicts),
            integrity_hash,
        };

        tracing::info!(
            bundle = %bundle.meta.bundle_name,
            version = %bundle.meta.bundle_version,
            channels = bundle.channels.len(),
            hash = %bundle.integrity_hash,
            "bundle built"
        );
        Ok(BuildOutput { bundle, warnings })
    }

    /// Resolve one requirement, applying its `fetch_latest` fallback.
    /// `None` means unresolved; the caller applies the policy.
    fn resolve_requirement(
        &self,
        resolver: &mut Resolver<'_>,
        channel: &str,
        req: &Requirement,
        warnings: &mut Vec<String>,
    ) -> Result<Option<ResolvedEntry>> {
        let resolution = match resolver.resolve(channel, req.constraint_expr()) {
            Ok(resolution) => resolution,
            Err(BundleError::ChannelNotFound { .. }) => {
                warn(warnings, format!("channel '{}' not found in catalog", channel));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match resolution {
            Resolution::Resolved(entry) => Ok(Some(entry)),
            Resolution::Unresolved(_) if req.on_missing == Some(OnMissing::FetchLatest) => {
                let latest = resolver.latest(channel)?;
                if let Some(entry) = &latest {
                    warn(
                        warnings,
                        format!(
                            "'{}' does not satisfy '{}', fetched latest {}",
                            channel,
                            req.constraint_expr(),
                            entry.version
                        ),
                    );
                }
                Ok(latest)
            }
            Resolution::Unresolved(_) => Ok(None),
        }
    }

    fn check_lifecycle(&self, entry: &ResolvedEntry, warnings: &mut Vec<String>) {
        match self.catalog.get_release(&entry.channel, &entry.version) {
            Ok(release) if release.spec.lifecycle.status.is_retired() => warn(
                warnings,
                format!(
                    "{}@{} is {}",
                    entry.channel,
                    entry.version,
                    release.spec.lifecycle.status.as_str()
                ),
            ),
            Ok(_) => {}
            Err(e) => warn(
                warnings,
                format!("{}@{}: spec unreadable: {}", entry.channel, entry.version, e),
            ),
        }
    }
}

/// `fail` is fatal even for optional requirements
fn is_fatal(req: &Requirement) -> bool {
    req.required || req.on_missing == Some(OnMissing::Fail)
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{}", message);
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexCatalog;
    use crate::consumer::ConsumerMeta;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn catalog() -> IndexCatalog {
        let mut catalog = IndexCatalog::new();
        for v in ["1.0.0", "1.1.0", "1.2.0"] {
            catalog.insert("imageA", v, json!({"meta": {"version": v}}), None);
        }
        catalog.insert("occupancy", "1.0.0", json!({}), None);
        catalog.insert(
            "legacy_map",
            "0.9.0",
            json!({"lifecycle": {"status": "deprecated"}}),
            None,
        );
        catalog
    }

    fn consumer(yaml: &str) -> Consumer {
        Consumer::from_yaml_str(yaml).unwrap()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 20, 14, 30, 22).unwrap()
    }

    const E2E: &str = r#"
meta: {consumer: e2e, version: 2.1.0}
requirements:
  - {channel: imageA, version: ">=1.1.0"}
  - {channel: occupancy, version: "1.0.0"}
"#;

    #[test]
    fn test_version_labels() {
        assert_eq!(BundleType::Snapshot.label(at(), None), "20260620-143022");
        assert_eq!(BundleType::Weekly.label(at(), None), "2026.25");
        assert_eq!(BundleType::Release.label(at(), Some("2.1.0")), "2.1.0");
        assert_eq!(BundleType::Release.label(at(), None), "1.0.0");
    }

    #[test]
    fn test_weekly_label_uses_iso_week_year() {
        let new_year = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(BundleType::Weekly.label(new_year, None), "2026.53");
    }

    #[test]
    fn test_build_resolves_and_hashes() {
        let catalog = catalog();
        let output = BundleBuilder::new(&catalog)
            .build_at(&consumer(E2E), BundleType::Release, at())
            .unwrap();
        let bundle = output.bundle;

        assert_eq!(bundle.meta.bundle_name, "e2e");
        assert_eq!(bundle.meta.bundle_version, "2.1.0");
        assert_eq!(bundle.channel("imageA").unwrap().version, "1.2.0");
        assert_eq!(bundle.channel("occupancy").unwrap().version, "1.0.0");
        assert_eq!(
            bundle.channel("imageA").unwrap().spec_file.as_deref(),
            Some("index://imageA/1.2.0")
        );
        assert_eq!(bundle.integrity_hash.len(), 16);
        assert!(bundle.compatibility.all_compatible);
        assert!(bundle.verify_integrity().is_ok());
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_hash_ignores_build_time() {
        let catalog = catalog();
        let builder = BundleBuilder::new(&catalog);
        let first = builder
            .build_at(&consumer(E2E), BundleType::Snapshot, at())
            .unwrap();
        let later = Utc.with_ymd_and_hms(2027, 3, 1, 9, 0, 0).unwrap();
        let second = builder
            .build_at(&consumer(E2E), BundleType::Snapshot, later)
            .unwrap();

        assert_eq!(first.bundle.integrity_hash, second.bundle.integrity_hash);
        assert_ne!(first.bundle.meta.created_at, second.bundle.meta.created_at);
    }

    #[test]
    fn test_required_unresolved_fails_with_channel_and_constraint() {
        let catalog = catalog();
        let yaml = r#"
meta: {consumer: c}
requirements:
  - {channel: imageA, version: "^2.0.0"}
  - {channel: lidar, version: "1.0.0"}
"#;
        let err = BundleBuilder::new(&catalog)
            .build_at(&consumer(yaml), BundleType::Snapshot, at())
            .unwrap_err();
        match err {
            BundleError::ResolutionFailed { failures } => {
                assert_eq!(
                    failures,
                    vec![
                        UnresolvedRequirement {
                            channel: "imageA".to_string(),
                            constraint: "^2.0.0".to_string()
                        },
                        UnresolvedRequirement {
                            channel: "lidar".to_string(),
                            constraint: "1.0.0".to_string()
                        },
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn consumer_with(requirements: Vec<Requirement>) -> Consumer {
        Consumer {
            meta: ConsumerMeta {
                consumer: "c".to_string(),
                ..ConsumerMeta::default()
            },
            requirements,
            requirement_groups: BTreeMap::new(),
            source: None,
        }
    }

    #[test]
    fn test_on_missing_policies() {
        let catalog = catalog();
        let consumer = consumer_with(vec![
            Requirement::new("imageA", "^3.0.0").optional(),
            Requirement::new("occupancy", "^2.0.0").on_missing(OnMissing::FetchLatest),
        ]);
        let output = BundleBuilder::new(&catalog)
            .build_at(&consumer, BundleType::Snapshot, at())
            .unwrap();
        assert!(output.bundle.channel("imageA").is_none());
        let occupancy = output.bundle.channel("occupancy").unwrap();
        assert_eq!(occupancy.version, "1.0.0");
        assert_eq!(occupancy.source_constraint, "^2.0.0");
        assert_eq!(occupancy.on_missing, Some(OnMissing::FetchLatest));
        assert_eq!(output.warnings.len(), 2);

        let fail = consumer_with(vec![Requirement::new("imageA", "^3.0.0")
            .optional()
            .on_missing(OnMissing::Fail)]);
        assert!(matches!(
            BundleBuilder::new(&catalog).build_at(&fail, BundleType::Snapshot, at()),
            Err(BundleError::ResolutionFailed { .. })
        ));
    }

    #[test]
    fn test_aliases_and_duplicates() {
        let catalog = catalog();
        let mut aliases = ChannelAliases::new();
        aliases.insert("camera", "imageA");
        let yaml = r#"
meta: {consumer: c}
requirements:
  - {channel: camera, version: "1.0.0"}
  - {channel: imageA, version: "1.2.0"}
"#;
        let output = BundleBuilder::new(&catalog)
            .with_aliases(aliases)
            .build_at(&consumer(yaml), BundleType::Snapshot, at())
            .unwrap();
        assert_eq!(output.bundle.channels.len(), 1);
        assert_eq!(output.bundle.channels[0].channel, "imageA");
        assert_eq!(output.bundle.channels[0].version, "1.0.0");
        assert!(output.warnings[0].contains("duplicate requirement"));
    }

    #[test]
    fn test_deprecated_release_warns() {
        let catalog = catalog();
        let yaml = "meta: {consumer: c}\nrequirements:\n  - {channel: legacy_map}\n";
        let output = BundleBuilder::new(&catalog)
            .build_at(&consumer(yaml), BundleType::Snapshot, at())
            .unwrap();
        assert_eq!(output.warnings, vec!["legacy_map@0.9.0 is deprecated".to_string()]);
    }

    #[test]
    fn test_analyze_version_distribution() {
        let mut catalog = catalog();
        catalog.insert("radar", "2.3.0", json!({}), None);
        let yaml = r#"
meta: {consumer: c}
requirements:
  - {channel: imageA}
  - {channel: occupancy}
  - {channel: radar}
"#;
        let bundle = BundleBuilder::new(&catalog)
            .with_name("nightly")
            .with_version_label("n1")
            .build_at(&consumer(yaml), BundleType::Snapshot, at())
            .unwrap()
            .bundle;
        let analysis = bundle.analyze();
        assert_eq!(analysis.bundle_name, "nightly");
        assert_eq!(analysis.bundle_version, "n1");
        assert_eq!(analysis.channel_count, 3);
        assert_eq!(
            analysis.version_distribution,
            BTreeMap::from([("1".to_string(), 2), ("2".to_string(), 1)])
        );
        assert_eq!(
            bundle.default_path(Path::new("bundles")),
            PathBuf::from("bundles/snapshots/nightly-n1.yaml")
        );
    }

    #[test]
    fn test_bundle_yaml_round_trip_keeps_hash_valid() {
        let catalog = catalog();
        let temp = tempfile::TempDir::new().unwrap();
        let bundle = BundleBuilder::new(&catalog)
            .build_at(&consumer(E2E), BundleType::Weekly, at())
            .unwrap()
            .bundle;
        let path = bundle.default_path(temp.path());
        bundle.write_to_file(&path).unwrap();

        let loaded = Bundle::from_file(&path).unwrap();
        assert_eq!(loaded, bundle);
        assert!(loaded.verify_integrity().is_ok());
    }
}
