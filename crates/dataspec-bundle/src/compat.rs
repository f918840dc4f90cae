//! Compatibility checks between two revisions of the channel specs
//!
//! The checker diffs spec files under `channels/<channel>/spec-*.yaml`,
//! classifies each touched channel, extracts breaking changes and then
//! cross-references the consumer matrix for active production locks.
//! Parse failures never abort a check; they become [`CompatWarning`]s.

mod production;
mod revision;
mod schema;

pub use production::{
    parse_deadline, ConsumerMatrix, ConsumerProfile, LockState, ProductionConflict, ProductionLock,
};
pub use revision::{GitRevisionSource, InMemoryRevisions, RevisionSource};
pub use schema::{detect_breaking_changes, extract_fields, BreakingChange, BreakingKind};

use crate::severity::Severity;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// How a channel was touched between the two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Every touched spec file is new
    NewChannel,
    Modification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub severity: Severity,
    #[serde(default)]
    pub additions: Vec<String>,
    #[serde(default)]
    pub modifications: Vec<String>,
    #[serde(default)]
    pub removals: Vec<String>,
    #[serde(default)]
    pub breaking_changes: Vec<BreakingChange>,
}

/// Non-fatal problems met while checking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompatWarning {
    /// One revision of a spec file is not structured data
    UnparseableRevision {
        channel: String,
        file: String,
        reason: String,
    },
    /// A production lock whose `locked_until` cannot be read; treated as inactive
    UnreadableLockDeadline {
        consumer: String,
        locked_until: Option<String>,
    },
}

impl fmt::Display for CompatWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatWarning::UnparseableRevision {
                channel,
                file,
                reason,
            } => write!(f, "{}: cannot parse {}: {}", channel, file, reason),
            CompatWarning::UnreadableLockDeadline {
                consumer,
                locked_until: Some(value),
            } => write!(
                f,
                "production lock for {} has unreadable locked_until '{}'",
                consumer, value
            ),
            CompatWarning::UnreadableLockDeadline {
                consumer,
                locked_until: None,
            } => write!(f, "production lock for {} has no locked_until", consumer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilitySummary {
    pub total_channels_changed: usize,
    pub breaking_changes_count: usize,
    pub production_conflicts_count: usize,
    /// Maximum over every breaking change, production conflict and
    /// per-channel classification, with `low` as the floor. A modified
    /// channel counts as at least `medium` even without a breaking change.
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub timestamp: DateTime<Utc>,
    pub base_ref: String,
    pub head_ref: String,
    pub changed_files: Vec<String>,
    pub channel_changes: BTreeMap<String, ChannelChange>,
    pub breaking_changes: Vec<BreakingChange>,
    pub production_conflicts: Vec<ProductionConflict>,
    pub affected_consumers: Vec<String>,
    pub warnings: Vec<CompatWarning>,
    pub summary: CompatibilitySummary,
}

impl CompatibilityReport {
    /// Breaking changes or production conflicts are present
    pub fn has_blocking_findings(&self) -> bool {
        !self.breaking_changes.is_empty() || !self.production_conflicts.is_empty()
    }
}

/// Compares spec revisions through a [`RevisionSource`]
pub struct CompatibilityChecker<'a> {
    source: &'a dyn RevisionSource,
}

impl<'a> CompatibilityChecker<'a> {
    pub fn new(source: &'a dyn RevisionSource) -> Self {
        Self { source }
    }

    pub fn check(
        &self,
        base_ref: &str,
        head_ref: &str,
        matrix: &ConsumerMatrix,
    ) -> Result<CompatibilityReport> {
        self.check_at(base_ref, head_ref, matrix, Utc::now())
    }

    /// Run the check with `now` deciding which production locks are active.
    /// Only a failing revision source is an error.
    pub fn check_at(
        &self,
        base_ref: &str,
        head_ref: &str,
        matrix: &ConsumerMatrix,
        now: DateTime<Utc>,
    ) -> Result<CompatibilityReport> {
        let changed_files = self.source.changed_files(base_ref, head_ref)?;
        let mut by_channel: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for path in &changed_files {
            if let Some(channel) = spec_channel(path) {
                by_channel.entry(channel).or_default().push(path);
            }
        }
        tracing::debug!(
            base = base_ref,
            head = head_ref,
            files = changed_files.len(),
            channels = by_channel.len(),
            "comparing revisions"
        );

        let mut warnings = Vec::new();
        let mut channel_changes = BTreeMap::new();
        for (channel, files) in &by_channel {
            let change = self.analyze_channel(channel, files, base_ref, head_ref, &mut warnings)?;
            channel_changes.insert(channel.to_string(), change);
        }

        let breaking_changes: Vec<BreakingChange> = channel_changes
            .values()
            .flat_map(|c| c.breaking_changes.iter().cloned())
            .collect();

        let touched = by_channel.keys().copied();
        let production_conflicts =
            matrix.production_conflicts(touched.clone(), now, |consumer, locked_until| {
                tracing::warn!(consumer, ?locked_until, "ignoring production lock with unreadable deadline");
                warnings.push(CompatWarning::UnreadableLockDeadline {
                    consumer: consumer.to_string(),
                    locked_until: locked_until.map(str::to_string),
                });
            });
        let affected_consumers = matrix.affected_consumers(touched);

        let severity = channel_changes
            .values()
            .map(|c| c.severity)
            .chain(breaking_changes.iter().map(|b| b.severity))
            .chain(production_conflicts.iter().map(|p| p.severity))
            .fold(Severity::Low, Severity::max);

        let summary = CompatibilitySummary {
            total_channels_changed: channel_changes.len(),
            breaking_changes_count: breaking_changes.len(),
            production_conflicts_count: production_conflicts.len(),
            severity,
        };
        tracing::info!(
            channels = summary.total_channels_changed,
            breaking = summary.breaking_changes_count,
            conflicts = summary.production_conflicts_count,
            severity = %summary.severity,
            "compatibility check finished"
        );

        Ok(CompatibilityReport {
            timestamp: now,
            base_ref: base_ref.to_string(),
            head_ref: head_ref.to_string(),
            changed_files,
            channel_changes,
            breaking_changes,
            production_conflicts,
            affected_consumers,
            warnings,
            summary,
        })
    }

    fn analyze_channel(
        &self,
        channel: &str,
        files: &[&str],
        base_ref: &str,
        head_ref: &str,
        warnings: &mut Vec<CompatWarning>,
    ) -> Result<ChannelChange> {
        let mut additions = Vec::new();
        let mut modifications = Vec::new();
        let mut removals = Vec::new();
        let mut breaking_changes = Vec::new();

        for file in files {
            let base = self.source.file_at(file, base_ref)?;
            let head = self.source.file_at(file, head_ref)?;
            match (base, head) {
                (None, Some(_)) => additions.push(file.to_string()),
                (Some(_), None) => removals.push(file.to_string()),
                (None, None) => {}
                (Some(base), Some(head)) => {
                    modifications.push(file.to_string());
                    let base = parse_revision(channel, file, &base, warnings);
                    let head = parse_revision(channel, file, &head, warnings);
                    if let (Some(base), Some(head)) = (base, head) {
                        breaking_changes.extend(detect_breaking_changes(channel, file, &base, &head));
                    }
                }
            }
        }

        let (kind, severity) = if modifications.is_empty() && removals.is_empty() {
            (ChangeKind::NewChannel, Severity::Low)
        } else {
            let worst = breaking_changes
                .iter()
                .map(|b: &BreakingChange| b.severity)
                .fold(Severity::Medium, Severity::max);
            (ChangeKind::Modification, worst)
        };

        Ok(ChannelChange {
            kind,
            severity,
            additions,
            modifications,
            removals,
            breaking_changes,
        })
    }
}

/// `channels/<channel>/spec-*.yaml` (or `.yml`) -> `<channel>`
fn spec_channel(path: &str) -> Option<&str> {
    let mut parts = path.split('/');
    let (Some("channels"), Some(channel), Some(file), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let is_spec =
        file.starts_with("spec-") && (file.ends_with(".yaml") || file.ends_with(".yml"));
    (is_spec && !channel.is_empty()).then_some(channel)
}

fn parse_revision(
    channel: &str,
    file: &str,
    content: &str,
    warnings: &mut Vec<CompatWarning>,
) -> Option<Value> {
    match serde_yaml::from_str::<Value>(content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(channel, file, error = %e, "unparseable spec revision");
            warnings.push(CompatWarning::UnparseableRevision {
                channel: channel.to_string(),
                file: file.to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const RADAR: &str = "channels/radar/spec-1.0.0.yaml";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn spec(version: &str, schema: &str) -> String {
        format!("meta:\n  channel: radar\n  version: {version}\nschema:\n{schema}")
    }

    fn revisions() -> InMemoryRevisions {
        let mut revs = InMemoryRevisions::new();
        revs.insert(
            "base",
            RADAR,
            spec("1.0.0", "  a:\n    b:\n      c: int\n  data_format:\n    type: png\n"),
        )
        .insert("base", "README.md", "old")
        .insert(
            "head",
            RADAR,
            spec("1.1.0", "  a:\n    b: {}\n  data_format:\n    type: png\n"),
        )
        .insert("head", "README.md", "new")
        .insert("head", "channels/lidar/spec-1.0.0.yaml", spec("1.0.0", "  x: 1\n"));
        revs
    }

    #[test]
    fn test_spec_channel_filter() {
        assert_eq!(spec_channel(RADAR), Some("radar"));
        assert_eq!(spec_channel("channels/radar/spec-1.0.0.yml"), Some("radar"));
        assert_eq!(spec_channel("channels/radar/release-1.0.0.yaml"), None);
        assert_eq!(spec_channel("channels/radar/docs/spec-1.yaml"), None);
        assert_eq!(spec_channel("README.md"), None);
    }

    #[test]
    fn test_field_removal_is_critical() {
        let revs = revisions();
        let report = CompatibilityChecker::new(&revs)
            .check_at("base", "head", &ConsumerMatrix::default(), now())
            .unwrap();

        assert_eq!(report.summary.total_channels_changed, 2);
        assert_eq!(report.breaking_changes.len(), 1);
        let removal = &report.breaking_changes[0];
        assert_eq!(removal.kind, BreakingKind::FieldRemoval);
        assert_eq!(removal.severity, Severity::Critical);
        assert_eq!(removal.channel, "radar");
        assert_eq!(report.summary.severity, Severity::Critical);
        assert!(report.has_blocking_findings());

        let radar = &report.channel_changes["radar"];
        assert_eq!(radar.kind, ChangeKind::Modification);
        assert_eq!(radar.severity, Severity::Critical);
        assert_eq!(radar.modifications, vec![RADAR]);

        let lidar = &report.channel_changes["lidar"];
        assert_eq!(lidar.kind, ChangeKind::NewChannel);
        assert_eq!(lidar.severity, Severity::Low);
    }

    #[test]
    fn test_active_lock_conflicts_without_breaking_change() {
        let mut revs = InMemoryRevisions::new();
        revs.insert("base", RADAR, spec("1.0.0", "  a: 1\n"))
            .insert("head", RADAR, spec("1.0.1", "  a: 1\n  b: 2\n"));
        let matrix = ConsumerMatrix::from_yaml_str(
            "production_locks:\n  planner:\n    radar: 1.0.0\n    locked_until: 2026-12-31\n\
             consumers:\n  planner:\n    critical_channels: [radar]\n",
        )
        .unwrap();

        let report = CompatibilityChecker::new(&revs)
            .check_at("base", "head", &matrix, now())
            .unwrap();

        assert!(report.breaking_changes.is_empty());
        assert_eq!(report.production_conflicts.len(), 1);
        assert_eq!(report.production_conflicts[0].consumer, "planner");
        assert_eq!(report.affected_consumers, vec!["planner"]);
        assert_eq!(report.channel_changes["radar"].severity, Severity::Medium);
        assert_eq!(report.summary.severity, Severity::Critical);
        assert!(report.has_blocking_findings());
    }

    #[test]
    fn test_expired_lock_is_ignored() {
        let mut revs = InMemoryRevisions::new();
        revs.insert("base", RADAR, spec("1.0.0", "  a: 1\n"))
            .insert("head", RADAR, spec("1.0.1", "  a: 1\n"));
        let matrix = ConsumerMatrix::from_yaml_str(
            "production_locks:\n  planner:\n    radar: 1.0.0\n    locked_until: 2026-01-01\n",
        )
        .unwrap();

        let report = CompatibilityChecker::new(&revs)
            .check_at("base", "head", &matrix, now())
            .unwrap();
        assert!(report.production_conflicts.is_empty());
        assert_eq!(report.summary.severity, Severity::Medium);
        assert!(!report.has_blocking_findings());
    }

    #[test]
    fn test_unparseable_revision_degrades_to_warning() {
        let mut revs = revisions();
        revs.insert("head", RADAR, "meta: [unclosed\n");
        let report = CompatibilityChecker::new(&revs)
            .check_at("base", "head", &ConsumerMatrix::default(), now())
            .unwrap();

        assert!(report.breaking_changes.is_empty());
        assert_eq!(report.channel_changes.len(), 2);
        assert!(matches!(
            &report.warnings[..],
            [CompatWarning::UnparseableRevision { channel, .. }] if channel == "radar"
        ));
    }

    #[test]
    fn test_removed_spec_file_and_unreadable_lock() {
        let mut revs = InMemoryRevisions::new();
        revs.insert("base", RADAR, spec("1.0.0", "  a: 1\n"))
            .add_revision("head");
        let matrix = ConsumerMatrix::from_yaml_str(
            "production_locks:\n  planner:\n    radar: 1.0.0\n    locked_until: someday\n",
        )
        .unwrap();

        let report = CompatibilityChecker::new(&revs)
            .check_at("base", "head", &matrix, now())
            .unwrap();
        let radar = &report.channel_changes["radar"];
        assert_eq!(radar.kind, ChangeKind::Modification);
        assert_eq!(radar.removals, vec![RADAR]);
        assert!(report.production_conflicts.is_empty());
        assert_eq!(
            report.warnings,
            vec![CompatWarning::UnreadableLockDeadline {
                consumer: "planner".to_string(),
                locked_until: Some("someday".to_string()),
            }]
        );
    }

    #[test]
    fn test_report_serializes_summary() {
        let revs = revisions();
        let report = CompatibilityChecker::new(&revs)
            .check_at("base", "head", &ConsumerMatrix::default(), now())
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["severity"], "critical");
        assert_eq!(json["breaking_changes"][0]["type"], "field_removal");
        assert_eq!(json["channel_changes"]["lidar"]["type"], "new_channel");
    }
}
