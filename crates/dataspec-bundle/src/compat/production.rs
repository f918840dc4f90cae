//! Consumer matrix: production locks and critical channels

use crate::severity::Severity;
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// The consumer compatibility matrix (YAML)
///
/// ```yaml
/// production_locks:
///   planner:
///     image_original: 1.2.0
///     locked_until: 2026-12-31T00:00:00Z
/// consumers:
///   planner:
///     critical_channels: [image_original]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerMatrix {
    #[serde(default)]
    pub production_locks: BTreeMap<String, ProductionLock>,
    #[serde(default)]
    pub consumers: BTreeMap<String, ConsumerProfile>,
}

/// Channels pinned for one consumer until a deadline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionLock {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::spec::scalar_as_string"
    )]
    pub locked_until: Option<String>,
    /// channel -> pinned version
    #[serde(flatten)]
    pub channels: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerProfile {
    #[serde(default)]
    pub critical_channels: Vec<String>,
}

/// A change to a channel that an active production lock pins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionConflict {
    pub consumer: String,
    pub channel: String,
    pub locked_version: String,
    pub locked_until: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

/// Whether a lock applies at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Active(DateTime<Utc>),
    Expired,
    /// `locked_until` is absent or not a recognizable timestamp
    Unreadable,
}

impl ConsumerMatrix {
    pub fn from_file(path: &Path) -> Result<Self> {
        let matrix: Option<Self> = crate::read_yaml(path)?;
        Ok(matrix.unwrap_or_default())
    }

    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let matrix: Option<Self> = serde_yaml::from_str(content)?;
        Ok(matrix.unwrap_or_default())
    }

    /// Conflicts between `changed` channels and locks active at `now`.
    /// Locks with an unreadable deadline are reported through `on_unreadable`
    /// and treated as inactive.
    pub fn production_conflicts<'c>(
        &self,
        changed: impl IntoIterator<Item = &'c str> + Clone,
        now: DateTime<Utc>,
        mut on_unreadable: impl FnMut(&str, Option<&str>),
    ) -> Vec<ProductionConflict> {
        let mut conflicts = Vec::new();
        for (consumer, lock) in &self.production_locks {
            let until = match lock.state(now) {
                LockState::Active(until) => until,
                LockState::Expired => continue,
                LockState::Unreadable => {
                    on_unreadable(consumer.as_str(), lock.locked_until.as_deref());
                    continue;
                }
            };
            for channel in changed.clone() {
                let Some(version) = lock.pinned_version(channel) else {
                    continue;
                };
                conflicts.push(ProductionConflict {
                    consumer: consumer.clone(),
                    channel: channel.to_string(),
                    message: format!(
                        "Channel {} is locked for {} until {}",
                        channel,
                        consumer,
                        until.to_rfc3339()
                    ),
                    locked_version: version,
                    locked_until: until,
                    severity: Severity::Critical,
                });
            }
        }
        conflicts
    }

    /// Consumers whose critical channels intersect `changed`, sorted
    pub fn affected_consumers<'c>(&self, changed: impl IntoIterator<Item = &'c str>) -> Vec<String> {
        let changed: BTreeSet<&str> = changed.into_iter().collect();
        self.consumers
            .iter()
            .filter(|(_, profile)| {
                profile
                    .critical_channels
                    .iter()
                    .any(|c| changed.contains(c.as_str()))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl ProductionLock {
    pub fn state(&self, now: DateTime<Utc>) -> LockState {
        match self.locked_until.as_deref().and_then(parse_deadline) {
            Some(until) if now < until => LockState::Active(until),
            Some(_) => LockState::Expired,
            None => LockState::Unreadable,
        }
    }

    pub fn pinned_version(&self, channel: &str) -> Option<String> {
        match self.channels.get(channel)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// RFC 3339, or a naive date-time or date taken as UTC
pub fn parse_deadline(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    const MATRIX: &str = r#"
production_locks:
  planner:
    image_original: 1.2.0
    occupancy: "1.0.0"
    locked_until: 2026-12-31
  perception:
    image_original: 1.1.0
    locked_until: 2026-01-01T00:00:00Z
  mapping:
    radar: 2.0.0
    locked_until: next quarter
consumers:
  planner:
    critical_channels: [image_original, occupancy]
  perception:
    critical_channels: [radar]
  viz:
    critical_channels: []
"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case("2026-12-31T00:00:00Z", Some((2026, 12, 31, 0)))]
    #[case("2026-12-31T08:00:00+08:00", Some((2026, 12, 31, 0)))]
    #[case("2026-12-31T05:00:00", Some((2026, 12, 31, 5)))]
    #[case("2026-12-31 05:00:00", Some((2026, 12, 31, 5)))]
    #[case("2026-12-31", Some((2026, 12, 31, 0)))]
    #[case("soon", None)]
    fn test_parse_deadline(#[case] text: &str, #[case] expected: Option<(i32, u32, u32, u32)>) {
        let expected = expected.map(|(y, m, d, h)| Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap());
        assert_eq!(parse_deadline(text), expected);
    }

    #[test]
    fn test_lock_states() {
        let matrix = ConsumerMatrix::from_yaml_str(MATRIX).unwrap();
        assert!(matches!(
            matrix.production_locks["planner"].state(now()),
            LockState::Active(_)
        ));
        assert_eq!(
            matrix.production_locks["perception"].state(now()),
            LockState::Expired
        );
        assert_eq!(
            matrix.production_locks["mapping"].state(now()),
            LockState::Unreadable
        );
    }

    #[test]
    fn test_active_lock_conflicts_on_any_change() {
        let matrix = ConsumerMatrix::from_yaml_str(MATRIX).unwrap();
        let mut unreadable = Vec::new();
        let conflicts = matrix.production_conflicts(
            ["image_original", "radar"],
            now(),
            |consumer, _| unreadable.push(consumer.to_string()),
        );

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].consumer, "planner");
        assert_eq!(conflicts[0].channel, "image_original");
        assert_eq!(conflicts[0].locked_version, "1.2.0");
        assert_eq!(conflicts[0].severity, Severity::Critical);
        assert_eq!(unreadable, vec!["mapping"]);
    }

    #[test]
    fn test_affected_consumers() {
        let matrix = ConsumerMatrix::from_yaml_str(MATRIX).unwrap();
        assert_eq!(
            matrix.affected_consumers(["radar", "occupancy"]),
            vec!["perception", "planner"]
        );
        assert!(matrix.affected_consumers(["lidar"]).is_empty());
    }

    #[test]
    fn test_empty_matrix() {
        let matrix = ConsumerMatrix::from_yaml_str("").unwrap();
        assert!(matrix.production_locks.is_empty());
        assert!(matrix.consumers.is_empty());
    }
}
