use super::Constraint;
use semver::Version;
use std::collections::HashMap;

/// Highest version in `versions` (ascending) that satisfies `constraint`
pub fn max_satisfying<'a>(constraint: &Constraint, versions: &'a [Version]) -> Option<&'a Version> {
    versions.iter().rev().find(|v| constraint.matches(v))
}

/// Per-channel version lists, each kept in ascending order
#[derive(Debug, Clone, Default)]
pub struct VersionSolver {
    available_versions: HashMap<String, Vec<Version>>,
}

impl VersionSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register available versions for a channel
    pub fn add_channel_versions(&mut self, channel: &str, mut versions: Vec<Version>) {
        versions.sort();
        versions.dedup();
        self.available_versions.insert(channel.to_string(), versions);
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.available_versions.contains_key(channel)
    }

    /// Highest satisfying version; `None` for unknown channels too
    pub fn max_satisfying_version(&self, channel: &str, constraint: &Constraint) -> Option<Version> {
        let versions = self.available_versions.get(channel)?;
        max_satisfying(constraint, versions).cloned()
    }

    pub fn latest(&self, channel: &str) -> Option<Version> {
        self.available_versions.get(channel)?.last().cloned()
    }
}
