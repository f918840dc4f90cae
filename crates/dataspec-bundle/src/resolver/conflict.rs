//! Channel family conflict detection

use crate::aliases::{FamilyPolicy, SeparatorFamilyPolicy};
use crate::catalog::ReleaseCatalog;
use crate::severity::Severity;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Several members of one channel family selected without declared coexistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub family: String,
    /// Selected members of the family, channel -> version
    pub channels: BTreeMap<String, String>,
    pub severity: Severity,
    pub message: String,
}

impl Conflict {
    pub fn new(family: impl Into<String>, channels: BTreeMap<String, String>) -> Self {
        let family = family.into();
        Self {
            message: format!("Multiple versions of {} are not compatible", family),
            family,
            channels,
            severity: Severity::High,
        }
    }

    /// Generate human-readable conflict report
    pub fn report(&self) -> String {
        let mut report = format!("{} (severity: {})\n", self.message, self.severity);
        for (channel, version) in &self.channels {
            report.push_str(&format!("  {}@{}\n", channel, version));
        }
        report.push_str("  declare `coexistence` in a release file to allow this selection\n");
        report
    }
}

/// Groups resolved channels by family and flags undeclared coexistence
///
/// Purely structural: it looks at declared intent to coexist, never at
/// whether the two schemas are actually compatible.
pub struct ConflictDetector {
    policy: Box<dyn FamilyPolicy>,
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self::with_policy(SeparatorFamilyPolicy::default())
    }

    pub fn with_policy(policy: impl FamilyPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
        }
    }

    /// Detect conflicts in one bundle's resolved map
    pub fn detect(
        &self,
        resolved: &BTreeMap<String, Version>,
        catalog: &dyn ReleaseCatalog,
    ) -> Vec<Conflict> {
        let mut families: BTreeMap<&str, Vec<(&str, &Version)>> = BTreeMap::new();
        for (channel, version) in resolved {
            families
                .entry(self.policy.family(channel))
                .or_default()
                .push((channel.as_str(), version));
        }

        families
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .filter(|(_, members)| !declares_coexistence(members, catalog))
            .map(|(family, members)| {
                tracing::warn!(family, members = members.len(), "channel family conflict");
                let channels = members
                    .iter()
                    .map(|(channel, version)| (channel.to_string(), version.to_string()))
                    .collect();
                Conflict::new(family, channels)
            })
            .collect()
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// A marker on any one selected member is enough
fn declares_coexistence(members: &[(&str, &Version)], catalog: &dyn ReleaseCatalog) -> bool {
    members.iter().any(|(channel, version)| {
        match catalog.get_release(channel, version) {
            Ok(release) => release.supports_coexistence(),
            Err(e) => {
                tracing::debug!(channel, %version, error = %e, "release unavailable for coexistence check");
                false
            }
        }
    })
}
