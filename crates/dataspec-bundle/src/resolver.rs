//! Per-channel constraint resolution against a release catalog
//!
//! Every channel is resolved on its own: there is no dependency graph
//! between channels and no backtracking. The tie-break is always the
//! highest satisfying version.

use crate::catalog::ReleaseCatalog;
use crate::{BundleError, Result};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod conflict;
mod constraint;
mod version_solver;

pub use conflict::{Conflict, ConflictDetector};
pub use constraint::Constraint;
pub use version_solver::{max_satisfying, VersionSolver};

/// Resolves constraints, listing each channel's versions at most once
pub struct Resolver<'a> {
    catalog: &'a dyn ReleaseCatalog,
    solver: VersionSolver,
    locked_at: DateTime<Utc>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn ReleaseCatalog) -> Self {
        Self {
            catalog,
            solver: VersionSolver::new(),
            locked_at: Utc::now(),
        }
    }

    /// Stamp every entry of this run with `locked_at`
    pub fn at(mut self, locked_at: DateTime<Utc>) -> Self {
        self.locked_at = locked_at;
        self
    }

    /// Resolve `constraint` for `channel` (already canonicalized).
    ///
    /// A channel with no releases, or no satisfying release, is
    /// `Unresolved`; only an unknown channel or a malformed constraint is
    /// an error.
    pub fn resolve(&mut self, channel: &str, constraint: &str) -> Result<Resolution> {
        let parsed = Constraint::parse(constraint)?;
        self.load_channel(channel)?;

        let resolution = match self.solver.max_satisfying_version(channel, &parsed) {
            Some(version) => Resolution::Resolved(ResolvedEntry {
                channel: channel.to_string(),
                version,
                source_constraint: constraint.to_string(),
                locked_at: self.locked_at,
            }),
            None => Resolution::Unresolved(UnresolvedRequirement {
                channel: channel.to_string(),
                constraint: constraint.to_string(),
            }),
        };
        tracing::debug!(channel, constraint, resolved = %resolution, "resolved constraint");
        Ok(resolution)
    }

    /// Highest release of `channel`, if any
    pub fn latest(&mut self, channel: &str) -> Result<Option<ResolvedEntry>> {
        self.load_channel(channel)?;
        Ok(self.solver.latest(channel).map(|version| ResolvedEntry {
            channel: channel.to_string(),
            version,
            source_constraint: "*".to_string(),
            locked_at: self.locked_at,
        }))
    }

    fn load_channel(&mut self, channel: &str) -> Result<()> {
        if !self.solver.has_channel(channel) {
            let versions = self.catalog.list_versions(channel)?;
            self.solver.add_channel_versions(channel, versions);
        }
        Ok(())
    }
}

/// Outcome of resolving one requirement
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedEntry),
    Unresolved(UnresolvedRequirement),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            Resolution::Resolved(entry) => Some(&entry.version),
            Resolution::Unresolved(_) => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Resolved(entry) => write!(f, "{}", entry.version),
            Resolution::Unresolved(_) => f.write_str("unresolved"),
        }
    }
}

/// Exact version chosen for one requirement
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub channel: String,
    pub version: Version,
    pub source_constraint: String,
    pub locked_at: DateTime<Utc>,
}

/// A requirement no release satisfies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRequirement {
    pub channel: String,
    pub constraint: String,
}

impl fmt::Display for UnresolvedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no release of '{}' satisfies '{}'",
            self.channel, self.constraint
        )
    }
}

impl From<UnresolvedRequirement> for BundleError {
    fn from(failure: UnresolvedRequirement) -> Self {
        BundleError::ResolutionFailed {
            failures: vec![failure],
        }
    }
}
