//! Dataspec bundle resolution and compatibility engine
//!
//! Resolves consumer requirements against per-channel release catalogs into
//! hash-verified bundles, derives content-addressed locks from them, and
//! classifies spec changes between revisions against active production locks.

pub mod aliases;
pub mod bundle;
pub mod catalog;
pub mod compat;
pub mod consumer;
pub mod integrity;
pub mod lockfile;
pub mod resolver;
pub mod severity;
pub mod spec;
pub mod validator;

pub use aliases::{ChannelAliases, ConsumerAliases, FamilyPolicy, SeparatorFamilyPolicy};
pub use bundle::{Bundle, BundleAnalysis, BundleBuilder, BundleChannel, BundleType, BuildOutput};
pub use catalog::{FsCatalog, IndexCatalog, ReleaseCatalog};
pub use compat::{
    BreakingChange, CompatibilityChecker, CompatibilityReport, ConsumerMatrix,
    GitRevisionSource, InMemoryRevisions, ProductionConflict, RevisionSource,
};
pub use consumer::{Consumer, OnMissing, Requirement};
pub use lockfile::{Lock, LockGenerator, LockedChannel};
pub use resolver::{
    Conflict, ConflictDetector, Constraint, Resolution, ResolvedEntry, Resolver,
    UnresolvedRequirement,
};
pub use severity::Severity;
pub use spec::{ChannelSpec, LifecycleStatus, Release};
pub use validator::{BundleValidator, ValidationError, ValidationReport};

use std::path::PathBuf;

/// Bundle engine errors
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Channel not found: {channel}")]
    ChannelNotFound { channel: String },

    #[error("Release not found: {channel}@{version}")]
    ReleaseNotFound { channel: String, version: String },

    #[error("Resolution failed: {}", format_failures(.failures))]
    ResolutionFailed { failures: Vec<UnresolvedRequirement> },

    #[error("Invalid version constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    #[error("Invalid consumer {path}: {reason}")]
    InvalidConsumer { path: String, reason: String },

    #[error("Integrity mismatch: stored={stored}, calculated={calculated}")]
    IntegrityMismatch { stored: String, calculated: String },

    #[error("Failed to parse YAML in {path}: {error}")]
    Yaml {
        path: PathBuf,
        error: serde_yaml::Error,
    },

    #[error("Failed to parse JSON in {path}: {error}")]
    Json {
        path: PathBuf,
        error: serde_json::Error,
    },

    #[error("Failed to serialize: {0}")]
    Serialize(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BundleError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create a YAML parse error with path context
    pub fn yaml(path: impl Into<PathBuf>, error: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.into(),
            error,
        }
    }

    /// Create a JSON parse error with path context
    pub fn json(path: impl Into<PathBuf>, error: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            error,
        }
    }

    /// Create a channel not found error
    pub fn channel_not_found(channel: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            channel: channel.into(),
        }
    }

    /// Create a release not found error
    pub fn release_not_found(channel: impl Into<String>, version: impl ToString) -> Self {
        Self::ReleaseNotFound {
            channel: channel.into(),
            version: version.to_string(),
        }
    }
}

fn format_failures(failures: &[UnresolvedRequirement]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, BundleError>;

/// Read a YAML document from disk into `T`
pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
    serde_yaml::from_str(&content).map_err(|e| BundleError::yaml(path, e))
}

/// Write `value` as YAML, creating parent directories as needed
pub(crate) fn write_yaml<T: serde::Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| BundleError::io(parent, e))?;
        }
    }
    let content = serde_yaml::to_string(value).map_err(|e| BundleError::Serialize(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| BundleError::io(path, e))
}
