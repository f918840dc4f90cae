//! Bundle lock files (`<bundle>.lock.json`)
//!
//! A lock pins the spec content each resolved channel pointed at when the
//! lock was generated. It is a snapshot, not live-bound: regenerating after
//! a spec artifact changed yields different `spec_hash` values.

use crate::bundle::Bundle;
use crate::catalog::ReleaseCatalog;
use crate::integrity::{prefixed_digest, sha256_hex, SHA256_PREFIX};
use crate::{BundleError, Result};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `spec_hash` recorded when a spec artifact cannot be retrieved
pub const UNKNOWN_SPEC_HASH: &str = "unknown";

/// Lock file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lock {
    pub bundle_ref: String,
    pub lock_version: String,
    pub generated_at: DateTime<Utc>,
    pub bundle: LockedBundle,
    pub channels: BTreeMap<String, LockedChannel>,
    pub integrity_hash: String,
}

/// Bundle identity covered by the lock hash
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedBundle {
    pub name: String,
    pub version: String,
    pub integrity_hash: String,
}

/// Locked channel entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedChannel {
    pub version: String,
    /// `sha256:<hex>` of the spec artifact, or `unknown`
    pub spec_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

impl Lock {
    /// Current lock format version
    pub const VERSION: &'static str = "1.0";

    /// Default lock location for a bundle file: `x.yaml` -> `x.lock.json`
    pub fn path_for(bundle_path: &Path) -> PathBuf {
        bundle_path.with_extension("lock.json")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| BundleError::json(path, e))
    }

    /// Write as pretty JSON
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let mut content =
            serde_json::to_string_pretty(self).map_err(|e| BundleError::Serialize(e.to_string()))?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| BundleError::io(path, e))
    }

    /// Hash over bundle identity and per-channel `(version, spec_hash)`.
    /// Timestamps are stored but never hashed.
    pub fn compute_integrity_hash(&self) -> String {
        let channels: BTreeMap<&str, serde_json::Value> = self
            .channels
            .iter()
            .map(|(name, locked)| {
                (
                    name.as_str(),
                    json!({"version": locked.version, "spec_hash": locked.spec_hash}),
                )
            })
            .collect();
        prefixed_digest(&json!({
            "bundle": self.bundle,
            "channels": channels,
        }))
    }

    /// Recompute the integrity hash and compare it to the stored one
    pub fn verify(&self) -> Result<()> {
        let calculated = self.compute_integrity_hash();
        if calculated != self.integrity_hash {
            return Err(BundleError::IntegrityMismatch {
                stored: self.integrity_hash.clone(),
                calculated,
            });
        }
        Ok(())
    }

    /// Channels whose spec artifact could not be hashed
    pub fn unknown_specs(&self) -> Vec<&str> {
        self.channels
            .iter()
            .filter(|(_, locked)| locked.spec_hash == UNKNOWN_SPEC_HASH)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Derives locks from bundles
pub struct LockGenerator<'a> {
    catalog: &'a dyn ReleaseCatalog,
}

impl<'a> LockGenerator<'a> {
    pub fn new(catalog: &'a dyn ReleaseCatalog) -> Self {
        Self { catalog }
    }

    pub fn generate(&self, bundle: &Bundle, bundle_ref: impl Into<String>) -> Result<Lock> {
        self.generate_at(bundle, bundle_ref, Utc::now())
    }

    /// Lock `bundle`. A missing spec artifact is recorded as `unknown`
    /// rather than failing the lock.
    pub fn generate_at(
        &self,
        bundle: &Bundle,
        bundle_ref: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Lock> {
        let mut channels = BTreeMap::new();
        for entry in &bundle.channels {
            let spec_hash = self.spec_hash(&entry.channel, &entry.version)?;
            channels.insert(
                entry.channel.clone(),
                LockedChannel {
                    version: entry.version.clone(),
                    spec_hash,
                    locked_at: Some(entry.locked_at),
                },
            );
        }

        let mut lock = Lock {
            bundle_ref: bundle_ref.into(),
            lock_version: Lock::VERSION.to_string(),
            generated_at: now,
            bundle: LockedBundle {
                name: bundle.meta.bundle_name.clone(),
                version: bundle.meta.bundle_version.clone(),
                integrity_hash: bundle.integrity_hash.clone(),
            },
            channels,
            integrity_hash: String::new(),
        };
        lock.integrity_hash = lock.compute_integrity_hash();
        tracing::info!(
            bundle = %lock.bundle_ref,
            channels = lock.channels.len(),
            hash = %lock.integrity_hash,
            "lock generated"
        );
        Ok(lock)
    }

    fn spec_hash(&self, channel: &str, version: &str) -> Result<String> {
        let Ok(parsed) = Version::parse(version) else {
            tracing::warn!(channel, version, "non-semver version, spec hash unknown");
            return Ok(UNKNOWN_SPEC_HASH.to_string());
        };
        match self.catalog.spec_content(channel, &parsed)? {
            Some(bytes) => Ok(format!("{}{}", SHA256_PREFIX, sha256_hex(&bytes))),
            None => {
                tracing::warn!(channel, version, "spec artifact missing, spec hash unknown");
                Ok(UNKNOWN_SPEC_HASH.to_string())
            }
        }
    }
}
