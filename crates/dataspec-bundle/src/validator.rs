//! Independent bundle validation
//!
//! The validator reads the bundle file as an untyped document and re-derives
//! everything it checks, so a hand-edited or truncated bundle is reported
//! field by field instead of failing to deserialize.

use crate::catalog::ReleaseCatalog;
use crate::integrity::bundle_integrity_hash;
use crate::{BundleError, Result};
use semver::Version;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const REQUIRED_FIELDS: [&str; 6] = [
    "meta.bundle_name",
    "meta.bundle_version",
    "meta.bundle_type",
    "source_consumer",
    "channels",
    "integrity_hash",
];

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// Required fields absent from the document
    MissingFields { fields: Vec<String> },
    /// A channel entry lacks its name or a usable version
    InvalidChannelEntry { channel: String, reason: String },
    /// No spec artifact for a referenced release
    SpecNotFound { channel: String, version: String },
    MissingIntegrityHash,
    /// Channels were edited after the bundle was generated
    IntegrityMismatch { stored: String, calculated: String },
    /// The file is not a YAML mapping
    Unparseable { reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingFields { fields } => {
                write!(f, "Missing required fields: {}", fields.join(", "))
            }
            ValidationError::InvalidChannelEntry { channel, reason } => {
                write!(f, "Invalid channel entry '{}': {}", channel, reason)
            }
            ValidationError::SpecNotFound { channel, version } => {
                write!(f, "Spec not found for {}@{}", channel, version)
            }
            ValidationError::MissingIntegrityHash => write!(f, "Missing integrity_hash"),
            ValidationError::IntegrityMismatch { stored, calculated } => write!(
                f,
                "Integrity mismatch: stored={}, calculated={}",
                stored, calculated
            ),
            ValidationError::Unparseable { reason } => {
                write!(f, "Bundle is not a valid document: {}", reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Outcome of validating one bundle. Valid iff `errors` is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub bundle_path: PathBuf,
    pub bundle_name: Option<String>,
    pub bundle_version: Option<String>,
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    /// Check name -> passed
    pub checks: BTreeMap<String, bool>,
}

impl ValidationReport {
    fn new(bundle_path: &Path) -> Self {
        Self {
            bundle_path: bundle_path.to_path_buf(),
            bundle_name: None,
            bundle_version: None,
            valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            checks: BTreeMap::new(),
        }
    }

    fn check(&mut self, name: &str, passed: bool) {
        self.checks.insert(name.to_string(), passed);
    }

    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }

    pub fn has_integrity_mismatch(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, ValidationError::IntegrityMismatch { .. }))
    }
}

/// Bundle validator
pub struct BundleValidator<'a> {
    root: PathBuf,
    catalog: &'a dyn ReleaseCatalog,
}

impl<'a> BundleValidator<'a> {
    /// `root` anchors relative `source_consumer` references
    pub fn new(root: impl Into<PathBuf>, catalog: &'a dyn ReleaseCatalog) -> Self {
        Self {
            root: root.into(),
            catalog,
        }
    }

    /// Validate the bundle at `path`. Only an unreadable file is an `Err`.
    pub fn validate(&self, path: &Path) -> Result<ValidationReport> {
        let content = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        Ok(self.validate_str(path, &content))
    }

    pub fn validate_str(&self, path: &Path, content: &str) -> ValidationReport {
        let mut report = ValidationReport::new(path);

        let doc: Value = match serde_yaml::from_str(content) {
            Ok(doc @ Value::Mapping(_)) => doc,
            Ok(_) => {
                report.errors.push(ValidationError::Unparseable {
                    reason: "top level is not a mapping".to_string(),
                });
                return report.finish();
            }
            Err(e) => {
                report.errors.push(ValidationError::Unparseable {
                    reason: e.to_string(),
                });
                return report.finish();
            }
        };

        report.bundle_name = lookup(&doc, "meta.bundle_name").and_then(scalar_text);
        report.bundle_version = lookup(&doc, "meta.bundle_version").and_then(scalar_text);

        self.check_required_fields(&doc, &mut report);
        self.check_source_traceability(&doc, &mut report);
        let pairs = self.check_channel_versions(&doc, &mut report);
        self.check_integrity_hash(&doc, &pairs, &mut report);

        let report = report.finish();
        tracing::debug!(
            bundle = %path.display(),
            valid = report.valid,
            errors = report.errors.len(),
            "validated bundle"
        );
        report
    }

    fn check_required_fields(&self, doc: &Value, report: &mut ValidationReport) {
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|field| lookup(doc, field).map_or(true, Value::is_null))
            .map(|field| field.to_string())
            .collect();

        report.check("required_fields", missing.is_empty());
        if !missing.is_empty() {
            report
                .errors
                .push(ValidationError::MissingFields { fields: missing });
        }
    }

    /// A missing consumer file hurts traceability, not correctness
    fn check_source_traceability(&self, doc: &Value, report: &mut ValidationReport) {
        let Some(source) = doc.get("source_consumer").and_then(scalar_text) else {
            report.check("source_traceability", false);
            return;
        };

        let path = Path::new(&source);
        let exists = if path.is_absolute() {
            path.exists()
        } else {
            self.root.join(path).exists()
        };
        if !exists {
            report
                .warnings
                .push(format!("Source consumer file not found: {}", source));
        }
        report.check("source_traceability", true);
    }

    /// Checks each entry and returns the `(channel, version)` pairs it found
    fn check_channel_versions(
        &self,
        doc: &Value,
        report: &mut ValidationReport,
    ) -> Vec<(String, String)> {
        let entries = doc
            .get("channels")
            .and_then(Value::as_sequence)
            .cloned()
            .unwrap_or_default();

        let mut pairs = Vec::new();
        let mut failures = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let channel = entry.get("channel").and_then(scalar_text);
            let version = entry.get("version").and_then(scalar_text);
            let (channel, version) = match (channel, version) {
                (Some(channel), Some(version)) => (channel, version),
                (channel, _) => {
                    failures.push(ValidationError::InvalidChannelEntry {
                        channel: channel.unwrap_or_else(|| format!("#{}", index)),
                        reason: "missing channel or version".to_string(),
                    });
                    continue;
                }
            };
            pairs.push((channel.clone(), version.clone()));

            match Version::parse(&version) {
                Ok(parsed) if self.catalog.has_release(&channel, &parsed) => {}
                Ok(_) => failures.push(ValidationError::SpecNotFound { channel, version }),
                Err(e) => failures.push(ValidationError::InvalidChannelEntry {
                    channel,
                    reason: format!("version '{}' is not semver: {}", version, e),
                }),
            }
        }

        report.check("channel_versions", failures.is_empty());
        report.errors.extend(failures);
        pairs
    }

    fn check_integrity_hash(
        &self,
        doc: &Value,
        pairs: &[(String, String)],
        report: &mut ValidationReport,
    ) {
        let Some(stored) = doc.get("integrity_hash").and_then(scalar_text) else {
            report.errors.push(ValidationError::MissingIntegrityHash);
            report.check("integrity_hash", false);
            return;
        };

        let calculated =
            bundle_integrity_hash(pairs.iter().map(|(c, v)| (c.as_str(), v.as_str())));
        let matches = calculated == stored;
        if !matches {
            tracing::warn!(%stored, %calculated, "bundle integrity mismatch");
            report
                .errors
                .push(ValidationError::IntegrityMismatch { stored, calculated });
        }
        report.check("integrity_hash", matches);
    }
}

/// Follow a dotted key path through nested mappings
fn lookup<'v>(doc: &'v Value, dotted: &str) -> Option<&'v Value> {
    dotted
        .split('.')
        .try_fold(doc, |node, key| node.get(key))
}

/// Text of a scalar; YAML may read `1.0` or `20260101` as numbers
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexCatalog;
    use serde_json::json;
    use tempfile::TempDir;

    fn catalog() -> IndexCatalog {
        let mut catalog = IndexCatalog::new();
        catalog.insert("imageA", "1.2.0", json!({}), None);
        catalog.insert("occupancy", "1.0.0", json!({}), None);
        catalog
    }

    fn bundle_yaml(hash: &str, image_version: &str) -> String {
        format!(
            r#"
meta:
  bundle_name: e2e
  bundle_version: "2026.25"
  bundle_type: weekly
  created_at: 2026-06-20T14:30:22Z
source_consumer: consumers/e2e.yaml
channels:
  - channel: imageA
    version: {image_version}
    locked_at: 2026-06-20T14:30:22Z
    source_constraint: ">=1.1.0"
  - channel: occupancy
    version: 1.0.0
    locked_at: 2026-06-20T14:30:22Z
    source_constraint: "1.0.0"
compatibility:
  all_compatible: true
  conflicts: []
integrity_hash: "{hash}"
"#
        )
    }

    fn good_hash() -> String {
        bundle_integrity_hash([("imageA", "1.2.0"), ("occupancy", "1.0.0")])
    }

    #[test]
    fn test_valid_bundle() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("consumers")).unwrap();
        std::fs::write(temp.path().join("consumers/e2e.yaml"), "meta: {consumer: e2e}").unwrap();
        let catalog = catalog();
        let validator = BundleValidator::new(temp.path(), &catalog);

        let report = validator.validate_str(Path::new("b.yaml"), &bundle_yaml(&good_hash(), "1.2.0"));
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert_eq!(report.bundle_version.as_deref(), Some("2026.25"));
        assert!(report.checks.values().all(|passed| *passed));
    }

    #[test]
    fn test_edited_channels_fail_integrity() {
        let mut catalog = catalog();
        catalog.insert("imageA", "1.1.0", json!({}), None);
        let validator = BundleValidator::new("/nonexistent", &catalog);

        let report = validator.validate_str(Path::new("b.yaml"), &bundle_yaml(&good_hash(), "1.1.0"));
        assert!(!report.valid);
        assert!(report.has_integrity_mismatch());
        assert!(!report.checks["integrity_hash"]);
        // Missing consumer file is only a warning
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_missing_spec_and_fields() {
        let catalog = IndexCatalog::new();
        let validator = BundleValidator::new("/nonexistent", &catalog);
        let yaml = "meta:\n  bundle_name: x\nchannels:\n  - channel: radar\n    version: 2.0.0\n  - version: 1.0.0\n";

        let report = validator.validate_str(Path::new("b.yaml"), yaml);
        assert!(!report.valid);
        assert!(report.errors.contains(&ValidationError::MissingFields {
            fields: vec![
                "meta.bundle_version".to_string(),
                "meta.bundle_type".to_string(),
                "source_consumer".to_string(),
                "integrity_hash".to_string(),
            ]
        }));
        assert!(report.errors.contains(&ValidationError::SpecNotFound {
            channel: "radar".to_string(),
            version: "2.0.0".to_string()
        }));
        assert!(report.errors.contains(&ValidationError::InvalidChannelEntry {
            channel: "#1".to_string(),
            reason: "missing channel or version".to_string()
        }));
        assert!(report.errors.contains(&ValidationError::MissingIntegrityHash));
    }

    #[test]
    fn test_unparseable_document() {
        let catalog = IndexCatalog::new();
        let validator = BundleValidator::new(".", &catalog);
        let report = validator.validate_str(Path::new("b.yaml"), "- just\n- a list\n");
        assert!(!report.valid);
        assert!(matches!(report.errors[0], ValidationError::Unparseable { .. }));
    }

    #[test]
    fn test_validate_missing_file_is_io_error() {
        let catalog = IndexCatalog::new();
        let validator = BundleValidator::new(".", &catalog);
        assert!(matches!(
            validator.validate(Path::new("/nonexistent/bundle.yaml")),
            Err(BundleError::Io { .. })
        ));
    }
}
