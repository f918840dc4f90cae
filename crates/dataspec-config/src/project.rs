//! Workspace configuration (dataspec.toml)
//!
//! Every section is optional; an empty file is a valid configuration.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration from dataspec.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workspace layout, relative to the root holding dataspec.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct WorkspaceConfig {
    /// Channel spec tree (default: "channels")
    pub channels: PathBuf,

    /// Consumer requirement files (default: "consumers")
    pub consumers: PathBuf,

    /// Bundle output tree (default: "bundles")
    pub bundles: PathBuf,

    /// Channel alias taxonomy (default: "taxonomy/channel_taxonomy.yaml")
    pub taxonomy: PathBuf,

    /// Consumer version aliases (default: "consumer_version_aliases.yaml")
    pub aliases: PathBuf,

    /// Consumer matrix for compatibility checks
    /// (default: "compatibility/consumer_matrix.yaml")
    pub matrix: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            channels: PathBuf::from("channels"),
            consumers: PathBuf::from("consumers"),
            bundles: PathBuf::from("bundles"),
            taxonomy: PathBuf::from("taxonomy/channel_taxonomy.yaml"),
            aliases: PathBuf::from("consumer_version_aliases.yaml"),
            matrix: PathBuf::from("compatibility/consumer_matrix.yaml"),
        }
    }
}

/// Where releases are looked up
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    /// `channels/<channel>/spec-<version>.yaml`
    #[default]
    Fs,
    /// A single JSON index document
    Index,
}

impl CatalogBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogBackend::Fs => "fs",
            CatalogBackend::Index => "index",
        }
    }
}

impl fmt::Display for CatalogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(CatalogBackend::Fs),
            "index" => Ok(CatalogBackend::Index),
            other => Err(ConfigError::InvalidValue {
                field: "catalog.backend".to_string(),
                reason: format!("unknown backend '{}' (expected fs or index)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    #[serde(default)]
    pub backend: CatalogBackend,

    /// Index document, required when `backend = "index"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<PathBuf>,
}

/// Channel family naming
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct NamingConfig {
    /// Separator ending the family prefix (`radar.v1` -> `radar`)
    pub family_separator: char,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            family_separator: '.',
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,

    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl ProjectConfig {
    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError {
                    file: path.to_path_buf(),
                    error: e,
                }
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.catalog.backend == CatalogBackend::Index && self.catalog.index.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "catalog.index".to_string(),
                reason: "required when backend is \"index\"".to_string(),
            });
        }

        if self.naming.family_separator.is_alphanumeric() {
            return Err(ConfigError::InvalidValue {
                field: "naming.family_separator".to_string(),
                reason: format!(
                    "'{}' would split channel names mid-word",
                    self.naming.family_separator
                ),
            });
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: "level cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// `true`, `1`, `yes`, `on` (any case)
pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
