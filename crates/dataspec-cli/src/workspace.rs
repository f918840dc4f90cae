//! Workspace context shared by all commands
//!
//! Wraps the loaded dataspec.toml and builds the library components it
//! configures (catalog backend, alias taxonomy, family policy).

use anyhow::{Context, Result};
use dataspec_bundle::{
    ChannelAliases, ConflictDetector, FsCatalog, IndexCatalog, ReleaseCatalog,
    SeparatorFamilyPolicy,
};
use dataspec_config::{CatalogBackend, Config, ConfigLoader};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Workspace {
    pub config: Config,
}

impl Workspace {
    /// Load configuration from `root`, or by walking up from the current directory
    pub fn load(root: Option<&Path>) -> Result<Self> {
        let start = match root {
            Some(root) => root.to_path_buf(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let config = ConfigLoader::new()
            .load_from_directory(&start)
            .with_context(|| format!("Failed to load configuration from {}", start.display()))?;
        tracing::debug!(
            root = %config.root.display(),
            config_file = ?config.config_file,
            backend = %config.project.catalog.backend,
            "workspace loaded"
        );
        Ok(Self { config })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// The configured release catalog
    pub fn catalog(&self) -> Result<Box<dyn ReleaseCatalog>> {
        match self.config.project.catalog.backend {
            CatalogBackend::Fs => Ok(Box::new(FsCatalog::new(self.config.channels_dir()))),
            CatalogBackend::Index => {
                let path = self
                    .config
                    .index_file()
                    .context("catalog.index must be set for the index backend")?;
                let catalog = IndexCatalog::from_file(&path)
                    .with_context(|| format!("Failed to load catalog index: {}", path.display()))?;
                Ok(Box::new(catalog))
            }
        }
    }

    pub fn channel_aliases(&self) -> Result<ChannelAliases> {
        let path = self.config.taxonomy_file();
        ChannelAliases::from_taxonomy_file(&path)
            .with_context(|| format!("Failed to load channel taxonomy: {}", path.display()))
    }

    pub fn conflict_detector(&self) -> ConflictDetector {
        ConflictDetector::with_policy(SeparatorFamilyPolicy::new(
            self.config.project.naming.family_separator,
        ))
    }

    /// A consumer argument is either a path to a file or a name under the
    /// consumers directory (`<name>.yaml`, `<name>.yml` or `<name>/latest.yaml`)
    pub fn consumer_path(&self, spec: &str) -> PathBuf {
        let direct = PathBuf::from(spec);
        if direct.is_file() {
            return direct;
        }
        let dir = self.config.consumers_dir();
        let candidates = [
            dir.join(format!("{}.yaml", spec)),
            dir.join(format!("{}.yml", spec)),
            dir.join(spec).join("latest.yaml"),
        ];
        candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .cloned()
            .unwrap_or(direct)
    }

    /// `path` relative to the workspace root when it lies inside it
    pub fn relative(&self, path: &Path) -> String {
        let root = fs::canonicalize(self.root()).unwrap_or_else(|_| self.root().to_path_buf());
        let full = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        match full.strip_prefix(&root) {
            Ok(relative) => relative.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}
