//! Configuration loader
//!
//! Finds dataspec.toml by walking up the directory tree and applies
//! environment overrides on top of it.

use crate::project::{parse_flag, ProjectConfig};
use crate::ConfigResult;
use std::env;
use std::path::{Path, PathBuf};

/// Name of the workspace configuration file
pub const CONFIG_FILE_NAME: &str = "dataspec.toml";

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Built-in defaults
/// 2. dataspec.toml
/// 3. Environment variables (DATASPEC_*)
/// 4. CLI flags (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip DATASPEC_* overrides
    ignore_env: bool,
}

/// Loaded configuration anchored at a workspace root
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,

    /// Directory holding dataspec.toml, or the start directory when none was found
    pub root: PathBuf,

    /// The dataspec.toml that was read, if any
    pub config_file: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader that ignores environment overrides
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find dataspec.toml. Without one, the
    /// defaults apply and `start_dir` is the root.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (root, config_file, project) = match self.find_project_config(start_dir)? {
            Some((root, path, project)) => (root, Some(path), project),
            None => (start_dir.to_path_buf(), None, ProjectConfig::default()),
        };
        let project = self.apply_env_overrides(project)?;

        Ok(Config {
            project,
            root,
            config_file,
        })
    }

    /// Load configuration from a specific file; its directory is the root
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project = self.apply_env_overrides(project)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Config {
            project,
            root,
            config_file: Some(config_path.to_path_buf()),
        })
    }

    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<Option<(PathBuf, PathBuf, ProjectConfig)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let project = ProjectConfig::load_from_file(&config_path)?;
                return Ok(Some((current, config_path, project)));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok(None),
            }
        }
    }

    /// Environment variables follow the pattern DATASPEC_<SECTION>_<KEY>
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(backend) = env::var("DATASPEC_CATALOG_BACKEND") {
            config.catalog.backend = backend.parse()?;
        }

        if let Ok(index) = env::var("DATASPEC_CATALOG_INDEX") {
            config.catalog.index = Some(PathBuf::from(index));
        }

        if let Ok(level) = env::var("DATASPEC_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(json) = env::var("DATASPEC_LOG_JSON") {
            config.logging.json = parse_flag(&json);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Defaults rooted at `root`, without reading any file
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            project: ProjectConfig::default(),
            root: root.into(),
            config_file: None,
        }
    }

    /// Whether a dataspec.toml was found
    pub fn is_workspace(&self) -> bool {
        self.config_file.is_some()
    }

    /// Resolve a configured path against the root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn channels_dir(&self) -> PathBuf {
        self.resolve(&self.project.workspace.channels)
    }

    pub fn consumers_dir(&self) -> PathBuf {
        self.resolve(&self.project.workspace.consumers)
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.resolve(&self.project.workspace.bundles)
    }

    pub fn taxonomy_file(&self) -> PathBuf {
        self.resolve(&self.project.workspace.taxonomy)
    }

    pub fn aliases_file(&self) -> PathBuf {
        self.resolve(&self.project.workspace.aliases)
    }

    pub fn matrix_file(&self) -> PathBuf {
        self.resolve(&self.project.workspace.matrix)
    }

    /// Index document for the index-backed catalog, resolved against the root
    pub fn index_file(&self) -> Option<PathBuf> {
        self.project.catalog.index.as_deref().map(|p| self.resolve(p))
    }
}
