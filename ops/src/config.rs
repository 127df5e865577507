//! Configuration for stageops

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Project-local config file name
pub const CONFIG_FILE: &str = "ops.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// SQLite database file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub load: LoadConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,

    #[serde(default)]
    pub datasets: DatasetsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransformConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_batch_size")]
    pub reject_batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadConfig {
    #[serde(default = "default_load_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationsConfig {
    /// Directory of `NNN_name.sql` scripts
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetsConfig {
    /// Register the datasets compiled into the binary
    #[serde(default = "default_use_builtin")]
    pub use_builtin: bool,

    /// Directories of dataset definitions, loaded after the builtins
    #[serde(default = "default_dataset_paths")]
    pub paths: Vec<PathBuf>,
}

fn default_database() -> PathBuf {
    PathBuf::from("ops.db")
}

fn default_batch_size() -> usize {
    datagate::DEFAULT_BATCH_SIZE
}

fn default_load_batch_size() -> usize {
    2000
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_use_builtin() -> bool {
    true
}

fn default_dataset_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".stageops/datasets")]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            log_level: None,
            transform: TransformConfig::default(),
            load: LoadConfig::default(),
            migrations: MigrationsConfig::default(),
            datasets: DatasetsConfig::default(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            reject_batch_size: default_batch_size(),
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_load_batch_size(),
        }
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
        }
    }
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            use_builtin: default_use_builtin(),
            paths: default_dataset_paths(),
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

impl Config {
    /// Load config with fallback chain: explicit path, `./ops.yml`,
    /// `<config_dir>/stageops/ops.yml`, then defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!(?config_path, "Config::load: explicit path");
            return Self::load_from_file(config_path)
                .context(format!("Failed to load config from {}", config_path.display()));
        }

        let default_paths = [
            Some(PathBuf::from(CONFIG_FILE)),
            dirs::config_dir().map(|p| p.join("stageops").join(CONFIG_FILE)),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                debug!(?path, "Config::load: found config");
                return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
            }
        }

        debug!("Config::load: no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Log level from config without failing on a broken file
    ///
    /// Logging is set up before the full config load, so errors here are
    /// swallowed and reported by [`Config::load`] instead.
    pub fn load_log_level(path: Option<&PathBuf>) -> Option<String> {
        Self::load(path).ok().and_then(|c| c.log_level)
    }

    /// Override the database path (from `--database`)
    pub fn with_database(mut self, database: Option<PathBuf>) -> Self {
        if let Some(db) = database {
            self.database = db;
        }
        self
    }

    /// Dataset directories with `~` expanded
    pub fn dataset_dirs(&self) -> Vec<PathBuf> {
        self.datasets.paths.iter().map(|p| expand_home(p)).collect()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
