//! Dataset registry
//!
//! Builtin definitions are compiled into the binary; directories from the
//! config are loaded after them and can override a builtin by name.

use datagate::DatasetLoader;
use eyre::{Context, Result};
use tracing::debug;

use crate::config::Config;

/// Staged people rows promoted into `main.people_typed`
pub const PEOPLE: &str = include_str!("../datasets/people.yml");

/// Builtin definitions as `(name, yaml)`
pub const BUILTIN: &[(&str, &str)] = &[("people", PEOPLE)];

/// Build the registry described by `config`
pub fn load_registry(config: &Config) -> Result<DatasetLoader> {
    debug!(use_builtin = config.datasets.use_builtin, "load_registry: called");
    let mut loader = DatasetLoader::new();

    if config.datasets.use_builtin {
        for (name, yaml) in BUILTIN {
            loader
                .add_yaml(yaml, &format!("builtin:{}", name))
                .context(format!("Invalid builtin dataset {}", name))?;
        }
    }

    for dir in config.dataset_dirs() {
        loader
            .load_dir(&dir)
            .context(format!("Failed to load datasets from {}", dir.display()))?;
    }

    debug!(count = loader.len(), "load_registry: complete");
    Ok(loader)
}
