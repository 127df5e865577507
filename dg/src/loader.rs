//! Dataset loader
//!
//! Collects dataset definitions from builtin YAML and from directories of
//! `*.yml` / `*.yaml` files. Later sources override earlier ones by name, so a
//! project directory can replace a builtin dataset.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::definition::DatasetDef;
use crate::error::{GateError, Result};
use crate::spec::DatasetSpec;

/// Registry of dataset specs by name
#[derive(Debug, Default)]
pub struct DatasetLoader {
    specs: BTreeMap<String, DatasetSpec>,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one definition from YAML text; `origin` is only used in errors
    pub fn add_yaml(&mut self, content: &str, origin: &str) -> Result<&DatasetSpec> {
        debug!(origin, "DatasetLoader::add_yaml: called");
        let def = DatasetDef::from_yaml(content)
            .map_err(|e| GateError::InvalidDefinition(format!("{}: {}", origin, e)))?;
        let spec = def.into_spec()?;
        Ok(self.insert(spec))
    }

    /// Register a spec built in code
    pub fn insert(&mut self, spec: DatasetSpec) -> &DatasetSpec {
        let name = spec.name.clone();
        if self.specs.contains_key(&name) {
            debug!(%name, "DatasetLoader::insert: overriding earlier definition");
        }
        self.specs.insert(name.clone(), spec);
        &self.specs[&name]
    }

    /// Load every `*.yml` / `*.yaml` file in `dir`, in file-name order
    ///
    /// A missing directory is not an error.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        debug!(?dir, "DatasetLoader::load_dir: called");
        if !dir.is_dir() {
            debug!(?dir, "DatasetLoader::load_dir: not a directory, skipping");
            return Ok(0);
        }

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"))
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let content = fs::read_to_string(&path)?;
            let spec = self.add_yaml(&content, &path.display().to_string())?;
            info!(name = %spec.name, ?path, "Loaded dataset definition");
            loaded += 1;
        }
        if loaded == 0 {
            warn!(?dir, "No dataset definitions found");
        }
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> Result<&DatasetSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| GateError::UnknownDataset(name.to_string()))
    }

    /// Dataset names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.specs.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> impl Iterator<Item = &DatasetSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
