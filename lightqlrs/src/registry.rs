use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glob::glob;

use crate::error::{LightqlError, Result};
use crate::explores::Explore;

/// Read-only snapshot of the explores a compiler can query.
#[derive(Debug, Default, Clone)]
pub struct ExploreRegistry {
    pub explores: HashMap<String, Explore>,
}

impl ExploreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from explores already in memory. Derived dimensions
    /// and the example metric are added the same way as when loading files.
    pub fn from_explores(explores: Vec<Explore>) -> Self {
        let mut registry = ExploreRegistry::new();
        for explore in explores {
            registry.insert(explore);
        }
        registry
    }

    pub fn insert(&mut self, explore: Explore) {
        let explore = prepare(explore);
        self.explores.insert(explore.name.clone(), explore);
    }

    /// Load every `*.yml` / `*.yaml` file in `dir`, one explore per file.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(LightqlError::Validation(format!(
                "explores directory not found: {}",
                dir.display()
            )));
        }
        let mut registry = ExploreRegistry::new();
        for pattern in ["*.yml", "*.yaml"] {
            for entry in glob(&format!("{}/{pattern}", dir.display()))
                .map_err(|e| LightqlError::Other(e.into()))?
                .flatten()
            {
                registry.load_explore_file(&entry)?;
            }
        }
        tracing::info!(
            dir = %dir.display(),
            explores = registry.explores.len(),
            "loaded explores"
        );
        Ok(registry)
    }

    fn load_explore_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let explore: Explore = serde_yaml::from_str(&contents)?;
        if self.explores.contains_key(&explore.name) {
            return Err(LightqlError::Validation(format!(
                "explore {} is defined more than once (again in {})",
                explore.name,
                path.display()
            )));
        }
        tracing::debug!(explore = %explore.name, path = %path.display(), "loaded explore file");
        self.insert(explore);
        Ok(())
    }

    pub fn get_explore(&self, name: &str) -> Option<&Explore> {
        self.explores.get(name)
    }

    /// Explore names in sorted order.
    pub fn explore_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.explores.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn prepare(explore: Explore) -> Explore {
    explore.with_time_interval_dimensions().with_example_metric()
}
