//! Sources of package facts

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use serde::Deserialize;
use walkdir::WalkDir;

use super::facts::PackageFacts;
use crate::error::{ConcretizeError, Result};

/// Read-only access to package metadata.
///
/// Implementations must answer consistently for the duration of a solve and
/// be safe to share between threads.
pub trait FactProvider: Send + Sync {
    /// Facts for a concrete package, `None` for unknown names and virtuals
    fn facts_for(&self, name: &str) -> Option<Arc<PackageFacts>>;

    /// Packages providing a virtual, sorted by name
    fn providers_for(&self, virtual_name: &str) -> Vec<Arc<PackageFacts>>;

    /// Whether `name` is only known as something other packages provide
    fn is_virtual(&self, name: &str) -> bool {
        self.facts_for(name).is_none() && !self.providers_for(name).is_empty()
    }
}

/// A JSON file holds either one package or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum FactsDocument {
    Many(Vec<PackageFacts>),
    One(Box<PackageFacts>),
}

/// In-memory package repository
#[derive(Debug, Default, Clone)]
pub struct Repository {
    packages: BTreeMap<String, Arc<PackageFacts>>,
    /// virtual name -> provider names
    providers: BTreeMap<String, BTreeSet<String>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a package
    pub fn add(&mut self, facts: PackageFacts) {
        if let Some(previous) = self.packages.get(&facts.name) {
            debug!("Replacing facts for {}", previous.name);
            for provided in &previous.provides {
                if let Some(names) = self.providers.get_mut(&provided.virtual_name) {
                    names.remove(&previous.name);
                }
            }
        }
        for provided in &facts.provides {
            self.providers
                .entry(provided.virtual_name.clone())
                .or_default()
                .insert(facts.name.clone());
        }
        self.packages.insert(facts.name.clone(), Arc::new(facts));
    }

    pub fn with(mut self, facts: PackageFacts) -> Self {
        self.add(facts);
        self
    }

    /// Load packages from a JSON document (one package or an array)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut repo = Self::new();
        repo.load_json_str(json)?;
        Ok(repo)
    }

    pub fn load_json_str(&mut self, json: &str) -> Result<usize> {
        let document: FactsDocument = serde_json::from_str(json)?;
        let packages = match document {
            FactsDocument::Many(packages) => packages,
            FactsDocument::One(package) => vec![*package],
        };
        let count = packages.len();
        for facts in packages {
            self.add(facts);
        }
        Ok(count)
    }

    /// Load packages from a JSON file
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        self.load_json_str(&contents).map_err(|e| match e {
            ConcretizeError::Json(err) => {
                ConcretizeError::Config(format!("Failed to parse {}: {}", path.display(), err))
            }
            other => other,
        })
    }

    /// Load every `*.json` file below a directory, in path order
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ConcretizeError::Config(format!(
                "Package directory {} does not exist",
                dir.display()
            )));
        }

        let mut repo = Self::new();
        let mut files: Vec<_> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();

        for path in files {
            match repo.load_file(&path) {
                Ok(count) => debug!("Loaded {} packages from {}", count, path.display()),
                Err(ConcretizeError::Config(message)) => {
                    warn!("Skipping {}", message);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}

impl FactProvider for Repository {
    fn facts_for(&self, name: &str) -> Option<Arc<PackageFacts>> {
        self.packages.get(name).cloned()
    }

    fn providers_for(&self, virtual_name: &str) -> Vec<Arc<PackageFacts>> {
        self.providers
            .get(virtual_name)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| self.packages.get(name).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
