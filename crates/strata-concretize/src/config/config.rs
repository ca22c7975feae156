use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_version::{Version, VersionList};

use super::source::{ConfigLoader, ConfigSource, RawConfig};
use crate::error::{ConcretizeError, Result};
use crate::spec::{ArchSpec, CompilerSpec, VariantValue};

/// A package that already exists on the system and must not be built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub version: Version,
    pub path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Variant values of the installed package
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, VariantValue>,
}

impl ExternalConfig {
    pub fn new(version: Version, path: impl Into<PathBuf>) -> Self {
        Self {
            version,
            path: path.into(),
            module: None,
            variants: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, name: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.variants.insert(name.into(), value.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_targets() -> Vec<ArchSpec> {
    vec![ArchSpec::host()]
}

fn default_compiler_runtimes() -> BTreeMap<String, String> {
    BTreeMap::from([("gcc".to_string(), "gcc-runtime".to_string())])
}

fn default_encoding_cache_size() -> usize {
    16
}

/// Site configuration for a concretization.
///
/// The record is immutable once built and handed to the concretizer
/// explicitly; nothing reads configuration from global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SolverConfig {
    /// Bind nodes to reusable specs when possible
    #[serde(default = "default_true")]
    pub reuse: bool,

    /// Add a dependency on the compiler runtime package to built nodes
    #[serde(default = "default_true")]
    pub inject_compiler_runtimes: bool,

    /// Versions to prefer over the newest, per package
    #[serde(default)]
    pub prefer_versions: BTreeMap<String, VersionList>,

    /// Pre-installed packages, per package
    #[serde(default)]
    pub externally_available: BTreeMap<String, ExternalConfig>,

    /// Solve timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Available compilers, most preferred first
    #[serde(default)]
    pub compilers: Vec<CompilerSpec>,

    /// Available targets, most preferred first
    #[serde(default = "default_targets")]
    pub targets: Vec<ArchSpec>,

    /// Compiler name -> runtime package
    #[serde(default = "default_compiler_runtimes")]
    pub compiler_runtimes: BTreeMap<String, String>,

    /// Package -> variant -> preferred value, overriding the declared default
    #[serde(default)]
    pub variant_preferences: BTreeMap<String, BTreeMap<String, VariantValue>>,

    /// Virtual -> providers, most preferred first
    #[serde(default)]
    pub provider_preferences: BTreeMap<String, Vec<String>>,

    /// Packages that may only come from externals or reuse
    #[serde(default)]
    pub not_buildable: BTreeSet<String>,

    /// Number of compiled problems kept by a concretizer
    #[serde(default = "default_encoding_cache_size")]
    pub encoding_cache_size: usize,

    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            reuse: true,
            inject_compiler_runtimes: true,
            prefer_versions: BTreeMap::new(),
            externally_available: BTreeMap::new(),
            timeout: None,
            compilers: Vec::new(),
            targets: default_targets(),
            compiler_runtimes: default_compiler_runtimes(),
            variant_preferences: BTreeMap::new(),
            provider_preferences: BTreeMap::new(),
            not_buildable: BTreeSet::new(),
            encoding_cache_size: default_encoding_cache_size(),
            sources: HashMap::new(),
        }
    }
}

const CONFIG_KEYS: &[&str] = &[
    "reuse",
    "inject-compiler-runtimes",
    "prefer-versions",
    "externally-available",
    "timeout",
    "compilers",
    "targets",
    "compiler-runtimes",
    "variant-preferences",
    "provider-preferences",
    "not-buildable",
    "encoding-cache-size",
];

fn parse_value<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ConcretizeError::Config(format!("Invalid value for '{}': {}", key, e)))
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build configuration from defaults, a file and the environment.
    ///
    /// Without `explicit_path` the user file `strata.json` in the config
    /// home is read when it exists.
    pub fn build(explicit_path: Option<&Path>, use_environment: bool) -> Result<Self> {
        let loader = ConfigLoader::new(use_environment);
        let mut config = Self::default();

        for key in CONFIG_KEYS {
            config.sources.insert(key.to_string(), ConfigSource::Default);
        }

        match explicit_path {
            Some(path) => {
                let raw = loader.load_config_file(path)?;
                config.merge_raw_config(raw, ConfigSource::File(path.to_path_buf()))?;
            }
            None => {
                let raw = loader.load_user_config()?;
                config.merge_raw_config(raw, ConfigSource::User)?;
            }
        }

        if use_environment {
            config.apply_env_overrides(&loader);
        }

        debug!(
            "Solver config: reuse={}, runtimes={}, {} compilers, {} externals",
            config.reuse,
            config.inject_compiler_runtimes,
            config.compilers.len(),
            config.externally_available.len()
        );
        Ok(config)
    }

    /// Parse a JSON configuration document on top of the defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        let mut config = Self::default();
        config.merge_raw_config(raw, ConfigSource::Command)?;
        Ok(config)
    }

    /// Where a key's current value came from
    pub fn get_source(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Runtime package for a compiler, if one is configured
    pub fn compiler_runtime(&self, compiler: &str) -> Option<&str> {
        self.compiler_runtimes.get(compiler).map(String::as_str)
    }

    pub fn is_buildable(&self, package: &str) -> bool {
        !self.not_buildable.contains(package)
    }

    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self.sources.insert("reuse".to_string(), ConfigSource::Command);
        self
    }

    pub fn with_compiler_runtimes(mut self, inject: bool) -> Self {
        self.inject_compiler_runtimes = inject;
        self.sources
            .insert("inject-compiler-runtimes".to_string(), ConfigSource::Command);
        self
    }

    pub fn with_compiler(mut self, compiler: CompilerSpec) -> Self {
        self.compilers.push(compiler);
        self
    }

    pub fn with_targets(mut self, targets: Vec<ArchSpec>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_external(mut self, package: impl Into<String>, external: ExternalConfig) -> Self {
        self.externally_available.insert(package.into(), external);
        self
    }

    pub fn with_preferred_versions(mut self, package: impl Into<String>, versions: VersionList) -> Self {
        self.prefer_versions.insert(package.into(), versions);
        self
    }

    pub fn with_provider_preference(mut self, virtual_name: impl Into<String>, providers: &[&str]) -> Self {
        self.provider_preferences.insert(
            virtual_name.into(),
            providers.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    fn merge_raw_config(&mut self, raw: RawConfig, source: ConfigSource) -> Result<()> {
        for (key, value) in raw.values {
            self.merge_config_value(&key, value, source.clone())?;
        }
        Ok(())
    }

    /// Merge a single configuration value
    fn merge_config_value(
        &mut self,
        key: &str,
        value: serde_json::Value,
        source: ConfigSource,
    ) -> Result<()> {
        match key {
            "reuse" => self.reuse = parse_value(key, value)?,
            "inject-compiler-runtimes" => self.inject_compiler_runtimes = parse_value(key, value)?,
            "prefer-versions" => self.prefer_versions = parse_value(key, value)?,
            "externally-available" => self.externally_available = parse_value(key, value)?,
            "timeout" => self.timeout = parse_value(key, value)?,
            "compilers" => self.compilers = parse_value(key, value)?,
            "targets" => self.targets = parse_value(key, value)?,
            "compiler-runtimes" => self.compiler_runtimes = parse_value(key, value)?,
            "variant-preferences" => self.variant_preferences = parse_value(key, value)?,
            "provider-preferences" => self.provider_preferences = parse_value(key, value)?,
            "not-buildable" => self.not_buildable = parse_value(key, value)?,
            "encoding-cache-size" => self.encoding_cache_size = parse_value(key, value)?,
            _ => {
                warn!("Ignoring unknown configuration key '{}' from {}", key, source.as_str());
                return Ok(());
            }
        }
        self.sources.insert(key.to_string(), source);
        Ok(())
    }

    /// Apply `STRATA_*` environment variables
    fn apply_env_overrides(&mut self, loader: &ConfigLoader) {
        for key in ["reuse", "inject-compiler-runtimes"] {
            if let Some(value) = loader.get_env_bool(key) {
                match key {
                    "reuse" => self.reuse = value,
                    _ => self.inject_compiler_runtimes = value,
                }
                self.sources.insert(
                    key.to_string(),
                    ConfigSource::Environment(ConfigLoader::env_var_name(key)),
                );
            }
        }

        if let Some(seconds) = loader.get_env_u64("timeout") {
            self.timeout = Some(seconds);
            self.sources.insert(
                "timeout".to_string(),
                ConfigSource::Environment(ConfigLoader::env_var_name("timeout")),
            );
        }
    }
}
