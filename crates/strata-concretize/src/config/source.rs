use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConcretizeError, Result};

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default
    Default,
    /// The user configuration file
    User,
    /// A file given explicitly
    File(PathBuf),
    /// An environment variable
    Environment(String),
    /// Set programmatically
    Command,
}

impl ConfigSource {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::User => "user",
            ConfigSource::File(_) => "file",
            ConfigSource::Environment(var) => var,
            ConfigSource::Command => "command",
        }
    }
}

/// Configuration keys as read from a JSON file, in file order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig {
    pub values: IndexMap<String, serde_json::Value>,
}

/// Loads configuration files and `STRATA_*` environment variables
#[derive(Debug)]
pub struct ConfigLoader {
    use_environment: bool,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    /// Read an environment variable, ignoring empty values
    pub fn get_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }
        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// The directory holding `strata.json`
    pub fn get_config_home(&self) -> PathBuf {
        if let Some(home) = self.get_env("STRATA_HOME") {
            return PathBuf::from(home);
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "strata") {
            proj_dirs.config_dir().to_path_buf()
        } else if let Some(base) = directories::BaseDirs::new() {
            base.home_dir().join(".strata")
        } else {
            PathBuf::from(".strata")
        }
    }

    /// Load a configuration file; a missing file is an empty configuration
    pub fn load_config_file<P: AsRef<Path>>(&self, path: P) -> Result<RawConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(RawConfig::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ConcretizeError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| ConcretizeError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load `strata.json` from the configuration home
    pub fn load_user_config(&self) -> Result<RawConfig> {
        self.load_config_file(self.get_config_home().join("strata.json"))
    }

    /// Environment variable for a key: `inject-compiler-runtimes` reads `STRATA_INJECT_COMPILER_RUNTIMES`
    pub fn env_var_name(key: &str) -> String {
        format!("STRATA_{}", key.replace('-', "_").to_uppercase())
    }

    pub fn get_env_config(&self, key: &str) -> Option<String> {
        self.get_env(&Self::env_var_name(key))
    }

    pub fn get_env_bool(&self, key: &str) -> Option<bool> {
        self.get_env_config(key)
            .map(|val| !matches!(val.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
    }

    pub fn get_env_u64(&self, key: &str) -> Option<u64> {
        self.get_env_config(key).and_then(|val| val.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_as_str() {
        assert_eq!(ConfigSource::Default.as_str(), "default");
        assert_eq!(ConfigSource::User.as_str(), "user");
        assert_eq!(ConfigSource::File(PathBuf::from("/x.json")).as_str(), "file");
        assert_eq!(ConfigSource::Command.as_str(), "command");
        assert_eq!(
            ConfigSource::Environment("STRATA_REUSE".to_string()).as_str(),
            "STRATA_REUSE"
        );
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(ConfigLoader::env_var_name("reuse"), "STRATA_REUSE");
        assert_eq!(
            ConfigLoader::env_var_name("inject-compiler-runtimes"),
            "STRATA_INJECT_COMPILER_RUNTIMES"
        );
    }

    #[test]
    fn test_environment_disabled() {
        let loader = ConfigLoader::new(false);
        assert_eq!(loader.get_env("PATH"), None);
        assert_eq!(loader.get_env_bool("reuse"), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let loader = ConfigLoader::new(false);
        let raw = loader.load_config_file("/definitely/not/here/strata.json").unwrap();
        assert!(raw.values.is_empty());
    }

    #[test]
    fn test_load_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.json");
        fs::write(&path, r#"{"timeout": 30, "reuse": false}"#).unwrap();

        let raw = ConfigLoader::new(false).load_config_file(&path).unwrap();
        let keys: Vec<&str> = raw.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["timeout", "reuse"]);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            ConfigLoader::new(false).load_config_file(&path),
            Err(ConcretizeError::Config(_))
        ));
    }
}
