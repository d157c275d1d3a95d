//! # djrec Configuration Module
//!
//! This module provides configuration management for djrec, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use djconfig::get_config;
//!
//! // Get the global configuration
//! let config = get_config();
//!
//! // Access configuration values
//! let level = config.get_log_min_level()?;
//! let recordings = config.get_managed_dir(&["recorder", "output_dir"], "recordings")?;
//!
//! // Update configuration values
//! config.set_log_min_level("debug".to_string())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("djrec.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load djrec configuration"));
}

pub const ENV_CONFIG_DIR: &str = "DJREC_CONFIG";
pub const ENV_PREFIX: &str = "DJREC_CONFIG__";

const DEFAULT_CONFIG_DIR: &str = ".djrec";
const DEFAULT_LOG_MIN_LEVEL: &str = "info";

/// Generates a getter/setter pair for string values with a default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> anyhow::Result<String> {
            match self.get_value($path) {
                Ok(serde_yaml::Value::String(s)) => Ok(s),
                _ => Ok($default.to_string()),
            }
        }

        pub fn $setter(&self, value: String) -> anyhow::Result<()> {
            self.set_value($path, serde_yaml::Value::String(value))
        }
    };
}

/// Configuration manager for djrec
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
///
/// A configuration built with [`Config::from_yaml_str`] lives in memory only:
/// `save` is a no-op for it.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.lock_data().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Current directory
        if Path::new(DEFAULT_CONFIG_DIR).exists() {
            return DEFAULT_CONFIG_DIR.to_string();
        }

        // 4. Home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(DEFAULT_CONFIG_DIR);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        DEFAULT_CONFIG_DIR.to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Write then read permission probes
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `DJREC_CONFIG` environment variable
    /// 3. `.djrec` in the current directory
    /// 4. `.djrec` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        // An empty config.yaml parses as Null and must not wipe the defaults
        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        if !external_value.is_null() {
            merge_yaml(&mut default_value, &external_value);
        }
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from a YAML document merged over the defaults
    ///
    /// Environment overrides are not applied and nothing is ever written to disk.
    /// Relative managed directories resolve against `config_dir`.
    pub fn from_yaml_str(yaml: &str, config_dir: impl Into<String>) -> Result<Self> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let external_value: Value = serde_yaml::from_str(yaml)?;
        if !external_value.is_null() {
            merge_yaml(&mut default_value, &external_value);
        }

        Ok(Config {
            config_dir: config_dir.into(),
            path: String::new(),
            data: Mutex::new(Self::lower_keys_value(default_value)),
        })
    }

    /// Directory holding config.yaml
    pub fn get_config_dir(&self) -> &str {
        &self.config_dir
    }

    fn lock_data(&self) -> std::sync::MutexGuard<'_, Value> {
        // A poisoned lock still holds a consistent YAML tree
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        if self.path.is_empty() {
            return Ok(());
        }
        let yaml = serde_yaml::to_string(&*self.lock_data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["recorder", "hook"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock_data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock_data();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    tracing::warn!(env_var = %key, "Ignoring environment override: {}", e);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        match serde_yaml::from_str::<Value>(value) {
            Ok(Value::Null) if !value.trim().is_empty() => Value::String(value.to_string()),
            Ok(parsed) => parsed,
            Err(_) => Value::String(value.to_string()),
        }
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let new_key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(new_key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a relative or absolute path and creates the directory if needed
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);

        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Gets a directory managed by the configuration
    ///
    /// The directory may be absolute or relative to the configuration
    /// directory. It is created if it does not exist yet.
    ///
    /// # Arguments
    ///
    /// * `path` - Path in the configuration tree (e.g. `&["recorder", "output_dir"]`)
    /// * `default` - Directory name used when the key is not configured
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Sets a directory managed by the configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    /// Stores an unsigned number at the given path
    pub fn set_number(&self, path: &[&str], value: u64) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value)))
    }
}

/// Returns the global configuration instance
///
/// The configuration is loaded lazily on first access.
///
/// # Panics
///
/// Panics if the configuration directory cannot be created or the
/// configuration file is not valid YAML.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// - Mappings are merged key by key, recursively
/// - Scalars and sequences from `external` replace those of `default`
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_embedded() {
        let config = Config::from_yaml_str("", ".").unwrap();
        assert_eq!(
            config.get_value(&["recorder", "idle_dj"]).unwrap(),
            Value::String("Hanyuu-sama".to_string())
        );
        assert_eq!(config.get_log_min_level().unwrap(), "info");
    }

    #[test]
    fn test_user_yaml_merges_over_defaults() {
        let config = Config::from_yaml_str(
            "recorder:\n  idle_dj: AutoDJ\n  Poll_Interval_Secs: 5\n",
            ".",
        )
        .unwrap();

        assert_eq!(
            config.get_value(&["recorder", "idle_dj"]).unwrap(),
            Value::String("AutoDJ".to_string())
        );
        // Keys are lower-cased on load
        assert_eq!(
            config.get_value(&["recorder", "poll_interval_secs"]).unwrap(),
            Value::Number(5.into())
        );
        // Untouched defaults survive the merge
        assert!(config.get_value(&["recorder", "stream_url"]).is_ok());
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let config = Config::from_yaml_str("", ".").unwrap();
        assert!(config.get_value(&["recorder", "nope"]).is_err());
        assert!(config.get_value(&["recorder", "idle_dj", "deeper"]).is_err());
    }

    #[test]
    fn test_set_value_creates_intermediate_maps() {
        let config = Config::from_yaml_str("", ".").unwrap();
        config
            .set_value(&["extra", "Nested", "key"], Value::Bool(true))
            .unwrap();
        assert_eq!(
            config.get_value(&["extra", "nested", "key"]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_set_number() {
        let config = Config::from_yaml_str("", ".").unwrap();
        config
            .set_number(&["recorder", "reconnect_delay_ms"], 2500)
            .unwrap();
        assert_eq!(
            config.get_value(&["recorder", "reconnect_delay_ms"]).unwrap(),
            Value::Number(2500.into())
        );
    }

    #[test]
    fn test_convert_env_value() {
        assert_eq!(Config::convert_env_value("42"), Value::Number(42.into()));
        assert_eq!(Config::convert_env_value("true"), Value::Bool(true));
        assert_eq!(
            Config::convert_env_value("https://example.org/api"),
            Value::String("https://example.org/api".to_string())
        );
        assert_eq!(
            Config::convert_env_value("~"),
            Value::String("~".to_string())
        );
    }

    #[test]
    fn test_managed_dir_is_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            Config::from_yaml_str("recorder:\n  output_dir: out\n", dir.path().to_string_lossy())
                .unwrap();

        let resolved = config
            .get_managed_dir(&["recorder", "output_dir"], "recordings")
            .unwrap();

        assert_eq!(Path::new(&resolved), dir.path().join("out"));
        assert!(dir.path().join("out").is_dir());
    }

    #[test]
    fn test_load_config_writes_merged_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "recorder:\n  hook: /bin/true\n").unwrap();

        let config = Config::load_config(&dir.path().to_string_lossy()).unwrap();
        assert_eq!(
            config.get_value(&["recorder", "hook"]).unwrap(),
            Value::String("/bin/true".to_string())
        );

        let saved = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(saved.contains("stream_url"));
        assert!(saved.contains("/bin/true"));
    }
}
