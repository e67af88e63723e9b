//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Verbwork has two configuration scopes:
//! - **Global**: User-level settings
//! - **Local**: Overrides for the working directory
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Local config file
//! 4. CLI flags (not handled here)
//!
//! `[defaults]` entries merge per key, so a local file can override a single
//! default without repeating the others.
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$VW_CONFIG` if set (the file must exist)
//! 2. `$XDG_CONFIG_HOME/verbwork/config.toml`
//! 3. `~/.verbwork/config.toml` (canonical write location)
//!
//! # Local Config Location
//!
//! `.verbwork/config.toml` in the working directory.
//!
//! # Example
//!
//! ```no_run
//! use verbwork::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/path/to/project"))).unwrap();
//! let config = result.config;
//!
//! println!("Interactive: {}", config.interactive());
//! if let Some(location) = config.defaults().get("location") {
//!     println!("Default location: {}", location);
//! }
//! ```

pub mod schema;

pub use schema::{CoreSettings, LoggingSettings, Settings, StoreSettings};

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable naming an explicit global config file.
pub const CONFIG_ENV: &str = "VW_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file '{0}' does not exist")]
    Missing(PathBuf),

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
}

/// Merged configuration from all sources.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: Settings,
    /// Local configuration (if present in the working directory)
    pub local: Option<Settings>,
    global_path: Option<PathBuf>,
    local_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `cwd` is provided, also loads the local config found there.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(cwd: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global()?;
        Self::load_with(global_path, cwd)
    }

    /// Load with an explicit global config file, which must exist.
    pub fn load_from(path: &Path, cwd: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        Self::load_with(Some(path.to_path_buf()), cwd)
    }

    fn load_with(
        global_path: Option<PathBuf>,
        cwd: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let global = match &global_path {
            Some(path) => Self::read_settings(path)?,
            None => Settings::default(),
        };

        let local_candidate = cwd.map(Self::local_config_path);
        let (local, local_path) = match local_candidate {
            Some(path) if path.exists() => (Some(Self::read_settings(&path)?), Some(path)),
            _ => (None, None),
        };

        global.validate()?;
        if let Some(ref l) = local {
            l.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                local,
                global_path,
                local_path,
            },
        })
    }

    /// Locate the global config file, if any.
    ///
    /// `$VW_CONFIG` is explicit: naming a missing file is an error rather
    /// than a fall-through to the default locations.
    fn find_global() -> Result<Option<PathBuf>, ConfigError> {
        // 1. Check $VW_CONFIG
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(ConfigError::Missing(path));
            }
            return Ok(Some(path));
        }

        // 2. Check $XDG_CONFIG_HOME/verbwork/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("verbwork/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        // 3. Check ~/.verbwork/config.toml
        Ok(dirs::home_dir()
            .map(|home| home.join(".verbwork/config.toml"))
            .filter(|path| path.exists()))
    }

    fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for global config.
    ///
    /// Returns `~/.verbwork/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".verbwork/config.toml"))
    }

    /// Get the path for local config relative to `cwd`.
    pub fn local_config_path(cwd: &Path) -> PathBuf {
        cwd.join(".verbwork/config.toml")
    }

    /// Write settings atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory and renames it into place.
    pub fn write(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(settings)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Set (`Some`) or clear (`None`) one `[defaults]` entry in the file at
    /// `path`, creating the file if needed. Returns the file's new defaults.
    pub fn update_default(
        path: &Path,
        key: &str,
        value: Option<&str>,
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut settings = if path.exists() {
            Self::read_settings(path)?
        } else {
            Settings::default()
        };
        match value {
            Some(value) => {
                settings.defaults.insert(key.to_string(), value.to_string());
            }
            None => {
                settings.defaults.remove(key);
            }
        }
        settings.validate()?;
        Self::write(path, &settings)?;
        Ok(settings.defaults)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn core_value<T>(&self, pick: impl Fn(&CoreSettings) -> Option<T>) -> Option<T> {
        self.local
            .as_ref()
            .and_then(|l| l.core.as_ref())
            .and_then(&pick)
            .or_else(|| self.global.core.as_ref().and_then(&pick))
    }

    /// Check if interactive prompting is allowed.
    ///
    /// Defaults to `true` if not configured.
    pub fn interactive(&self) -> bool {
        self.core_value(|c| c.interactive).unwrap_or(true)
    }

    /// Check if `@file` expansion requires an explicit path prefix.
    ///
    /// Defaults to `false` if not configured.
    pub fn strict_file_prefix(&self) -> bool {
        self.core_value(|c| c.strict_file_prefix).unwrap_or(false)
    }

    /// Get the default log level.
    ///
    /// Defaults to `"warn"` if not configured.
    pub fn log_level(&self) -> String {
        self.local
            .as_ref()
            .and_then(|l| l.logging.as_ref())
            .and_then(|l| l.level.clone())
            .or_else(|| self.global.logging.as_ref().and_then(|l| l.level.clone()))
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|| "warn".to_string())
    }

    /// Get the merged `[defaults]` table (local entries win).
    pub fn defaults(&self) -> BTreeMap<String, String> {
        let mut merged = self.global.defaults.clone();
        if let Some(local) = &self.local {
            merged.extend(local.defaults.clone());
        }
        merged
    }

    /// Get the resource store path.
    ///
    /// Defaults to `~/.verbwork/resources.json`.
    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        let configured = self
            .local
            .as_ref()
            .and_then(|l| l.store.as_ref())
            .and_then(|s| s.path.clone())
            .or_else(|| self.global.store.as_ref().and_then(|s| s.path.clone()));
        match configured {
            Some(path) => Ok(path),
            None => {
                let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
                Ok(home.join(".verbwork/resources.json"))
            }
        }
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded local config file.
    pub fn local_config_loaded_from(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }
}
