//! core::config::schema
//!
//! Configuration schema types.
//!
//! The same schema is used for the global file and the local
//! (working-directory) file; see [`super::Config`] for how they merge.
//!
//! # Validation
//!
//! Config values are validated after parsing: log levels must be known
//! tracing levels and `[defaults]` keys must be non-empty identifiers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Log levels accepted by `[logging] level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// One configuration file.
///
/// # Example
///
/// ```toml
/// [core]
/// interactive = true
/// strict_file_prefix = false
///
/// [logging]
/// level = "warn"
///
/// [defaults]
/// location = "westus2"
///
/// [store]
/// path = "/home/me/.verbwork/resources.json"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Engine behavior
    pub core: Option<CoreSettings>,

    /// Logging defaults
    pub logging: Option<LoggingSettings>,

    /// Values for arguments that declare a configured default key
    pub defaults: BTreeMap<String, String>,

    /// Resource store location
    pub store: Option<StoreSettings>,
}

impl Settings {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(logging) = &self.logging {
            logging.validate()?;
        }

        for key in self.defaults.keys() {
            let valid = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid defaults key '{key}', use letters, digits, '_' or '-'"
                )));
            }
        }

        if let Some(store) = &self.store {
            if let Some(path) = &store.path {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "store path cannot be empty".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// `[core]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CoreSettings {
    /// Allow interactive prompts when a terminal is attached
    pub interactive: Option<bool>,

    /// Only treat `@/`, `@./`, `@../` and `@~` values as file references
    pub strict_file_prefix: Option<bool>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Default log level when neither `VW_LOG` nor a CLI flag sets one
    pub level: Option<String>,
}

impl LoggingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(level) = &self.level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid log level '{}', must be one of: {}",
                    level,
                    LOG_LEVELS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    /// Path of the JSON resource file
    pub path: Option<PathBuf>,
}
